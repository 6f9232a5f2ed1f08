mod app;
mod cli;
mod commands;
mod config;
mod confirm;
mod dates;
mod domain;
mod feedback;
mod filter;
mod hooks;
mod locks;
mod parser;
mod perf;
mod signals;
mod storage;
mod ui;

use std::panic::{self, AssertUnwindSafe};

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();
    let binary = std::env::args()
        .next()
        .unwrap_or_else(|| "strand".to_string());
    let code = panic::catch_unwind(AssertUnwindSafe(|| {
        app::run(&cli, &binary, &mut confirm::TerminalPrompt)
    }))
    .unwrap_or_else(|_| {
        eprintln!("Unknown error.");
        app::EXIT_UNKNOWN
    });
    std::process::exit(code);
}
