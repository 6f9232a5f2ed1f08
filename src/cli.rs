use std::path::PathBuf;

use clap::Parser;

/// Only the two locations are options; everything else is task grammar and
/// passes through untouched, so help and version flags are left to it.
#[derive(Debug, Parser)]
#[command(name = "strand")]
#[command(bin_name = "strand")]
#[command(about = "A command-line task list")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    #[arg(
        long,
        env = "TASKRC",
        value_name = "FILE",
        help = "Configuration file to read instead of ~/.strandrc.toml."
    )]
    pub rc: Option<PathBuf>,

    #[arg(
        long,
        env = "TASKDATA",
        value_name = "DIR",
        help = "Directory holding the task data files."
    )]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn raw_arguments_pass_through_untouched() {
        let cli = Cli::try_parse_from(["strand", "--data", "/tmp/d", "1", "modify", "-home", "--", "-x"])
            .expect("arguments should parse");
        assert_eq!(cli.data.as_deref(), Some(std::path::Path::new("/tmp/d")));
        assert_eq!(cli.args, ["1", "modify", "-home", "--", "-x"]);
    }

    #[test]
    fn help_and_version_are_task_words() {
        let cli = Cli::try_parse_from(["strand", "help", "version"]).expect("words should parse");
        assert_eq!(cli.args, ["help", "version"]);
    }
}
