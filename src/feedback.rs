//! Advisory output gathered during a run and flushed once at the end.

use crate::config::Config;
use crate::parser::Note;

#[derive(Debug, Clone, Default)]
pub struct Feedback {
    headers: Vec<String>,
    footnotes: Vec<String>,
    errors: Vec<String>,
    debug: Vec<String>,
    show_headers: bool,
    show_footnotes: bool,
    show_debug: bool,
}

impl Feedback {
    pub fn new(config: &Config) -> Self {
        Self {
            show_headers: config.verbose("header"),
            show_footnotes: config.verbose("footnote"),
            show_debug: config.get_bool("debug"),
            ..Self::default()
        }
    }

    pub fn header(&mut self, message: impl Into<String>) {
        self.headers.push(message.into());
    }

    pub fn footnote(&mut self, message: impl Into<String>) {
        self.footnotes.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.debug.push(message.into());
    }

    pub fn note(&mut self, note: &Note) {
        match note {
            Note::Header(text) => self.header(text.clone()),
            Note::Footnote(text) => self.footnote(text.clone()),
        }
    }

    /// Headers, then the command output, then footnotes.
    pub fn compose(&self, output: &str) -> String {
        let mut out = String::new();
        if self.show_headers {
            for header in &self.headers {
                out.push_str(header);
                out.push('\n');
            }
        }
        out.push_str(output);
        if !output.is_empty() && !output.ends_with('\n') {
            out.push('\n');
        }
        if self.show_footnotes {
            for footnote in &self.footnotes {
                out.push_str(footnote);
                out.push('\n');
            }
        }
        out
    }

    /// Debug lines and errors, for stderr.
    pub fn compose_errors(&self) -> String {
        let mut out = String::new();
        if self.show_debug {
            for line in &self.debug {
                out.push_str(line);
                out.push('\n');
            }
        }
        for error in &self.errors {
            out.push_str(error);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::Feedback;
    use crate::config::Config;
    use crate::parser::Note;

    #[test]
    fn output_is_framed_by_headers_and_footnotes() {
        let mut feedback = Feedback::new(&Config::default());
        feedback.note(&Note::Header("[strand list]".to_string()));
        feedback.footnote("Configuration override rc.gc:off");
        feedback.error("bad thing");
        feedback.debug("hidden");
        assert_eq!(
            feedback.compose("1 task"),
            "[strand list]\n1 task\nConfiguration override rc.gc:off\n"
        );
        assert_eq!(feedback.compose_errors(), "bad thing\n");
    }

    #[test]
    fn verbosity_tokens_gate_sections() {
        let mut config = Config::default();
        config.set("verbose", "footnote");
        config.set("debug", "on");
        let mut feedback = Feedback::new(&config);
        feedback.header("head");
        feedback.footnote("foot");
        feedback.debug("trace");
        assert_eq!(feedback.compose(""), "foot\n");
        assert_eq!(feedback.compose_errors(), "trace\n");
    }
}
