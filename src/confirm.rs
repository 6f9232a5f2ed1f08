use std::io::{self, BufRead, Write};

/// Asks on the terminal. End of input counts as no.
pub fn confirm(question: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    confirm_with(&mut stdin.lock(), &mut stdout, question)
}

/// Where commands show text that must appear before a question, and ask it.
pub trait Prompt {
    fn show(&mut self, text: &str);
    fn confirm(&mut self, question: &str) -> bool;
}

/// Stdout and stdin. A failed read counts as no.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn show(&mut self, text: &str) {
        print!("{}", text);
    }

    fn confirm(&mut self, question: &str) -> bool {
        confirm(question).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read confirmation");
            false
        })
    }
}

pub fn confirm_with<R, W>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::new();
    loop {
        write!(output, "{} (yes/no) ", question)?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "ye" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::confirm_with;

    fn ask(input: &str) -> (bool, String) {
        let mut reader = input.as_bytes();
        let mut out = Vec::new();
        let answer = confirm_with(&mut reader, &mut out, "Proceed?").expect("prompt should work");
        (answer, String::from_utf8(out).expect("utf8"))
    }

    #[test]
    fn answers_are_read_until_recognised() {
        assert!(ask("yes\n").0);
        assert!(!ask("n\n").0);
        let (answer, out) = ask("maybe\nY\n");
        assert!(answer);
        assert_eq!(out.matches("Proceed? (yes/no)").count(), 2);
        assert!(!ask("").0);
    }
}
