//! Line-oriented prompts for interactive commands

#![allow(missing_docs)]

use anyhow::Result;
use std::fmt::Display;
use std::io::{self, BufRead, Stdout, Write};

/// Prompt/reply channel; stdin/stdout in the binary, buffers in tests.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, Stdout> {
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print one line
    pub fn say(&mut self, line: impl Display) -> Result<()> {
        writeln!(self.output, "{line}")?;
        Ok(())
    }

    /// Prompt user for text input; `None` once input is exhausted
    pub fn prompt(&mut self, message: &str) -> Result<Option<String>> {
        write!(self.output, "{message}: ")?;
        self.output.flush()?;

        let mut input = String::new();
        if self.input.read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }

    /// Prompt user for yes/no confirmation
    pub fn confirm(&mut self, message: &str, default_yes: bool) -> Result<bool> {
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        let Some(input) = self.prompt(&format!("{message} {hint}"))? else {
            return Ok(default_yes);
        };
        if input.is_empty() {
            return Ok(default_yes);
        }
        Ok(input.eq_ignore_ascii_case("y") || input.eq_ignore_ascii_case("yes"))
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn prompt_trims_and_reports_eof() {
        let mut console = Console::new(Cursor::new("  sim \n"), Vec::new());
        assert_eq!(console.prompt("febre").unwrap().as_deref(), Some("sim"));
        assert_eq!(console.prompt("febre").unwrap(), None);
        let output = String::from_utf8(console.into_output()).unwrap();
        assert_eq!(output, "febre: febre: ");
    }

    #[test]
    fn confirm_uses_default_on_empty_input() {
        let mut console = Console::new(Cursor::new("\nn\nYES\n"), Vec::new());
        assert!(console.confirm("Delete?", true).unwrap());
        assert!(!console.confirm("Delete?", true).unwrap());
        assert!(console.confirm("Delete?", false).unwrap());
    }
}
