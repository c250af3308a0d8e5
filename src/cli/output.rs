//! User-facing terminal output with colour.
//!
//! Regular output goes to stdout, warnings and errors to stderr. Quiet mode
//! suppresses everything except warnings and errors; verbose lines are shown
//! only in verbose mode. Colour is used only when the stream is a terminal.

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::io::{self, IsTerminal, Write};

/// Prints progress and results, honouring `--verbose` and `--quiet`.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
    stdout_color: ColorChoice,
    stderr_color: ColorChoice,
}

fn choice_for(is_terminal: bool) -> ColorChoice {
    if is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn spec(color: Color, bold: bool) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color)).set_bold(bold);
    spec
}

/// Writes `label` in `style` (if any) followed by the plain `message`.
fn styled_line<W: WriteColor>(
    out: &mut W,
    style: Option<&ColorSpec>,
    label: &str,
    message: &str,
) -> io::Result<()> {
    if let Some(style) = style {
        out.set_color(style)?;
    }
    write!(out, "{label}")?;
    out.reset()?;
    writeln!(out, "{message}")
}

fn section_lines<W: WriteColor>(out: &mut W, title: &str) -> io::Result<()> {
    writeln!(out)?;
    out.set_color(&spec(Color::Cyan, true))?;
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "-".repeat(title.chars().count()))?;
    out.reset()
}

impl OutputManager {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet: quiet && !verbose,
            stdout_color: choice_for(io::stdout().is_terminal()),
            stderr_color: choice_for(io::stderr().is_terminal()),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn stdout(&self) -> StandardStream {
        StandardStream::stdout(self.stdout_color)
    }

    fn stderr(&self) -> StandardStream {
        StandardStream::stderr(self.stderr_color)
    }

    /// Detail shown only with `--verbose`.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if self.verbose {
            styled_line(&mut self.stdout().lock(), None, "  ", message)?;
        }
        Ok(())
    }

    pub fn progress(&self, message: &str) -> io::Result<()> {
        if !self.quiet {
            styled_line(&mut self.stdout().lock(), None, "", message)?;
        }
        Ok(())
    }

    pub fn success(&self, message: &str) -> io::Result<()> {
        if !self.quiet {
            let green = spec(Color::Green, true);
            styled_line(&mut self.stdout().lock(), Some(&green), "✓ ", message)?;
        }
        Ok(())
    }

    pub fn section(&self, title: &str) -> io::Result<()> {
        if !self.quiet {
            section_lines(&mut self.stdout().lock(), title)?;
        }
        Ok(())
    }

    pub fn indent(&self, message: &str) -> io::Result<()> {
        if !self.quiet {
            styled_line(&mut self.stdout().lock(), None, "  ", message)?;
        }
        Ok(())
    }

    /// Warnings are printed even in quiet mode.
    pub fn warn(&self, message: &str) -> io::Result<()> {
        let yellow = spec(Color::Yellow, true);
        styled_line(&mut self.stderr().lock(), Some(&yellow), "warning: ", message)
    }

    pub fn error(&self, message: &str) -> io::Result<()> {
        let red = spec(Color::Red, true);
        styled_line(&mut self.stderr().lock(), Some(&red), "error: ", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn text(buffer: &Buffer) -> String {
        String::from_utf8(buffer.as_slice().to_vec()).unwrap()
    }

    #[test]
    fn verbose_wins_over_quiet() {
        let output = OutputManager::new(true, true);
        assert!(output.is_verbose());
        assert!(!output.quiet);
    }

    #[test]
    fn plain_stream_gets_no_escape_codes() {
        let mut buffer = Buffer::no_color();
        styled_line(&mut buffer, Some(&spec(Color::Red, true)), "error: ", "boom").unwrap();
        assert_eq!(text(&buffer), "error: boom\n");

        let mut buffer = Buffer::no_color();
        section_lines(&mut buffer, "Plan").unwrap();
        assert_eq!(text(&buffer), "\nPlan\n----\n");
    }

    #[test]
    fn colored_stream_styles_only_the_label() {
        let mut buffer = Buffer::ansi();
        styled_line(&mut buffer, Some(&spec(Color::Green, true)), "✓ ", "done").unwrap();
        let out = text(&buffer);
        assert!(out.contains('\x1b'), "{out:?}");
        assert!(out.ends_with("done\n"), "{out:?}");
        assert!(out.find("✓ ").unwrap() < out.find("done").unwrap());
    }

    #[test]
    fn non_terminal_disables_color() {
        assert_eq!(choice_for(false), ColorChoice::Never);
        assert_eq!(choice_for(true), ColorChoice::Auto);
    }
}
