//! Writing results to stdout and diagnostics to stderr.

#[cfg(test)]
mod tests;

use std::io::{self, Write};

use colored::Colorize;
use extdev::protocol::LogEvent;
use extdev::{RenderOptions, logs};

use crate::error::CliError;

/// Longest prefix of `text` that fits in `max_bytes` without splitting a character.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
	if text.len() <= max_bytes {
		return text;
	}
	let mut end = max_bytes;
	while !text.is_char_boundary(end) {
		end -= 1;
	}
	&text[..end]
}

/// Applies the byte budget and appends a trailer when anything was cut.
///
/// `None` and `Some(0)` leave the text untouched.
pub fn limit_output(text: &str, max_bytes: Option<usize>) -> String {
	let Some(max) = max_bytes.filter(|max| *max > 0) else {
		return text.to_string();
	};
	let shown = truncate_utf8(text, max);
	if shown.len() == text.len() {
		return text.to_string();
	}
	format!(
		"{shown}\n[truncated: {} of {} bytes shown; pass --max-bytes 0 to disable]",
		shown.len(),
		text.len()
	)
}

/// Prints extracted HTML on stdout.
pub fn print_html(html: &str, max_bytes: Option<usize>) -> io::Result<()> {
	let mut stdout = io::stdout().lock();
	writeln!(stdout, "{}", limit_output(html, max_bytes))?;
	stdout.flush()
}

/// Writes one log event. Returns `false` once stdout is gone (e.g. a closed pipe).
pub fn print_log_event(event: &LogEvent, options: &RenderOptions) -> io::Result<bool> {
	let mut stdout = io::stdout().lock();
	match writeln!(stdout, "{}", logs::render(event, options)) {
		Ok(()) => Ok(true),
		Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(false),
		Err(e) => Err(e),
	}
}

/// Progress line on stderr, e.g. `   reloaded manifest`.
pub fn status(label: &str, message: &str) {
	eprintln!("{:>10} {message}", label.green().bold());
}

/// Non-fatal note on stderr.
pub fn note(message: &str) {
	eprintln!("{} {message}", "note:".cyan().bold());
}

pub fn print_error(err: &CliError) {
	eprintln!("{} {err}", "error:".red().bold());
}
