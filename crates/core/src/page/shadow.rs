//! String-level shadow content merge, used when the in-page merge fails.

/// Id given to a synthesized marker host.
pub const MARKER_ID: &str = "extension-root";

/// Attribute alternatively marking the host.
pub const MARKER_ATTRIBUTE: &str = "data-extension-root";

/// CSS selector matching the marker host.
pub const MARKER_SELECTOR: &str = "#extension-root, [data-extension-root]";

/// Replaces the marker host's content in `html` with `shadow`.
///
/// Without a marker, a `<div id="extension-root">` holding `shadow` is inserted
/// before `</body>` (or appended). Empty `shadow` leaves an existing marker
/// and its content untouched.
pub fn splice_shadow(html: &str, shadow: &str) -> String {
	match find_marker(html) {
		Some(_) if shadow.trim().is_empty() => html.to_string(),
		Some(marker) => {
			let mut out = String::with_capacity(html.len() + shadow.len());
			out.push_str(&html[..marker.content_start]);
			out.push_str(shadow);
			out.push_str(&html[marker.content_end..]);
			out
		}
		None => {
			let host = format!("<div id=\"{MARKER_ID}\">{shadow}</div>");
			match find_ascii_case_insensitive(html, "</body", 0) {
				Some(at) => {
					let mut out = String::with_capacity(html.len() + host.len());
					out.push_str(&html[..at]);
					out.push_str(&host);
					out.push_str(&html[at..]);
					out
				}
				None => format!("{html}{host}"),
			}
		}
	}
}

/// Returns `true` if `html` looks like a serialized document rather than a fragment.
pub fn looks_like_document(html: &str) -> bool {
	let lower: String = html.trim_start().chars().take(9).collect::<String>().to_ascii_lowercase();
	lower.starts_with("<!doctype") || lower.starts_with("<html")
}

/// Returns `true` if `html` contains a marker host.
pub fn has_marker(html: &str) -> bool {
	find_marker(html).is_some()
}

#[derive(Debug, Clone, Copy)]
struct Marker {
	/// Byte offset just past the host's start tag.
	content_start: usize,
	/// Byte offset of the host's end tag (or `content_start` if unclosed).
	content_end: usize,
}

fn find_marker(html: &str) -> Option<Marker> {
	let attribute_at = [
		format!("id=\"{MARKER_ID}\""),
		format!("id='{MARKER_ID}'"),
		MARKER_ATTRIBUTE.to_string(),
	]
	.iter()
	.filter_map(|needle| html.find(needle.as_str()))
	.min()?;

	let tag_start = html[..attribute_at].rfind('<')?;
	let tag_end = tag_start + html[tag_start..].find('>')? + 1;
	let name: String = html[tag_start + 1..]
		.chars()
		.take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
		.collect();
	if name.is_empty() {
		return None;
	}

	if html[..tag_end].ends_with("/>") {
		return Some(Marker {
			content_start: tag_end,
			content_end: tag_end,
		});
	}

	let content_end = find_matching_close(html, &name, tag_end).unwrap_or(tag_end);
	Some(Marker {
		content_start: tag_end,
		content_end,
	})
}

/// Finds the end tag closing an element named `name` whose content starts at `from`.
fn find_matching_close(html: &str, name: &str, from: usize) -> Option<usize> {
	let open = format!("<{name}");
	let close = format!("</{name}");
	let mut depth = 1usize;
	let mut cursor = from;

	loop {
		let next_close = find_ascii_case_insensitive(html, &close, cursor)?;
		let next_open = find_ascii_case_insensitive(html, &open, cursor).filter(|at| *at < next_close && is_tag_boundary(html, at + open.len()));

		match next_open {
			Some(at) => {
				depth += 1;
				cursor = at + open.len();
			}
			None => {
				depth -= 1;
				if depth == 0 {
					return Some(next_close);
				}
				cursor = next_close + close.len();
			}
		}
	}
}

fn is_tag_boundary(html: &str, at: usize) -> bool {
	html[at..].chars().next().is_some_and(|c| c.is_ascii_whitespace() || c == '>' || c == '/')
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str, from: usize) -> Option<usize> {
	let hay = haystack.as_bytes();
	let needle = needle.as_bytes();
	if needle.is_empty() || from >= hay.len() {
		return None;
	}
	(from..=hay.len().saturating_sub(needle.len())).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
