use super::*;

#[test]
fn truncate_never_splits_a_character() {
	let text = "ab─cd";
	for budget in 0..=text.len() {
		let cut = truncate_utf8(text, budget);
		assert!(cut.len() <= budget);
		assert!(text.starts_with(cut));
	}
	assert_eq!(truncate_utf8(text, 3), "ab");
	assert_eq!(truncate_utf8(text, 5), "ab─");
}

#[test]
fn short_text_is_unchanged() {
	assert_eq!(truncate_utf8("<p>hi</p>", 100), "<p>hi</p>");
	assert_eq!(limit_output("<p>hi</p>", Some(9)), "<p>hi</p>");
}

#[test]
fn zero_or_missing_budget_disables_truncation() {
	let html = "x".repeat(50);
	assert_eq!(limit_output(&html, None), html);
	assert_eq!(limit_output(&html, Some(0)), html);
}

#[test]
fn trailer_reports_shown_and_total_bytes() {
	let html = format!("<div>{}</div>", "é".repeat(10));
	let limited = limit_output(&html, Some(8));
	assert_eq!(
		limited,
		format!("<div>é\n[truncated: 7 of {} bytes shown; pass --max-bytes 0 to disable]", html.len())
	);
}
