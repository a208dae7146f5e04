//! In-page expressions used by the extractor.

use super::shadow::{MARKER_ID, MARKER_SELECTOR};

const DOCTYPE_FN: &str = r#"const serializeDoctype = () => {
		const dt = document.doctype;
		if (!dt) return '';
		let out = '<!DOCTYPE ' + dt.name;
		if (dt.publicId) out += ' PUBLIC "' + dt.publicId + '"';
		else if (dt.systemId) out += ' SYSTEM';
		if (dt.systemId) out += ' "' + dt.systemId + '"';
		return out + '>';
	};"#;

/// Doctype plus the root element's outer markup.
pub fn baseline() -> String {
	format!(
		r#"(() => {{
	{DOCTYPE_FN}
	return serializeDoctype() + (document.documentElement ? document.documentElement.outerHTML : '');
}})()"#
	)
}

/// Inner markup of the marker's open shadow root, or an empty string.
pub fn shadow_inner() -> String {
	format!(
		r#"(() => {{
	const host = document.querySelector('{MARKER_SELECTOR}');
	return host && host.shadowRoot ? host.shadowRoot.innerHTML : '';
}})()"#
	)
}

/// `true` once the marker exists and its shadow root has content.
pub fn injected() -> String {
	format!(
		r#"(() => {{
	const host = document.querySelector('{MARKER_SELECTOR}');
	return !!(host && host.shadowRoot && host.shadowRoot.innerHTML.trim().length > 0);
}})()"#
	)
}

/// Serializes a clone of the document with the marker's shadow content inlined.
///
/// With `include_all`, every other open shadow root is kept as a declarative
/// `<template shadowrootmode="open">` in its host.
pub fn merge(include_all: bool) -> String {
	format!(
		r#"(() => {{
	{DOCTYPE_FN}
	const selector = '{MARKER_SELECTOR}';
	const live = document.querySelector(selector);
	const shadow = live ? live.shadowRoot : null;
	const root = document.documentElement.cloneNode(true);
	if ({include_all}) {{
		const liveAll = document.documentElement.querySelectorAll('*');
		const cloneAll = root.querySelectorAll('*');
		for (let i = 0; i < liveAll.length && i < cloneAll.length; i++) {{
			const el = liveAll[i];
			if (el === live || !el.shadowRoot) continue;
			const tpl = document.createElement('template');
			tpl.setAttribute('shadowrootmode', 'open');
			tpl.innerHTML = el.shadowRoot.innerHTML;
			cloneAll[i].insertBefore(tpl, cloneAll[i].firstChild);
		}}
	}}
	let host = root.querySelector(selector);
	if (!host) {{
		host = document.createElement('div');
		host.id = '{MARKER_ID}';
		(root.querySelector('body') || root).appendChild(host);
	}}
	if (shadow) host.innerHTML = shadow.innerHTML;
	return serializeDoctype() + root.outerHTML;
}})()"#
	)
}
