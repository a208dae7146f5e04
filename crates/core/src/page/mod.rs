//! Page Extractor: serialized document plus content-script shadow DOM.

pub mod firefox;
pub mod scripts;
pub mod shadow;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

pub use self::firefox::ConsoleEvaluator;
pub use self::shadow::{looks_like_document, splice_shadow};
use crate::error::Result;
use crate::target::AttachedSession;

/// Which shadow roots to fold into the extracted document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShadowMode {
	/// Light DOM only.
	Off,
	/// The marker host's open shadow root.
	#[default]
	OpenOnly,
	/// The marker host's shadow root plus every other open shadow root, declaratively.
	All,
}

impl ShadowMode {
	pub fn as_str(self) -> &'static str {
		match self {
			ShadowMode::Off => "off",
			ShadowMode::OpenOnly => "open-only",
			ShadowMode::All => "all",
		}
	}
}

impl fmt::Display for ShadowMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ShadowMode {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"off" => Ok(ShadowMode::Off),
			"open-only" | "open" => Ok(ShadowMode::OpenOnly),
			"all" => Ok(ShadowMode::All),
			other => Err(format!("unknown shadow mode: {other}")),
		}
	}
}

/// Polling schedule for content-script injection.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
	pub shadow: ShadowMode,
	/// Overall bound on waiting for the injection signal.
	pub deadline: Duration,
	pub initial_interval: Duration,
	pub max_interval: Duration,
	/// Direct outer-HTML evaluations once the deadline passes.
	pub fallback_attempts: u32,
	pub fallback_delay: Duration,
}

impl Default for ExtractOptions {
	fn default() -> Self {
		Self {
			shadow: ShadowMode::OpenOnly,
			deadline: Duration::from_secs(5),
			initial_interval: Duration::from_millis(50),
			max_interval: Duration::from_millis(500),
			fallback_attempts: 3,
			fallback_delay: Duration::from_millis(200),
		}
	}
}

/// Something that can evaluate an expression in a page.
#[async_trait]
pub trait Evaluate: Send + Sync {
	async fn evaluate(&self, expression: &str) -> Result<Value>;
}

#[async_trait]
impl Evaluate for AttachedSession {
	async fn evaluate(&self, expression: &str) -> Result<Value> {
		AttachedSession::evaluate(self, expression).await
	}
}

#[async_trait]
impl<T: Evaluate + ?Sized> Evaluate for Arc<T> {
	async fn evaluate(&self, expression: &str) -> Result<Value> {
		(**self).evaluate(expression).await
	}
}

fn as_text(value: Value) -> String {
	match value {
		Value::String(text) => text,
		_ => String::new(),
	}
}

pub struct PageExtractor<E> {
	evaluator: E,
	options: ExtractOptions,
}

impl<E: Evaluate> PageExtractor<E> {
	pub fn new(evaluator: E) -> Self {
		Self {
			evaluator,
			options: ExtractOptions::default(),
		}
	}

	pub fn with_options(mut self, options: ExtractOptions) -> Self {
		self.options = options;
		self
	}

	pub fn options(&self) -> &ExtractOptions {
		&self.options
	}

	/// Doctype plus outer HTML, no shadow content.
	pub async fn baseline(&self) -> Result<String> {
		Ok(as_text(self.evaluator.evaluate(&scripts::baseline()).await?))
	}

	/// One extraction attempt.
	///
	/// Tries the in-page merge first; if that does not come back as a
	/// document, splices the shadow markup into the baseline string instead.
	pub async fn extract_html(&self, mode: ShadowMode) -> Result<String> {
		if mode == ShadowMode::Off {
			return self.baseline().await;
		}

		match self.evaluator.evaluate(&scripts::merge(mode == ShadowMode::All)).await {
			Ok(value) => {
				let merged = as_text(value);
				if looks_like_document(&merged) {
					return Ok(merged);
				}
				debug!(target = "extdev", "in-page merge returned no document, splicing");
			}
			Err(e) => debug!(target = "extdev", error = %e, "in-page merge failed, splicing"),
		}

		let baseline = self.baseline().await?;
		let shadow = self.evaluator.evaluate(&scripts::shadow_inner()).await.map(as_text).unwrap_or_default();
		Ok(splice_shadow(&baseline, &shadow))
	}

	/// Returns `true` once the marker host has a non-empty shadow root.
	pub async fn is_injected(&self) -> bool {
		matches!(self.evaluator.evaluate(&scripts::injected()).await, Ok(Value::Bool(true)))
	}

	/// Extracts once immediately, then waits for content-script injection.
	///
	/// Never fails: the result may be partial or empty when the page never
	/// settles within the deadline.
	pub async fn extract_when_ready(&self) -> String {
		let mode = self.options.shadow;
		let first = match self.extract_html(mode).await {
			Ok(html) => html,
			Err(e) => {
				debug!(target = "extdev", error = %e, "first extraction failed");
				String::new()
			}
		};

		if mode != ShadowMode::Off {
			if self.is_injected().await || self.wait_for_injection().await {
				match self.extract_html(mode).await {
					Ok(html) if !html.is_empty() => return html,
					Ok(_) => {}
					Err(e) => debug!(target = "extdev", error = %e, "extraction after injection failed"),
				}
			}
		} else if !first.is_empty() {
			return first;
		}

		for attempt in 0..self.options.fallback_attempts {
			match self.baseline().await {
				Ok(html) if !html.is_empty() => {
					return if first.len() > html.len() { first } else { html };
				}
				Ok(_) => debug!(target = "extdev", attempt, "fallback extraction returned nothing"),
				Err(e) => debug!(target = "extdev", attempt, error = %e, "fallback extraction failed"),
			}
			if attempt + 1 < self.options.fallback_attempts {
				tokio::time::sleep(self.options.fallback_delay).await;
			}
		}
		first
	}

	/// Polls the injection signal with widening intervals until the deadline.
	async fn wait_for_injection(&self) -> bool {
		let deadline = Instant::now() + self.options.deadline;
		let mut interval = self.options.initial_interval;

		loop {
			let now = Instant::now();
			if now >= deadline {
				debug!(target = "extdev", "content script did not inject before deadline");
				return false;
			}
			tokio::time::sleep(interval.min(deadline - now)).await;
			if self.is_injected().await {
				return true;
			}
			interval = (interval * 2).min(self.options.max_interval);
		}
	}
}
