//! Unified Log Stream.
//!
//! Console, runtime and error events from every attached target are
//! normalized into [`LogEvent`](extdev_protocol::LogEvent)s, filtered, and
//! rendered.

pub mod filter;
pub mod normalize;
pub mod render;
pub mod stream;

pub use self::filter::LogFilter;
pub use self::normalize::{SourceInfo, infer_context};
pub use self::render::{LogFormat, RenderOptions, render};
pub use self::stream::{LogSubscription, subscribe_cdp, subscribe_firefox};
