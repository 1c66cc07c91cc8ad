//! Acoustic fingerprinting and deduplication engine for long-form
//! spoken audio (podcasts, sermons, lectures, livestream VODs).
//!
//! The pipeline turns a decoded PCM signal into a canonical list of
//! `(hash, anchor-frame)` landmark pairs ([`fingerprint`]), samples a
//! bounded representative subset of a long fingerprint
//! ([`segment`]), and matches it against an inverted index of stored
//! fingerprints ([`matcher`]). [`driver`] orchestrates the whole
//! thing end to end against a pluggable [`index::Index`].
//!
//! # Usage
//!
//! ```no_run
//! use castprint_core::{config::Config, driver::Driver, index::InMemoryIndex, signal::Signal};
//! use std::sync::Arc;
//!
//! # async fn run() -> castprint_core::error::Result<()> {
//! let config = Config::load()?;
//! let index = Arc::new(InMemoryIndex::new());
//! let driver = Driver::new(config, index);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod landmarks;
pub mod matcher;
pub mod peaks;
pub mod ratelimit;
pub mod recording;
pub mod segment;
pub mod signal;
pub mod spectrogram;

pub use driver::Driver;
pub use error::{CoreError, Result};
pub use fingerprint::Fingerprint;
pub use recording::{MatchStatus, Recording};
