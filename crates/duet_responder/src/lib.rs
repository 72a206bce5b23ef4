//! # duet_responder
//!
//! HTTP-backed automated responder for duet.
//!
//! Implements [`duet_core::ResponderService`] on top of a hosted completion
//! API. Each call sends the prompt as the only user message; no earlier
//! turns are forwarded.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use duet_core::ResponderService;
//! use duet_responder::HttpResponder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let responder = HttpResponder::from_env()?;
//! let reply = responder.complete("Hello!", Duration::from_secs(30)).await?;
//! println!("{}", reply);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod wire;

pub use client::{HttpResponder, LlmProvider};
pub use error::{SetupError, SetupResult};
pub use wire::{build_request_body, parse_response, MAX_TOKENS};
