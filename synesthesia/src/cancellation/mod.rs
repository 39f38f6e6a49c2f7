//! Structured cancellation and cleanup utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation of gateway calls and frame loops
//! - DropGuard for release-on-every-path resource scopes

mod guard;
mod token;

pub use guard::DropGuard;
pub use token::CancellationToken;
