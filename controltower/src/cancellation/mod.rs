//! Cooperative cancellation for per-subscription worker tasks.

mod token;

pub use token::CancellationToken;
