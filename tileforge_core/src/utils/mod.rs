//! Small shared utilities: cooperative cancellation and concurrency limits.

mod cancellation;
mod concurrency;

pub use cancellation::*;
pub use concurrency::*;
