//! Resilience middlewares for the hook pipeline.
//!
//! Each middleware is a value you push into a [`Pipeline`](crate::hooks::Pipeline);
//! application order is vector order, so `[retry, timeout]` times out each
//! attempt individually while `[timeout, retry]` bounds the whole retried
//! operation.

mod abortable;
mod concurrency;
mod hedging;
mod retry;
mod timeout;

pub use abortable::Abortable;
pub use concurrency::ConcurrencyLimit;
pub use hedging::Hedging;
pub use retry::Retry;
pub use timeout::Timeout;
