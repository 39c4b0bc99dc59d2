//! Utility modules for storyloom-core
//!
//! - retry: Retry logic with exponential backoff for external calls

mod retry;

pub use retry::{retry_with_backoff, RetryConfig, RetryError};
