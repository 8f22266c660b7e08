//! Small ambient helpers shared across the crate: retry/backoff, timeouts,
//! timestamps, logging defaults, and non-fatal error handling.

pub mod error;
pub mod logging;
pub mod retry;
pub mod time;
pub mod timeout;

pub use error::{
    err_option_to_result, log_error, log_error_async, result_to_option, with_default,
    with_default_async, with_fallback, with_fallback_async,
};
pub use logging::init_logging;
pub use retry::{retry_async_with_backoff, RetryConfig};
pub use time::{current_timestamp, current_timestamp_duration};
pub use timeout::{
    with_block_assembly_timeout, with_handshake_timeout, with_idle_timeout, with_pong_timeout,
    with_timeout, DEFAULT_BLOCK_ASSEMBLY_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_PONG_TIMEOUT,
};
