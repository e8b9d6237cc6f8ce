//! Ambient utilities: logging setup, environment lookups, retries

pub mod env;
pub mod logging;
pub mod retry;

pub use env::{absolutize, env_opt, env_path, BUILD_WORKING_DIRECTORY_ENV, CORE_MODULES_ENV};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
pub use retry::{retry_if_retryable, IsRetryable, RetryConfig};
