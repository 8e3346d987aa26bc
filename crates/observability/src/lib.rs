//! Process-wide tracing setup shared by every keystone binary.

/// Initialize process-wide logging from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init_with(&logging::LogConfig::from_env());
}

/// Subscriber configuration (filters, output format).
pub mod logging;

pub use logging::{LogConfig, LogFormat, init_with};
