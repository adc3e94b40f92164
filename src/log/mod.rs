//! Logger initialization.

pub mod prelude;

use slog::{o, Drain};
use slog_scope::GlobalLoggerGuard;

/// Initializes a [`slog`] logger which will output logs in JSON format to
/// stdout, filtered by the `RUST_LOG` environment variable.
///
/// # Panics
///
/// If [`slog_stdlog`] fails to [initialize](slog_stdlog::init).
pub fn init() -> GlobalLoggerGuard {
    let drain = slog_json::Json::default(std::io::stdout()).fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = slog::Logger::root(drain, o!());
    let scope_guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init().unwrap();

    scope_guard
}
