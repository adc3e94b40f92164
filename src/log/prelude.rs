//! Re-exports of the [`slog_scope`] logging macros.

pub use slog_scope::{debug, error, info, trace, warn};
