//! Result type alias for recast operations

use std::fmt::Display;

use crate::error::RecastError;

/// Standard Result type for recast operations
pub type Result<T> = std::result::Result<T, RecastError>;

/// Warn-and-skip handling for the non-fatal failures of a run
pub trait ResultExt<T> {
    /// Recoverable errors become `Ok(None)` after a warning; the rest propagate
    fn recoverable(self, context: impl Display) -> Result<Option<T>>;

    /// Any error becomes `None` after a warning prefixed with `context`
    fn skip_with_warning(self, context: impl Display) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn recoverable(self, context: impl Display) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_recoverable() => {
                tracing::warn!("{}: {}", context, err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn skip_with_warning(self, context: impl Display) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("{}: {}", context, err);
                None
            }
        }
    }
}
