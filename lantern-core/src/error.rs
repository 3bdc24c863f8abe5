use std::error::Error;

use crate::transaction::ErrorRecord;
use crate::utils::parse_type_from_debug;

/// Creates an [`ErrorRecord`] from a `std::error::Error`.
///
/// The class is derived from the `Debug` representation and the message from
/// `Display`.  Sources of the error are listed as `caused by` lines ahead of
/// the native backtrace, which is only captured when `attach_backtrace` is
/// set and the `backtrace` feature is enabled.
///
/// # Examples
///
/// ```
/// use thiserror::Error;
///
/// #[derive(Debug, Error)]
/// #[error("inner")]
/// struct InnerError;
///
/// #[derive(Debug, Error)]
/// #[error("outer")]
/// struct OuterError(#[from] InnerError);
///
/// let record = lantern_core::error_record_from(&OuterError(InnerError), false);
/// assert_eq!(record.class, "OuterError");
/// assert_eq!(record.message, "outer");
/// assert_eq!(record.backtrace, ["caused by InnerError: inner"]);
/// ```
pub fn error_record_from<E: Error + ?Sized>(err: &E, attach_backtrace: bool) -> ErrorRecord {
    let mut backtrace = Vec::new();

    let mut source = err.source();
    while let Some(err) = source {
        backtrace.push(format!(
            "caused by {}: {}",
            parse_type_from_debug(err),
            err
        ));
        source = err.source();
    }

    #[cfg(feature = "backtrace")]
    if attach_backtrace {
        backtrace.extend(crate::backtrace_support::current_backtrace());
    }
    #[cfg(not(feature = "backtrace"))]
    let _ = attach_backtrace;

    ErrorRecord {
        class: parse_type_from_debug(err),
        message: err.to_string(),
        backtrace,
    }
}
