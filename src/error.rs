//! Error handling utilities.

use std::error::Error;

use err_context::prelude::*;
use log::log;

use crate::logging::Severity;

/// A wrapper type for any error.
///
/// This is just a type alias for boxed standard error. Any errors go and this is guaranteed to be
/// fully compatible.
pub type AnyError = Box<dyn Error + Send + Sync>;

/// How to format errors in logs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum ErrorLogFormat {
    /// Multi-cause error will span multiple log messages.
    MultiLine,

    /// The error is formatted on a single line.
    ///
    /// The causes are separated by semicolons.
    SingleLine,
}

/// Log one error with given severity.
///
/// It is printed to the log with all the causes. Errors logged with [`Severity::Fatal`] end up on
/// the fatal target no matter what `target` is passed in.
///
/// This is the low-level version with full customization. You might also be interested in the
/// convenience macro ([`log_error`][macro@log_error]).
pub fn log_error(severity: Severity, target: &str, e: &AnyError, format: ErrorLogFormat) {
    let (level, target) = severity.record_parts(target);
    match format {
        ErrorLogFormat::MultiLine => {
            for cause in e.chain() {
                log!(target: target, level, "{}", cause);
            }
        }
        ErrorLogFormat::SingleLine => {
            log!(target: target, level, "{}", e.display("; "));
        }
    }
}

/// A convenience macro to log an [`AnyError`].
///
/// This logs an [`AnyError`] with given [`Severity`] as a single line (or one line per cause with
/// the `multi` prefix). Removes some boilerplate from the [`log_error`] function.
///
/// # Examples
///
/// ```rust
/// use std::error::Error;
/// use std::fmt::{Display, Formatter, Result as FmtResult};
/// use ceremony::log_error;
///
/// #[derive(Debug)]
/// struct Broken;
///
/// impl Display for Broken {
///     fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
///         write!(fmt, "Something is broken")
///     }
/// }
///
/// impl Error for Broken {}
///
/// log_error!(Warn, Broken.into());
/// log_error!(multi Fatal, Broken.into());
/// ```
///
/// [`log_error`]: fn@crate::error::log_error
/// [`Severity`]: crate::logging::Severity
#[macro_export]
macro_rules! log_error {
    ($severity: ident, $descr: expr => $err: expr) => {
        $crate::log_error!(@SingleLine, $severity, $err.context($descr).into());
    };
    ($severity: ident, $err: expr) => {
        $crate::log_error!(@SingleLine, $severity, $err);
    };
    (multi $severity: ident, $descr: expr => $err: expr) => {
        $crate::log_error!(@MultiLine, $severity, $err.context($descr).into());
    };
    (multi $severity: ident, $err: expr) => {
        $crate::log_error!(@MultiLine, $severity, $err);
    };
    (@$format: ident, $severity: ident, $err: expr) => {
        $crate::error::log_error(
            $crate::logging::Severity::$severity,
            module_path!(),
            &$err,
            $crate::error::ErrorLogFormat::$format,
        );
    };
}

/// Logs a message with the fatal severity.
///
/// The `log` facade tops at the error level, so fatal records are error records sent to the
/// [`FATAL_TARGET`][crate::logging::FATAL_TARGET]. The logging fan-out recognizes them and lets
/// them through even at the lowest verbosity.
///
/// ```rust
/// ceremony::fatal!("The disk is on fire ({} degrees)", 451);
/// ```
#[macro_export]
macro_rules! fatal {
    ($($arg: tt)+) => {
        $crate::macro_support::log!(
            target: $crate::logging::FATAL_TARGET,
            $crate::macro_support::Level::Error,
            $($arg)+
        )
    };
}
