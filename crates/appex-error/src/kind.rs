//! Error kinds for appex operations

use strum_macros::{Display, IntoStaticStr};

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to tell a broken template apart from a bad
/// helper argument or a serialization problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, Display)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid argument passed to a function or helper
    InvalidArgument,

    /// Configuration input could not be interpreted
    InvalidConfig,

    // =========================================================================
    // Template errors
    // =========================================================================
    /// Malformed template source
    TemplateSyntax,

    /// Template construct this engine does not implement (blocks, partials)
    UnsupportedSyntax,

    /// A helper was invoked with arguments but is not registered
    MissingHelper,

    /// A helper failed while producing its output
    HelperFailed,

    // =========================================================================
    // Export errors
    // =========================================================================
    /// Serialization failed
    SerializationFailed,

    /// A structured report for a cause could not be produced
    CauseReportFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// Whether this kind is raised by a broken template rather than bad data.
    pub fn is_template_fault(&self) -> bool {
        matches!(
            self,
            ErrorKind::TemplateSyntax | ErrorKind::UnsupportedSyntax | ErrorKind::MissingHelper
        )
    }
}
