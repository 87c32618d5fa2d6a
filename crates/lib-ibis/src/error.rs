//! Error types for parsing, validation and corner resolution.

use lib_types::ami::Corner;
use thiserror::Error;

/// Errors that can occur while reading model-description or parameter text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The text source could not supply the file.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Structural error at an exact position. Parsing stops at the first one.
    #[error(
        "Syntax error at line {line}, column {column}{}: expected {}, found {found}",
        within(.path),
        expected_list(.expected)
    )]
    Syntax {
        line: usize,
        column: usize,
        /// Tokens that would have been accepted here.
        expected: Vec<String>,
        /// The offending token, or `end of line`/`end of input`.
        found: String,
        /// Dot-joined path of the innermost enclosing parameter, when the
        /// error sits inside one.
        path: Option<String>,
    },

    /// The text parsed but declares something invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn within(path: &Option<String>) -> String {
    path.as_ref().map(|p| format!(" in {p}")).unwrap_or_default()
}

fn expected_list(expected: &[String]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [one] => one.clone(),
        many => format!("one of {}", many.join(", ")),
    }
}

impl ParseError {
    /// Create a syntax error at a specific location.
    pub fn syntax<I, S>(line: usize, column: usize, expected: I, found: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Syntax {
            line,
            column,
            expected: expected.into_iter().map(Into::into).collect(),
            found: found.into(),
            path: None,
        }
    }

    /// Attach the enclosing parameter path to a syntax error that has none.
    pub fn in_parameter(self, path: Option<String>) -> Self {
        match self {
            Self::Syntax {
                line,
                column,
                expected,
                found,
                path: None,
            } => Self::Syntax {
                line,
                column,
                expected,
                found,
                path,
            },
            other => other,
        }
    }

    /// Rewrite the parameter path of a syntax error.
    pub fn map_path(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            Self::Syntax {
                line,
                column,
                expected,
                found,
                path: Some(path),
            } => Self::Syntax {
                line,
                column,
                expected,
                found,
                path: Some(f(&path)),
            },
            other => other,
        }
    }

    /// Create an I/O error for `path`.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Position of a syntax error.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Syntax { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }

    /// Parameter the error is about: the enclosing parameter of a syntax
    /// error, or the path a validation error names.
    pub fn parameter_path(&self) -> Option<&str> {
        match self {
            Self::Syntax { path, .. } => path.as_deref(),
            Self::Validation(v) => Some(v.path()),
            Self::Io { .. } => None,
        }
    }

    /// The validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }
}

/// A parameter declaration that is well-formed text but not a valid
/// parameter. Every variant names the offending parameter by its
/// dot-joined ancestor path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{path}: duplicate name '{name}'")]
    DuplicateName { path: String, name: String },

    #[error("{path}: invalid usage '{found}' (expected In, Out, InOut or Info)")]
    InvalidUsage { path: String, found: String },

    #[error("{path}: unknown type '{found}'")]
    UnknownType { path: String, found: String },

    /// The value's shape does not fit the declared type, e.g. a corner
    /// triple on a String parameter.
    #[error("{path}: {reason}")]
    ShapeMismatch { path: String, reason: String },

    #[error("{path}: invalid value '{found}': {reason}")]
    InvalidValue {
        path: String,
        found: String,
        reason: String,
    },

    #[error("{path}: missing ({tag} ...)")]
    MissingTag { path: String, tag: &'static str },

    #[error("{path}: Default is not allowed on an Out parameter")]
    DefaultOnOut { path: String },

    #[error("missing required section '{section}'")]
    MissingSection { section: String },

    #[error("{path}: missing required reserved parameter '{name}'")]
    MissingReserved { path: String, name: String },
}

impl ValidationError {
    /// Dotted path of the offending parameter.
    pub fn path(&self) -> &str {
        match self {
            Self::DuplicateName { path, .. }
            | Self::InvalidUsage { path, .. }
            | Self::UnknownType { path, .. }
            | Self::ShapeMismatch { path, .. }
            | Self::InvalidValue { path, .. }
            | Self::MissingTag { path, .. }
            | Self::DefaultOnOut { path }
            | Self::MissingReserved { path, .. } => path,
            Self::MissingSection { section } => section,
        }
    }
}

/// Errors from resolving a parameter tree at one corner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CornerResolutionError {
    /// A required parameter has no value at the requested corner.
    #[error("{path}: no {corner} value available")]
    Unavailable { path: String, corner: Corner },

    /// Two leaves in different sections flatten to the same key.
    #[error("{path}: resolved key {key} also produced by {first}")]
    DuplicateKey {
        key: String,
        first: String,
        path: String,
    },
}

impl CornerResolutionError {
    /// Full path of the offending parameter, section label included.
    pub fn path(&self) -> &str {
        match self {
            Self::Unavailable { path, .. } | Self::DuplicateKey { path, .. } => path,
        }
    }
}

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_display() {
        let e = ParseError::syntax(3, 7, ["number", "NA"], "x");
        assert_eq!(
            e.to_string(),
            "Syntax error at line 3, column 7: expected one of number, NA, found x"
        );
        assert_eq!(e.position(), Some((3, 7)));
        assert_eq!(e.parameter_path(), None);
    }

    #[test]
    fn test_syntax_path_attached_once() {
        let e = ParseError::syntax(1, 9, ["("], "stray")
            .in_parameter(Some("Model-Specific.tx_taps".into()))
            .in_parameter(Some("Model-Specific".into()));
        assert_eq!(e.parameter_path(), Some("Model-Specific.tx_taps"));
        assert_eq!(
            e.to_string(),
            "Syntax error at line 1, column 9 in Model-Specific.tx_taps: expected (, found stray"
        );
        let e = e.map_path(|p| p.to_uppercase());
        assert_eq!(e.parameter_path(), Some("MODEL-SPECIFIC.TX_TAPS"));
    }

    #[test]
    fn test_validation_path() {
        let e = ValidationError::DefaultOnOut {
            path: "Model-Specific.tx_taps.tap_0".into(),
        };
        assert_eq!(e.path(), "Model-Specific.tx_taps.tap_0");
        let wrapped: ParseError = e.into();
        assert!(wrapped.as_validation().is_some());
    }
}
