//! Error types for AMI FFI operations.

use lib_ibis::ParseError;
use lib_types::ami::SessionState;
use thiserror::Error;

/// Boxed error from a dynamic-loader implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn with_message(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(": {m}"),
        _ => String::new(),
    }
}

/// Errors that can occur during AMI model operations.
#[derive(Debug, Error)]
pub enum AmiError {
    /// The shared library could not be opened.
    #[error("Failed to load library '{path}': {source}")]
    LoadFailure {
        path: String,
        #[source]
        source: BoxError,
    },

    /// Required symbol not found in library.
    #[error("Symbol '{symbol}' not found in library '{path}'")]
    SymbolNotFound { path: String, symbol: String },

    /// AMI_Init returned an error.
    #[error("AMI_Init failed with code {code}{}", with_message(.message))]
    InitFailed { code: i64, message: Option<String> },

    /// AMI_GetWave returned an error. The model's parameter text, if any,
    /// is kept as the message.
    #[error("AMI_GetWave failed with code {code}{}", with_message(.message))]
    GetWaveFailed { code: i64, message: Option<String> },

    /// AMI_Resolve returned an error.
    #[error("AMI_Resolve failed with code {code}{}", with_message(.message))]
    ResolveFailed { code: i64, message: Option<String> },

    /// AMI_Close returned an error.
    #[error("AMI_Close failed with code {code}")]
    CloseFailed { code: i64 },

    /// Buffer lengths disagree with each other or with the paired Init.
    /// Raised before any native call.
    #[error("Shape mismatch in {operation}: {reason}")]
    ShapeMismatch {
        operation: &'static str,
        reason: String,
    },

    /// Call issued out of protocol order. No native call was made.
    #[error("Cannot {operation} a session in state {actual}")]
    InvalidState {
        operation: &'static str,
        actual: SessionState,
    },

    /// The model wrote past the end of a buffer it was given.
    #[error("Buffer overrun detected: model '{model}' wrote beyond allocated {size} samples")]
    BufferOverrun {
        model: String,
        size: usize,
        detected_index: Option<usize>,
    },

    /// Invalid parameter.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Operation not supported by this model.
    #[error("Operation '{operation}' not supported by model")]
    NotSupported { operation: String },

    /// Parameter text could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An operation failed and the close that followed failed too.
    #[error("{primary} (AMI_Close afterwards also failed: {secondary})")]
    CloseAfterFailure {
        #[source]
        primary: Box<AmiError>,
        secondary: Box<AmiError>,
    },
}

impl AmiError {
    /// Create a load failure.
    pub fn load_failure(path: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::LoadFailure {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Create a symbol not found error.
    pub fn symbol_not_found(path: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            path: path.into(),
            symbol: symbol.into(),
        }
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            operation,
            reason: reason.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(operation: &'static str, actual: SessionState) -> Self {
        Self::InvalidState { operation, actual }
    }

    /// Whether the session can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InitFailed { .. } | Self::BufferOverrun { .. } | Self::LoadFailure { .. }
        ) || matches!(self, Self::CloseAfterFailure { primary, .. } if primary.is_fatal())
    }

    /// The first failure, looking through a recorded close failure.
    pub fn primary(&self) -> &AmiError {
        match self {
            Self::CloseAfterFailure { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// Diagnostic text the model produced, if any.
    pub fn message(&self) -> Option<&str> {
        match self.primary() {
            Self::InitFailed { message, .. }
            | Self::GetWaveFailed { message, .. }
            | Self::ResolveFailed { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Result type for AMI operations.
pub type AmiResult<T> = Result<T, AmiError>;
