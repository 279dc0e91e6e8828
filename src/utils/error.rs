use thiserror::Error;

#[derive(Error, Debug)]
pub enum SparseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Topology error: {message}")]
    TopologyError { message: String },

    #[error("\"{stream}\" is not a defined output stream for \"{component}\"")]
    UndeclaredStream { component: String, stream: String },

    #[error("Invalid emit: {message}")]
    InvalidEmit { message: String },

    #[error("Component {component} failed: {message}")]
    ComponentError { component: String, message: String },
}

/// How bad an error is, used by the binaries to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SparseError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn topology(message: impl Into<String>) -> Self {
        Self::TopologyError {
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl ToString) -> Self {
        Self::ComponentError {
            component: component.into(),
            message: message.to_string(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SparseError::ConfigError { .. }
            | SparseError::MissingConfigError { .. }
            | SparseError::InvalidConfigValueError { .. }
            | SparseError::TomlError(_)
            | SparseError::TopologyError { .. } => ErrorSeverity::High,
            SparseError::ComponentError { .. }
            | SparseError::UndeclaredStream { .. }
            | SparseError::InvalidEmit { .. } => ErrorSeverity::Medium,
            SparseError::IoError(_)
            | SparseError::SerializationError(_)
            | SparseError::ProtocolError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SparseError::ConfigError { .. }
            | SparseError::MissingConfigError { .. }
            | SparseError::InvalidConfigValueError { .. }
            | SparseError::TomlError(_) => "Check config.json (or the file given with --config)",
            SparseError::TopologyError { .. } => {
                "Check the topology's inputs, outputs and groupings"
            }
            SparseError::UndeclaredStream { .. } => {
                "Declare the stream in the component's outputs before emitting to it"
            }
            SparseError::InvalidEmit { .. } => "Give every tracked spout tuple its own message id",
            SparseError::ComponentError { .. } => "Inspect the component log for the failing tuple",
            SparseError::ProtocolError { .. } | SparseError::SerializationError(_) => {
                "Make sure --serializer matches the topology's multilang serializer"
            }
            SparseError::IoError(_) => "Check file permissions and that stdin/stdout are open",
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, SparseError>;
