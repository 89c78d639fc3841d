use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] canopy_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error("strict mode failed: warnings={warning_count}, errors={error_count}")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<canopy_core::CoreError> for CliError {
    fn from(error: canopy_core::CoreError) -> Self {
        match error {
            canopy_core::CoreError::Validation(error) => Self::Validation(error),
            canopy_core::CoreError::Serialization(error) => Self::Serialization(error),
            canopy_core::CoreError::Io(error) => Self::Io(error),
            canopy_core::CoreError::Source(error) => Self::Command(error.to_string()),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::StrictModeViolation { .. } => 5,
            Self::Command(_) | Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}
