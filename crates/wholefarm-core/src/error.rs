//! Errors for loading a farm and running it.

use wholefarm_logic::{AllocationError, RequestError};

/// Problems with a farm configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Request(RequestError),
    DuplicateResource(String),
    DuplicateActivity(String),
    UnknownTransmutationSource { target: String, source: String },
    InvalidValue { field: String, value: f64 },
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

impl From<RequestError> for ConfigError {
    fn from(e: RequestError) -> Self {
        ConfigError::Request(e)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Json(e) => write!(f, "JSON error: {}", e),
            ConfigError::Request(e) => write!(f, "Invalid request: {}", e),
            ConfigError::DuplicateResource(name) => {
                write!(f, "Resource '{}' is defined more than once", name)
            }
            ConfigError::DuplicateActivity(name) => {
                write!(f, "Activity '{}' is defined more than once", name)
            }
            ConfigError::UnknownTransmutationSource { target, source } => write!(
                f,
                "Transmutation into '{}' draws on unknown resource '{}'",
                target, source
            ),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value {} for {}", value, field)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure while stepping a simulation.
#[derive(Debug)]
pub enum SimulationError {
    Allocation { month: u32, error: AllocationError },
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::Allocation { month, error } => {
                write!(f, "Allocation failed in month {}: {}", month, error)
            }
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Allocation { error, .. } => Some(error),
        }
    }
}
