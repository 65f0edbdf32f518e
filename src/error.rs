use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: 2,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: 3,
        }
    }

    pub fn invalid_field(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: 4,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: 5,
        }
    }
}

/// A partial DayProgress update named a field or value the record cannot hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidFieldError {
    #[error("Unknown progress field: {0}")]
    Unknown(String),
    #[error("Field {field} expects a {expected} value")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("Invalid value for {field}: {value}")]
    BadValue { field: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    #[error("Juz number must be within 1..=30: {0}")]
    JuzOutOfRange(u32),
    #[error("Name number must be within 1..=99: {0}")]
    NameOutOfRange(u32),
    #[error("Task title is required")]
    EmptyTaskTitle,
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(String),
    #[error("Stored data corrupted: {0}")]
    Corrupted(String),
    #[error("Storage is locked")]
    Locked,
}

/// Network-origin failures. These stop at the reconciler and are only
/// observable as a `SyncStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("client is offline")]
    Offline,
    #[error("network error: {0}")]
    Network(String),
    #[error("backend rejected sync: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error(transparent)]
    InvalidField(#[from] InvalidFieldError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<InvalidFieldError> for CliError {
    fn from(e: InvalidFieldError) -> Self {
        CliError::invalid_field(e.to_string())
    }
}

impl From<ActivityError> for CliError {
    fn from(e: ActivityError) -> Self {
        match e {
            ActivityError::TaskNotFound(_) => CliError::not_found(e.to_string()),
            _ => CliError::usage(e.to_string()),
        }
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        CliError::io(e.to_string())
    }
}

impl From<TrackerError> for CliError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::InvalidField(e) => e.into(),
            TrackerError::Activity(e) => e.into(),
            TrackerError::Storage(e) => e.into(),
        }
    }
}
