use thiserror::Error;

/// Feiltaksonomi for kjernen.
///
/// Kun `SensorUnavailable` ved oppstart får avslutte en økt; resten
/// degraderes til "gammel men konsistent" tilstand og logges.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),

    #[error("companion link unreachable")]
    LinkUnreachable,

    #[error("file transfer failed: {0}")]
    TransferFailed(String),

    #[error("payload unparseable: {0}")]
    PayloadUnparseable(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for CoreError {
    fn from(e: csv::Error) -> Self {
        CoreError::StorageWriteFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
