use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MultilingualError {
    #[error("Endpoint not available error: {0}")]
    FileDownloadError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Value error: {0}")]
    ValueError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(feature = "remote")]
impl From<cached_path::Error> for MultilingualError {
    fn from(error: cached_path::Error) -> Self {
        MultilingualError::FileDownloadError(error.to_string())
    }
}

impl From<std::io::Error> for MultilingualError {
    fn from(error: std::io::Error) -> Self {
        MultilingualError::IOError(error.to_string())
    }
}

impl From<TchError> for MultilingualError {
    fn from(error: TchError) -> Self {
        MultilingualError::TchError(error.to_string())
    }
}

impl From<serde_json::Error> for MultilingualError {
    fn from(error: serde_json::Error) -> Self {
        MultilingualError::ParseError(error.to_string())
    }
}

impl From<csv::Error> for MultilingualError {
    fn from(error: csv::Error) -> Self {
        MultilingualError::ParseError(error.to_string())
    }
}

impl From<calamine::Error> for MultilingualError {
    fn from(error: calamine::Error) -> Self {
        MultilingualError::ParseError(error.to_string())
    }
}
