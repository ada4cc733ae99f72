use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid media url: {0}")]
    InvalidUrl(String),

    #[error("Media source already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
