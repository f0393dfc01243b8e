use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Buffer too small: needed {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("Corrupt stream: decoded symbol outside its valid range")]
    CorruptStream,

    #[error("Buffer overflow: encoder ran past the end of its storage")]
    BufferOverflow,

    #[error("Packet error: {0}")]
    Packet(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Packet(err.to_string())
    }
}
