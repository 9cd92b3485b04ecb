use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] m3u8_core::CoreError),

    #[error("Control server error: {0}")]
    Server(#[from] rest_server::RequestError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}
