use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture device: {0}")]
    Open(String),
    #[error("failed to set capture filter: {0}")]
    Filter(String),
    #[error("capture error: {0}")]
    Other(String),
}

/// Hard HTTP/1 framing failures. "Needs more input" is not an error, it is
/// [`crate::http1::Status::Partial`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed message head: {0}")]
    Head(String),
    #[error("invalid Content-Length header")]
    ContentLength,
    #[error("invalid chunk framing")]
    Chunk,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported content encoding {0:?}")]
    Unsupported(String),
    #[error("malformed {encoding} body: {message}")]
    Malformed { encoding: String, message: String },
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response status {0}")]
    Status(u16),
    #[error("malformed collector response: {0}")]
    Malformed(String),
}
