/// A request whose payload cannot be acted on. The request is dropped and no
/// state changes; the next valid request proceeds normally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("not ready to accept requests (state: {state})")]
    NotReady { state: &'static str },
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown request kind `{0}`")]
    UnknownKind(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Failures of the channel between the coordinator and a worker.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("worker `{0}` has been terminated")]
    Terminated(String),
    #[error("worker `{0}` disconnected")]
    Disconnected(String),
    #[error("worker `{worker}` panicked: {message}")]
    WorkerPanicked { worker: String, message: String },
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
