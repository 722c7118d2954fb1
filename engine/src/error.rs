/// Error type returned by task bodies.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// What every pre-task and post-task returns.
pub type TaskResult = Result<(), TaskError>;

/// A capture input could not be opened. Fatal for the engine that needed it.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source {descriptor} unavailable: {reason}")]
    Unavailable { descriptor: String, reason: String },
}

/// Why a single `read_next` call produced no frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("end of stream")]
    EndOfStream,
    #[error("read failure: {0}")]
    Failure(String),
}

/// A fault raised inside a registered task. Logged at the dispatch boundary,
/// never propagated past `advance()`.
#[derive(Debug, thiserror::Error)]
pub enum TaskFault {
    #[error("task `{task}` failed: {source}")]
    Failed { task: String, source: TaskError },
    #[error("task `{task}` panicked: {message}")]
    Panicked { task: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to build pre-task worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
