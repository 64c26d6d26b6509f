use thiserror::Error;

use lockstep_core::CoreError;

pub type ThreadResult<T> = Result<T, ThreadError>;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("runtime error: {0}")]
    Core(#[from] CoreError),

    #[error("processor {processor} panicked during its superstep program")]
    Panicked { processor: usize },

    #[error("cannot spawn a world of zero processors")]
    EmptyWorld,
}
