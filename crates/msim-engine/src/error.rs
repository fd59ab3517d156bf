use thiserror::Error;

use msim_agent::AgentError;
use msim_core::CoreError;
use msim_messaging::MessagingError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("work groups have not been started")]
    NotStarted,
}

pub type EngineResult<T> = Result<T, EngineError>;
