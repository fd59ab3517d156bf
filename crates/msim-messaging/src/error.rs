use thiserror::Error;

use crate::bus::ContextId;
use crate::message::HandlerId;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("a main-thread context is already registered")]
    MainAlreadyRegistered,

    #[error("the calling thread already has a context on this bus")]
    ThreadAlreadyRegistered,

    #[error("the calling thread has no context on this bus")]
    ThreadNotRegistered,

    #[error("operation requires the main-thread context (caller is {0})")]
    NotMainThread(ContextId),

    #[error("instantaneous delivery to handler {target} in context {target_ctx} from context {caller_ctx}")]
    CrossContext {
        target: HandlerId,
        target_ctx: ContextId,
        caller_ctx: ContextId,
    },

    #[error("handler {0} is not registered")]
    UnknownHandler(HandlerId),

    #[error("context {0} is not registered")]
    UnknownContext(ContextId),
}

pub type MessagingResult<T> = Result<T, MessagingError>;
