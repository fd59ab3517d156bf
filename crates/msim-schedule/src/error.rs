use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("schedule parse error: {0}")]
    Parse(String),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
