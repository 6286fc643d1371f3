use thiserror::Error;

/// Failures that prevent a request from being evaluated.
///
/// Policy rejections (a slot that is not free, a cancellation with nothing
/// to cancel) are not errors; they come back as typed outcomes.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The store could not be reached, the query failed, or the caller's
    /// deadline expired before the store answered.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// More than one row matched a key the schema declares unique.
    #[error("data integrity violation: {rows} {table} rows for {key}")]
    DataIntegrity {
        table: &'static str,
        key: String,
        rows: usize,
    },
}

impl ScheduleError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        ScheduleError::StoreUnavailable(err.to_string())
    }

    /// True when the request never reached a verdict because of the store.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, ScheduleError::StoreUnavailable(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for ScheduleError {
    fn from(err: rusqlite::Error) -> Self {
        ScheduleError::StoreUnavailable(err.to_string())
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
