use chrono::{DateTime, Utc};

/// Parameters for one `LookerClient::iterate` call. `offset` is the starting
/// page offset; coordinators advance it between calls.
#[derive(Debug, Clone, Default)]
pub struct IterateParams {
    pub fields: Option<Vec<String>>,
    pub batch_size: i64,
    pub updated_after: Option<DateTime<Utc>>,
    pub folder_id: Option<i64>,
    pub offset: i64,
}

impl IterateParams {
    pub fn with_offset(&self, offset: i64) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }
}

/// Returned by `self_info()` for a connection check before a run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfInfo {
    pub user_id: i64,
    pub email: Option<String>,
    pub instance_url: String,
}
