use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of Looker artifacts LookerVault knows how to back up.
///
/// Codes are part of the on-disk format and must never change once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ContentType {
    Dashboard = 1,
    Look = 2,
    LookmlModel = 3,
    Explore = 4,
    Folder = 5,
    Board = 6,
    User = 7,
    Group = 8,
    Role = 9,
    PermissionSet = 10,
    ModelSet = 11,
    ScheduledPlan = 12,
}

impl ContentType {
    pub const ALL: [ContentType; 12] = [
        ContentType::Dashboard,
        ContentType::Look,
        ContentType::LookmlModel,
        ContentType::Explore,
        ContentType::Folder,
        ContentType::Board,
        ContentType::User,
        ContentType::Group,
        ContentType::Role,
        ContentType::PermissionSet,
        ContentType::ModelSet,
        ContentType::ScheduledPlan,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// The token used inside a composite [`ContentId`], e.g. `dashboard`.
    pub fn name(self) -> &'static str {
        match self {
            ContentType::Dashboard => "dashboard",
            ContentType::Look => "look",
            ContentType::LookmlModel => "lookml_model",
            ContentType::Explore => "explore",
            ContentType::Folder => "folder",
            ContentType::Board => "board",
            ContentType::User => "user",
            ContentType::Group => "group",
            ContentType::Role => "role",
            ContentType::PermissionSet => "permission_set",
            ContentType::ModelSet => "model_set",
            ContentType::ScheduledPlan => "scheduled_plan",
        }
    }

    /// `true` for the two content types the Looker API can filter by folder
    /// server-side.
    pub fn supports_folder_filter(self) -> bool {
        matches!(self, ContentType::Dashboard | ContentType::Look)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown content type {s:?}"))
    }
}

/// A globally unique content id of the form `"{type_name}::{looker_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(content_type: ContentType, looker_id: i64) -> Self {
        Self(format!("{}::{}", content_type.name(), looker_id))
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into();
        let (type_name, looker_id) = raw
            .split_once("::")
            .ok_or_else(|| format!("malformed content id {raw:?}"))?;
        ContentType::from_str(type_name)?;
        looker_id
            .parse::<i64>()
            .map_err(|e| format!("malformed content id {raw:?}: {e}"))?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn content_type(&self) -> ContentType {
        let (type_name, _) = self.0.split_once("::").expect("validated at construction");
        ContentType::from_str(type_name).expect("validated at construction")
    }

    pub fn looker_id(&self) -> i64 {
        let (_, looker_id) = self.0.split_once("::").expect("validated at construction");
        looker_id.parse().expect("validated at construction")
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One Looker artifact as extracted from the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: ContentId,
    pub content_type: ContentType,
    pub name: String,
    pub owner_id: Option<i64>,
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub content_data: Vec<u8>,
}

impl ContentItem {
    pub fn content_size(&self) -> usize {
        self.content_data.len()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Progress record for one (session, content type) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub id: i64,
    pub session_id: Option<uuid::Uuid>,
    pub content_type: ContentType,
    pub state: CheckpointState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub item_count: i64,
    pub error_message: Option<String>,
}

impl Checkpoint {
    pub fn status(&self) -> CheckpointStatus {
        match (&self.completed_at, &self.error_message) {
            (_, Some(_)) => CheckpointStatus::Failed,
            (Some(_), None) => CheckpointStatus::Completed,
            (None, None) => CheckpointStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    Failed,
}

/// Typed shape of [`Checkpoint::state`]; persisted as JSON so the Store
/// never needs to know it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub last_offset: i64,
    #[serde(default)]
    pub total_processed: i64,
    #[serde(default)]
    pub batch_size: i64,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub folder_ids: Vec<i64>,
    #[serde(default)]
    pub completed_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Extraction,
    Restoration,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Extraction => "extraction",
            SessionKind::Restoration => "restoration",
        }
    }
}

/// Outer audit record for one extraction or restoration run.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: uuid::Uuid,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub items_processed: i64,
    pub errors: i64,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn new(kind: SessionKind, config: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            completed_at: None,
            status: SessionStatus::Pending,
            items_processed: 0,
            errors: 0,
            config,
            metadata: serde_json::Value::Null,
        }
    }

    /// Marks the session completed, enforcing the invariant that
    /// `status = Completed` implies `completed_at.is_some()`.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(at);
    }

    pub fn mark_failed(&mut self) {
        self.status = SessionStatus::Failed;
    }

    pub fn mark_cancelled(&mut self) {
        self.status = SessionStatus::Cancelled;
    }
}

/// A `(content_type, source_id) -> destination_id` translation row for
/// cross-instance restoration.
#[derive(Debug, Clone, PartialEq)]
pub struct IdMapping {
    pub content_type: ContentType,
    pub source_id: i64,
    pub destination_id: i64,
    pub source_instance_url: String,
    pub destination_instance_url: String,
    pub created_at: DateTime<Utc>,
}

/// A durable record of a restoration item that failed permanently.
#[derive(Debug, Clone, PartialEq)]
pub struct DlqEntry {
    pub id: i64,
    pub session_id: uuid::Uuid,
    pub content_type: ContentType,
    pub content_id: ContentId,
    pub content_data: Vec<u8>,
    pub error_type: String,
    pub error_message: String,
    pub retry_count: i64,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub content_type: Option<ContentType>,
    pub session_id: Option<uuid::Uuid>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn content_id_round_trips() {
        let id = ContentId::new(ContentType::Dashboard, 42);
        assert_eq!(id.as_str(), "dashboard::42");
        assert_eq!(ContentId::parse("dashboard::42").unwrap(), id);
        assert_eq!(id.content_type(), ContentType::Dashboard);
    }

    #[test]
    fn content_id_exposes_the_looker_id() {
        let id = ContentId::new(ContentType::Look, 17);
        assert_eq!(id.looker_id(), 17);
    }

    #[test]
    fn content_id_rejects_unknown_type() {
        assert!(ContentId::parse("not_a_type::1").is_err());
    }

    #[test]
    fn content_id_rejects_non_numeric_suffix() {
        assert!(ContentId::parse("dashboard::abc").is_err());
    }

    #[test]
    fn content_type_codes_are_stable() {
        assert_eq!(ContentType::Dashboard.code(), 1);
        assert_eq!(ContentType::ScheduledPlan.code(), 12);
        assert_eq!(ContentType::from_code(5), Some(ContentType::Folder));
        assert_eq!(ContentType::from_code(99), None);
    }

    #[rstest]
    #[case(ContentType::Dashboard, true)]
    #[case(ContentType::Look, true)]
    #[case(ContentType::LookmlModel, false)]
    #[case(ContentType::Explore, false)]
    #[case(ContentType::Folder, false)]
    #[case(ContentType::Board, false)]
    #[case(ContentType::User, false)]
    #[case(ContentType::Group, false)]
    #[case(ContentType::Role, false)]
    #[case(ContentType::PermissionSet, false)]
    #[case(ContentType::ModelSet, false)]
    #[case(ContentType::ScheduledPlan, false)]
    fn only_dashboard_and_look_support_folder_filter(#[case] t: ContentType, #[case] expected: bool) {
        assert_eq!(t.supports_folder_filter(), expected);
    }

    #[test]
    fn checkpoint_status_follows_presence_rules() {
        let base = Checkpoint {
            id: 1,
            session_id: None,
            content_type: ContentType::Look,
            state: CheckpointState::default(),
            started_at: Utc::now(),
            completed_at: None,
            item_count: 0,
            error_message: None,
        };
        assert_eq!(base.status(), CheckpointStatus::InProgress);

        let mut completed = base.clone();
        completed.completed_at = Some(Utc::now());
        assert_eq!(completed.status(), CheckpointStatus::Completed);

        let mut failed = base.clone();
        failed.error_message = Some("boom".to_string());
        assert_eq!(failed.status(), CheckpointStatus::Failed);
    }
}
