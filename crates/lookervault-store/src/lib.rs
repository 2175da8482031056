mod connection;
mod error;
mod model;
mod schema;
mod store;

pub use connection::StoreConfig;
pub use error::StoreError;
pub use model::{
    Checkpoint, CheckpointState, CheckpointStatus, ContentId, ContentItem, ContentType, DlqEntry,
    DlqFilter, IdMapping, Session, SessionKind, SessionStatus,
};
pub use schema::CURRENT_SCHEMA_VERSION;
pub use store::{SqliteStore, Store};
