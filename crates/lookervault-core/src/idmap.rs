use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use lookervault_codec::Value;
use lookervault_store::{ContentType, IdMapping, Store, StoreError};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdMappingError {
    #[error("unmapped reference in field {field}: source id {source_id} has no destination mapping")]
    Unmapped { field: String, source_id: i64 },
}

/// Translates source-instance ids embedded in a payload to destination-
/// instance ids recorded during this (or a prior, resumed) restoration run.
pub struct IdMapper {
    store: Arc<dyn Store>,
    destination_url: String,
    /// "First occurrence defines canonical query id; subsequent references
    /// translate through IDMapper" — embedded dashboard-element query ids
    /// are dashboard-scoped tokens, not cross-instance ids, so this just
    /// records which ones have been seen in this run rather than calling
    /// the Store.
    seen_queries: Mutex<HashSet<String>>,
}

impl IdMapper {
    pub fn new(store: Arc<dyn Store>, destination_url: impl Into<String>) -> Self {
        Self {
            store,
            destination_url: destination_url.into(),
            seen_queries: Mutex::new(HashSet::new()),
        }
    }

    pub fn translate(&self, content_type: ContentType, source_id: i64) -> Option<i64> {
        self.store
            .get_destination_id(content_type, source_id, &self.destination_url)
            .ok()
            .flatten()
    }

    pub fn record_mapping(
        &self,
        content_type: ContentType,
        source_id: i64,
        destination_id: i64,
        source_instance_url: &str,
    ) -> Result<(), StoreError> {
        self.store.put_id_mapping(&IdMapping {
            content_type,
            source_id,
            destination_id,
            source_instance_url: source_instance_url.to_string(),
            destination_instance_url: self.destination_url.clone(),
            created_at: Utc::now(),
        })
    }

    /// Rewrites `folder_id`, `user_id`, `role_ids[]`, `group_ids[]`, and
    /// embedded `query_id` fields in place, walking the whole tree (fields
    /// can be nested inside dashboard elements). Un-mappable references are
    /// left unchanged and reported; the Restorer decides whether that's fatal.
    pub fn translate_payload(
        &self,
        payload: &mut Value,
        content_type: ContentType,
    ) -> Vec<IdMappingError> {
        let mut errors = Vec::new();
        self.walk(payload, content_type, &mut errors);
        errors
    }

    fn walk(&self, value: &mut Value, content_type: ContentType, errors: &mut Vec<IdMappingError>) {
        match value {
            Value::Map(entries) => {
                for (key, v) in entries.iter_mut() {
                    match key.as_str() {
                        "folder_id" => self.translate_scalar(v, ContentType::Folder, "folder_id", errors),
                        "user_id" => self.translate_scalar(v, ContentType::User, "user_id", errors),
                        "role_ids" => self.translate_array(v, ContentType::Role, "role_ids", errors),
                        "group_ids" => self.translate_array(v, ContentType::Group, "group_ids", errors),
                        "query_id" => self.translate_query_id(v),
                        _ => {}
                    }
                    self.walk(v, content_type, errors);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.walk(item, content_type, errors);
                }
            }
            _ => {}
        }
    }

    fn translate_scalar(
        &self,
        value: &mut Value,
        target_type: ContentType,
        field: &str,
        errors: &mut Vec<IdMappingError>,
    ) {
        if let Value::Int(source_id) = *value {
            match self.translate(target_type, source_id) {
                Some(destination_id) => *value = Value::Int(destination_id),
                None => errors.push(IdMappingError::Unmapped {
                    field: field.to_string(),
                    source_id,
                }),
            }
        }
    }

    fn translate_array(
        &self,
        value: &mut Value,
        target_type: ContentType,
        field: &str,
        errors: &mut Vec<IdMappingError>,
    ) {
        if let Value::Array(items) = value {
            for item in items.iter_mut() {
                self.translate_scalar(item, target_type, field, errors);
            }
        }
    }

    fn translate_query_id(&self, value: &Value) {
        if let Value::Str(query_id) = value {
            self.seen_queries.lock().insert(query_id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use lookervault_store::{Checkpoint, ContentId, ContentItem, DlqEntry, DlqFilter, Session};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeStore {
        mappings: StdMutex<Vec<IdMapping>>,
    }

    impl Store for FakeStore {
        fn put_content(&self, _item: &ContentItem) -> Result<(), StoreError> {
            Ok(())
        }
        fn get_content(&self, _id: &ContentId) -> Result<Option<ContentItem>, StoreError> {
            Ok(None)
        }
        fn list_content(
            &self,
            _content_type: ContentType,
            _include_deleted: bool,
            _limit: i64,
            _offset: i64,
            _with_data: bool,
        ) -> Result<Vec<ContentItem>, StoreError> {
            Ok(vec![])
        }
        fn soft_delete(&self, _id: &ContentId) -> Result<(), StoreError> {
            Ok(())
        }
        fn hard_delete_older_than(&self, _retention: chrono::Duration) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn put_checkpoint(&self, _checkpoint: &Checkpoint) -> Result<i64, StoreError> {
            Ok(1)
        }
        fn get_latest_incomplete_checkpoint(
            &self,
            _content_type: ContentType,
            _session_id: Option<Uuid>,
        ) -> Result<Option<Checkpoint>, StoreError> {
            Ok(None)
        }
        fn put_session(&self, _session: &Session) -> Result<(), StoreError> {
            Ok(())
        }
        fn update_session(&self, _session: &Session) -> Result<(), StoreError> {
            Ok(())
        }
        fn get_session(&self, _id: Uuid) -> Result<Option<Session>, StoreError> {
            Ok(None)
        }
        fn list_sessions(
            &self,
            _kind: Option<lookervault_store::SessionKind>,
            _limit: i64,
        ) -> Result<Vec<Session>, StoreError> {
            Ok(Vec::new())
        }
        fn put_id_mapping(&self, mapping: &IdMapping) -> Result<(), StoreError> {
            self.mappings.lock().unwrap().push(mapping.clone());
            Ok(())
        }
        fn get_destination_id(
            &self,
            content_type: ContentType,
            source_id: i64,
            destination_instance_url: &str,
        ) -> Result<Option<i64>, StoreError> {
            Ok(self
                .mappings
                .lock()
                .unwrap()
                .iter()
                .find(|m| {
                    m.content_type == content_type
                        && m.source_id == source_id
                        && m.destination_instance_url == destination_instance_url
                })
                .map(|m| m.destination_id))
        }
        fn dlq_add(&self, _entry: &DlqEntry) -> Result<(), StoreError> {
            Ok(())
        }
        fn dlq_list(&self, _filter: &DlqFilter) -> Result<Vec<DlqEntry>, StoreError> {
            Ok(vec![])
        }
        fn dlq_remove(&self, _id: i64) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn mapper_with(mappings: Vec<(ContentType, i64, i64)>) -> IdMapper {
        let store = Arc::new(FakeStore::default());
        for (content_type, source_id, destination_id) in mappings {
            store
                .put_id_mapping(&IdMapping {
                    content_type,
                    source_id,
                    destination_id,
                    source_instance_url: "https://src.looker.com".to_string(),
                    destination_instance_url: "https://dst.looker.com".to_string(),
                    created_at: ChronoUtc::now(),
                })
                .unwrap();
        }
        IdMapper::new(store, "https://dst.looker.com")
    }

    #[test]
    fn translates_known_folder_and_user_ids() {
        let mapper = mapper_with(vec![
            (ContentType::Folder, 10, 20),
            (ContentType::User, 5, 9),
        ]);
        let mut payload = Value::Map(vec![
            ("folder_id".to_string(), Value::Int(10)),
            ("user_id".to_string(), Value::Int(5)),
        ]);

        let errors = mapper.translate_payload(&mut payload, ContentType::Dashboard);
        assert!(errors.is_empty());
        assert_eq!(payload.get("folder_id").unwrap().as_int(), Some(20));
        assert_eq!(payload.get("user_id").unwrap().as_int(), Some(9));
    }

    #[test]
    fn reports_unmapped_references_and_leaves_them_unchanged() {
        let mapper = mapper_with(vec![]);
        let mut payload = Value::Map(vec![("folder_id".to_string(), Value::Int(999))]);

        let errors = mapper.translate_payload(&mut payload, ContentType::Dashboard);
        assert_eq!(
            errors,
            vec![IdMappingError::Unmapped {
                field: "folder_id".to_string(),
                source_id: 999
            }]
        );
        assert_eq!(payload.get("folder_id").unwrap().as_int(), Some(999));
    }

    #[test]
    fn translates_id_arrays() {
        let mapper = mapper_with(vec![(ContentType::Role, 1, 100), (ContentType::Role, 2, 200)]);
        let mut payload = Value::Map(vec![(
            "role_ids".to_string(),
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
        )]);

        let errors = mapper.translate_payload(&mut payload, ContentType::Group);
        assert!(errors.is_empty());
        let translated = payload.get("role_ids").unwrap().as_array().unwrap();
        assert_eq!(translated[0].as_int(), Some(100));
        assert_eq!(translated[1].as_int(), Some(200));
    }

    #[test]
    fn translates_nested_dashboard_elements() {
        let mapper = mapper_with(vec![(ContentType::User, 1, 2)]);
        let mut payload = Value::Map(vec![(
            "elements".to_string(),
            Value::Array(vec![Value::Map(vec![("user_id".to_string(), Value::Int(1))])]),
        )]);

        let errors = mapper.translate_payload(&mut payload, ContentType::Dashboard);
        assert!(errors.is_empty());
        let elements = payload.get("elements").unwrap().as_array().unwrap();
        assert_eq!(elements[0].get("user_id").unwrap().as_int(), Some(2));
    }
}
