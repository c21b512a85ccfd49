//! Change events, the change-feed capability, and event classification.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tandem_core::{RecordSchema, Result, SourceRecord};

/// A mutation observed on the primary store.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A record was created.
    Insert {
        /// Record id.
        id: String,
        /// Full record as inserted.
        record: SourceRecord,
    },
    /// Fields of a record changed.
    Update {
        /// Record id.
        id: String,
        /// Names of the fields whose value changed.
        changed_fields: BTreeSet<String>,
        /// Full record after the update, when the feed delivers it.
        record: Option<SourceRecord>,
    },
    /// A record was deleted.
    Delete {
        /// Record id.
        id: String,
    },
}

impl ChangeEvent {
    /// Id of the affected record.
    pub fn id(&self) -> &str {
        match self {
            Self::Insert { id, .. } | Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }

    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Stream of change events. An `Err` item or the end of the stream means
/// the subscription is gone and the consumer should resubscribe.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

/// A live stream of mutations on the primary store.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a new subscription. Events committed before the call are not
    /// replayed.
    async fn subscribe(&self) -> Result<ChangeStream>;
}

/// What the watcher does with one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Re-embed after the debounce delay. The record is a logging hint only.
    Embed {
        /// Record id.
        id: String,
        /// Record state carried by the event, if any.
        hint: Option<SourceRecord>,
    },
    /// Patch passthrough metadata in place, without re-embedding.
    Patch {
        /// Record id.
        id: String,
        /// Passthrough fields that changed.
        fields: Vec<String>,
        /// Full record, if the feed delivered it.
        record: Option<SourceRecord>,
    },
    /// Cancel pending work and drop the record's vectors.
    Delete {
        /// Record id.
        id: String,
    },
    /// Nothing the index cares about changed.
    Ignore {
        /// Record id.
        id: String,
    },
}

/// Decide what an event means for the vector index.
///
/// Inserts always embed, even when only passthrough fields are populated.
/// Updates embed when a text-bearing field changed, patch when only
/// passthrough fields changed, and are ignored otherwise.
pub fn classify(schema: &RecordSchema, event: ChangeEvent) -> Action {
    match event {
        ChangeEvent::Insert { id, record } => Action::Embed {
            id,
            hint: Some(record),
        },
        ChangeEvent::Update {
            id,
            changed_fields,
            record,
        } => {
            if schema.touches_text(&changed_fields) {
                return Action::Embed { id, hint: record };
            }
            let fields: Vec<String> = schema
                .touched_passthrough(&changed_fields)
                .into_iter()
                .map(str::to_string)
                .collect();
            if fields.is_empty() {
                Action::Ignore { id }
            } else {
                Action::Patch { id, fields, record }
            }
        }
        ChangeEvent::Delete { id } => Action::Delete { id },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn changed(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn update(names: &[&str]) -> ChangeEvent {
        ChangeEvent::Update {
            id: "car-1".into(),
            changed_fields: changed(names),
            record: None,
        }
    }

    #[test]
    fn test_insert_always_embeds() {
        let schema = RecordSchema::catalog();
        let record = SourceRecord::new("car-1").with_field("price", 1i64);
        let action = classify(
            &schema,
            ChangeEvent::Insert {
                id: "car-1".into(),
                record: record.clone(),
            },
        );
        assert_eq!(
            action,
            Action::Embed {
                id: "car-1".into(),
                hint: Some(record)
            }
        );
    }

    #[test]
    fn test_text_update_embeds() {
        let schema = RecordSchema::catalog();
        let action = classify(&schema, update(&["description", "price"]));
        assert!(matches!(action, Action::Embed { .. }));
    }

    #[test]
    fn test_passthrough_update_patches() {
        let schema = RecordSchema::catalog();
        let action = classify(&schema, update(&["price", "in_stock", "color"]));
        assert_eq!(
            action,
            Action::Patch {
                id: "car-1".into(),
                fields: vec!["in_stock".into(), "price".into()],
                record: None,
            }
        );
    }

    #[test]
    fn test_unrelated_update_ignored() {
        let schema = RecordSchema::catalog();
        let action = classify(&schema, update(&["color"]));
        assert_eq!(action, Action::Ignore { id: "car-1".into() });

        let action = classify(&schema, update(&[]));
        assert!(matches!(action, Action::Ignore { .. }));
    }

    #[test]
    fn test_delete() {
        let schema = RecordSchema::catalog();
        let event = ChangeEvent::Delete { id: "car-9".into() };
        assert_eq!(event.id(), "car-9");
        assert_eq!(event.kind(), "delete");
        assert_eq!(classify(&schema, event), Action::Delete { id: "car-9".into() });
    }
}
