//! List data model.
//!
//! Items carry no stable id. Two items are "the same" when their content text
//! is byte-for-byte equal, and that rule drives both dedupe-on-add and
//! remove-by-text.

use serde::{Deserialize, Serialize};

/// A single entry in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Content text; also the item's identity within its list
    pub item: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, rename = "textColor")]
    pub text_color: String,
    /// Creation time, epoch milliseconds
    pub created: i64,
}

impl Item {
    pub fn new(
        item: impl Into<String>,
        color: impl Into<String>,
        text_color: impl Into<String>,
        created: i64,
    ) -> Self {
        Self {
            item: item.into(),
            color: color.into(),
            text_color: text_color.into(),
            created,
        }
    }
}

/// Durable form of a list: what the store keeps and what subscribers see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDocument {
    pub name: Option<String>,
    /// Most recent first
    pub items: Vec<Item>,
}

impl ListDocument {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            items: Vec::new(),
        }
    }
}

/// In-memory record for a cached list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRecord {
    pub id: String,
    pub name: Option<String>,
    /// Most recent first
    pub items: Vec<Item>,
}

impl ListRecord {
    /// Record for a list the store has never seen.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            items: Vec::new(),
        }
    }

    pub fn from_document(id: impl Into<String>, doc: ListDocument) -> Self {
        Self {
            id: id.into(),
            name: doc.name,
            items: doc.items,
        }
    }

    /// Snapshot of the visible state.
    pub fn document(&self) -> ListDocument {
        ListDocument {
            name: self.name.clone(),
            items: self.items.clone(),
        }
    }

    pub fn contains(&self, content: &str) -> bool {
        self.items.iter().any(|i| i.item == content)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_document() {
        let mut doc = ListDocument::named("Groceries");
        doc.items.push(Item::new("milk", "#fff", "#000", 1));

        let record = ListRecord::from_document("L1", doc.clone());
        assert_eq!(record.id, "L1");
        assert_eq!(record.name.as_deref(), Some("Groceries"));
        assert!(record.contains("milk"));
        assert_eq!(record.document(), doc);
    }

    #[test]
    fn test_empty_record() {
        let record = ListRecord::empty("L2");
        assert!(record.name.is_none());
        assert!(record.is_empty());
        assert_eq!(record.document(), ListDocument::default());
    }

    #[test]
    fn test_item_json_field_names() {
        let item = Item::new("eggs", "#f00", "#111", 1_700_000_000_000);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["item"], "eggs");
        assert_eq!(json["textColor"], "#111");
        assert_eq!(json["created"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_item_colors_default_when_missing() {
        let item: Item = serde_json::from_str(r#"{"item":"bread","created":5}"#).unwrap();
        assert_eq!(item.color, "");
        assert_eq!(item.text_color, "");
    }
}
