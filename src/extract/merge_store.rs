//! In-memory merged document plus the additive merge rules.
//!
//! The document is keyed item type -> item number -> field name -> value.
//! Merging only ever adds or overwrites individual fields; nothing previously
//! collected is discarded when a run resumes over the same range.

use crate::extract::ItemType;
use crate::extract::field_resolver;
use core::fmt;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

const LOG_TARGET: &str = "     store";

/// Field name -> extracted value for a single item.
pub type ExtractedRecord = BTreeMap<String, Value>;

/// The entire persisted state of an extraction: item type -> item number ->
/// extracted record.
///
/// Item numbers serialize as JSON object keys (strings) but stay in numeric
/// order, so `"1000"` follows `"270"` in the output file. Non-numeric item
/// keys in a persisted document are a hard deserialization error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDocument(BTreeMap<ItemType, BTreeMap<u64, ExtractedRecord>>);

impl Serialize for OutputDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (item_type, items) in &self.0 {
            map.serialize_entry(item_type, &NumberKeyed(items))?;
        }

        map.end()
    }
}

/// Serializes a numbered map with stringified keys, preserving numeric order.
struct NumberKeyed<'a>(&'a BTreeMap<u64, ExtractedRecord>);

impl Serialize for NumberKeyed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (number, record) in self.0 {
            map.serialize_entry(&number.to_string(), record)?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for OutputDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = OutputDocument;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of item types to numbered records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut document = BTreeMap::new();
                while let Some((item_type, items)) =
                    access.next_entry::<ItemType, BTreeMap<String, ExtractedRecord>>()?
                {
                    let mut numbered = BTreeMap::new();
                    for (key, record) in items {
                        let number: u64 = key.parse().map_err(|_ignored| {
                            serde::de::Error::custom(format!(
                                "item key '{key}' under '{item_type}' is not a positive integer"
                            ))
                        })?;
                        let _ = numbered.insert(number, record);
                    }

                    let _ = document.insert(item_type, numbered);
                }

                Ok(OutputDocument(document))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

impl OutputDocument {
    pub fn record(&self, item_type: ItemType, number: u64) -> Option<&ExtractedRecord> {
        self.0.get(&item_type)?.get(&number)
    }

    pub fn item_count(&self, item_type: ItemType) -> usize {
        self.0.get(&item_type).map_or(0, BTreeMap::len)
    }
}

/// Owns the working document and applies the additive merge rules.
#[derive(Debug, Clone, Default)]
pub struct MergeStore {
    document: OutputDocument,
}

impl MergeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a previously persisted document.
    pub fn from_document(document: OutputDocument) -> Self {
        Self { document }
    }

    /// A field counts as present only when it holds a usable value; null and
    /// the empty string count as absent so they get re-fetched on resume.
    pub fn has_field(&self, item_type: ItemType, number: u64, field: &str) -> bool {
        self.document
            .record(item_type, number)
            .and_then(|record| record.get(field))
            .is_some_and(|value| !is_empty_value(value))
    }

    /// Which of the requested fields still need fetching for an item, with
    /// any absent mandatory fields listed first. An empty result means the
    /// item can be skipped without a remote call.
    pub fn missing_fields(&self, item_type: ItemType, number: u64, requested: &[String]) -> Vec<String> {
        let mut missing: Vec<String> = field_resolver::mandatory_fields(item_type)
            .iter()
            .filter(|field| !self.has_field(item_type, number, field))
            .map(ToString::to_string)
            .collect();

        for field in requested {
            if !missing.contains(field) && !self.has_field(item_type, number, field) {
                missing.push(field.clone());
            }
        }

        missing
    }

    /// Merge one field value into the document. Last write wins for a field
    /// that is fetched again.
    pub fn put(&mut self, item_type: ItemType, number: u64, field: &str, value: Value) {
        log::trace!(target: LOG_TARGET, "Merging {item_type} #{number} field '{field}'");

        let record = self
            .document
            .0
            .entry(item_type)
            .or_default()
            .entry(number)
            .or_default();
        let _ = record.insert(field.to_string(), value);
    }

    pub fn document(&self) -> &OutputDocument {
        &self.document
    }
}

/// Null and empty strings never count as collected data.
pub(crate) fn is_empty_value(value: &Value) -> bool {
    value.is_null() || value.as_str() == Some("")
}
