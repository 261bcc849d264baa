use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::datum::Datum;
use crate::schema::{Field, SCHEMA_WIDTH};

/// One `esg_block` entity: the fixed fields in schema order plus any overflow
/// positions. Identity is the `id` field as assigned by the source dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Datum>,
    overflow: BTreeMap<String, Datum>,
}

impl Record {
    /// A record with every field null.
    pub fn empty() -> Self {
        Self {
            values: vec![Datum::Null; SCHEMA_WIDTH],
            overflow: BTreeMap::new(),
        }
    }

    /// Build from exactly [`SCHEMA_WIDTH`] values in schema order.
    /// Returns `None` on any other length.
    pub fn from_values(values: Vec<Datum>, overflow: BTreeMap<String, Datum>) -> Option<Self> {
        if values.len() != SCHEMA_WIDTH {
            return None;
        }
        Some(Self { values, overflow })
    }

    pub fn get(&self, field: Field) -> &Datum {
        &self.values[field.position()]
    }

    pub fn set(&mut self, field: Field, value: Datum) {
        self.values[field.position()] = value;
    }

    pub fn with(mut self, field: Field, value: Datum) -> Self {
        self.set(field, value);
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.get(Field::Id).as_i64()
    }

    /// Attested index, `None` until the record has been confirmed on the ledger.
    pub fn index(&self) -> Option<i64> {
        self.get(Field::Index).as_i64()
    }

    pub fn is_indexed(&self) -> bool {
        !self.get(Field::Index).is_null()
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn overflow(&self) -> &BTreeMap<String, Datum> {
        &self.overflow
    }

    pub fn insert_overflow(&mut self, key: impl Into<String>, value: Datum) {
        self.overflow.insert(key.into(), value);
    }

    /// Overflow fields as a JSON object (empty object when there are none).
    pub fn overflow_json(&self) -> JsonValue {
        JsonValue::Object(
            self.overflow
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::empty()
    }
}
