use std::collections::BTreeMap;

use esg_common::datum::Datum;
use esg_common::error::ParseError;
use esg_common::record::Record;
use esg_common::schema::{overflow_key, Coercion, ColumnDef, ESG_BLOCK_COLUMNS, SCHEMA_WIDTH};
use tracing::warn;

use crate::tuple::{coerce_field, coerce_text};

/// Result of mapping one tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    Mapped(Record),
    /// The tuple was already rejected by the parser; the failure is counted there.
    ParseFailed,
    /// Too few fields to fill the schema.
    Invalid(ParseError),
}

/// Positional field → record mapping driven by a schema table.
#[derive(Debug, Clone, Copy)]
pub struct RecordMapper {
    columns: &'static [ColumnDef; SCHEMA_WIDTH],
}

impl Default for RecordMapper {
    fn default() -> Self {
        Self {
            columns: &ESG_BLOCK_COLUMNS,
        }
    }
}

impl RecordMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the parser's output for dump line `line_no`. `None` (a rejected
    /// tuple) maps to the [`MapOutcome::ParseFailed`] sentinel. Timestamp slots
    /// that do not convert are stored as null with a warning.
    pub fn map_tuple(&self, line_no: u64, parsed: Option<&[String]>) -> MapOutcome {
        let Some(fields) = parsed else {
            return MapOutcome::ParseFailed;
        };
        match self.map_fields_lossy(fields) {
            Ok((record, dropped)) => {
                for e in dropped {
                    warn!("Line {}: {}; stored as NULL", line_no, e);
                }
                MapOutcome::Mapped(record)
            }
            Err(e) => MapOutcome::Invalid(e),
        }
    }

    /// Assign fields by position: the first [`SCHEMA_WIDTH`] to the schema,
    /// the rest under `field_<n>` overflow keys.
    pub fn map_fields(&self, fields: &[String]) -> Result<Record, ParseError> {
        self.map_fields_lossy(fields).map(|(record, _)| record)
    }

    /// [`Self::map_fields`], also returning the slots that were nulled because
    /// their value could not be converted.
    pub fn map_fields_lossy(
        &self,
        fields: &[String],
    ) -> Result<(Record, Vec<ParseError>), ParseError> {
        if fields.len() < SCHEMA_WIDTH {
            return Err(ParseError::FieldCount {
                expected: SCHEMA_WIDTH,
                found: fields.len(),
            });
        }

        let mut values = Vec::with_capacity(SCHEMA_WIDTH);
        let mut dropped = Vec::new();
        for (position, (raw, def)) in fields.iter().zip(self.columns.iter()).enumerate() {
            let value = match def.coercion {
                Coercion::Infer => coerce_field(raw),
                Coercion::Text => coerce_text(raw),
                Coercion::Timestamp => {
                    let value = coerce_field(raw);
                    match value.to_timestamp() {
                        Some(ts) => Datum::Timestamp(ts),
                        None if value.is_null() => value,
                        None => {
                            dropped.push(ParseError::InvalidTimestamp {
                                position,
                                column: def.name,
                                value: value.to_string(),
                            });
                            Datum::Null
                        }
                    }
                }
            };
            values.push(value);
        }

        let overflow: BTreeMap<String, Datum> = fields
            .iter()
            .enumerate()
            .skip(SCHEMA_WIDTH)
            .map(|(position, raw)| (overflow_key(position), coerce_field(raw)))
            .collect();

        let record = Record::from_values(values, overflow).ok_or(ParseError::FieldCount {
            expected: SCHEMA_WIDTH,
            found: fields.len(),
        })?;
        Ok((record, dropped))
    }
}
