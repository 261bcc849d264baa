//! Record → scorer payload. Field renaming only; absent values become `""`.

use esg_common::datum::Datum;
use esg_common::record::Record;
use esg_common::schema::Field;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One entry of the array posted to the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestPayload {
    /// `created_at` as epoch seconds, 0 when the record has none.
    #[serde(rename = "dataTime")]
    pub data_time: i64,
    pub data: PayloadData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadData {
    pub prov: JsonValue,
    pub city: JsonValue,
    pub unit: JsonValue,
    pub proj: JsonValue,
    pub cat: JsonValue,
    pub code: JsonValue,
    pub src: JsonValue,
    pub act_data: JsonValue,
    pub co2e: JsonValue,
}

fn field_or_empty(record: &Record, field: Field) -> JsonValue {
    match record.get(field) {
        Datum::Null => JsonValue::String(String::new()),
        other => other.to_json(),
    }
}

pub fn to_payload(record: &Record) -> AttestPayload {
    let data_time = record
        .get(Field::CreatedAt)
        .to_timestamp()
        .map(|ts| ts.and_utc().timestamp())
        .unwrap_or(0);

    AttestPayload {
        data_time,
        data: PayloadData {
            prov: field_or_empty(record, Field::ProvinceName),
            city: field_or_empty(record, Field::CityName),
            unit: field_or_empty(record, Field::OrgName),
            proj: field_or_empty(record, Field::ProjectName),
            cat: field_or_empty(record, Field::Scope),
            code: field_or_empty(record, Field::Code),
            src: field_or_empty(record, Field::Src),
            act_data: field_or_empty(record, Field::ActivityData),
            co2e: field_or_empty(record, Field::CarbonEmissionQuantity),
        },
    }
}

pub fn transform_page(records: &[Record]) -> Vec<AttestPayload> {
    records.iter().map(to_payload).collect()
}
