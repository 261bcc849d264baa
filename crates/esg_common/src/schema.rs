//! Positional schema of an `esg_block` row.
//!
//! The dump carries no column list we rely on; values are assigned purely by
//! position. This table is the single place that knows which position maps to
//! which field, how the raw value is coerced, and how it is stored.

/// Number of fixed positions in a well-formed tuple.
pub const SCHEMA_WIDTH: usize = 14;

/// Semantic fields of a record, in dump order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Id,
    Date,
    OrgName,
    ProjectName,
    Code,
    Index,
    CreatedAt,
    UpdatedAt,
    ProvinceName,
    CityName,
    Scope,
    Src,
    ActivityData,
    CarbonEmissionQuantity,
}

impl Field {
    pub fn position(self) -> usize {
        self as usize
    }
}

/// How a raw field string becomes a [`crate::datum::Datum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// NULL / number / boolean / quoted-string inference.
    Infer,
    /// Quotes stripped and NULL recognised, otherwise kept as the literal text.
    Text,
    /// Inference first, then conversion of any non-null value to a timestamp.
    /// A value that does not convert is stored as null.
    Timestamp,
}

/// Storage type of a column in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Text,
    Timestamp,
}

impl ColumnType {
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }
}

/// One row of the schema table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub field: Field,
    /// Column name in the source table.
    pub name: &'static str,
    pub coercion: Coercion,
    pub column_type: ColumnType,
}

const fn col(
    field: Field,
    name: &'static str,
    coercion: Coercion,
    column_type: ColumnType,
) -> ColumnDef {
    ColumnDef {
        field,
        name,
        coercion,
        column_type,
    }
}

pub static ESG_BLOCK_COLUMNS: [ColumnDef; SCHEMA_WIDTH] = [
    col(Field::Id, "id", Coercion::Infer, ColumnType::BigInt),
    col(Field::Date, "date", Coercion::Text, ColumnType::Text),
    col(Field::OrgName, "org_name", Coercion::Text, ColumnType::Text),
    col(Field::ProjectName, "projectname", Coercion::Text, ColumnType::Text),
    col(Field::Code, "code", Coercion::Text, ColumnType::Text),
    col(Field::Index, "index", Coercion::Infer, ColumnType::BigInt),
    col(Field::CreatedAt, "created_at", Coercion::Timestamp, ColumnType::Timestamp),
    col(Field::UpdatedAt, "updated_at", Coercion::Timestamp, ColumnType::Timestamp),
    col(Field::ProvinceName, "province_name", Coercion::Text, ColumnType::Text),
    col(Field::CityName, "cityname", Coercion::Text, ColumnType::Text),
    col(Field::Scope, "scope", Coercion::Text, ColumnType::Text),
    col(Field::Src, "src", Coercion::Text, ColumnType::Text),
    col(Field::ActivityData, "activity_data", Coercion::Text, ColumnType::Text),
    col(
        Field::CarbonEmissionQuantity,
        "carborn_emission_quantity",
        Coercion::Infer,
        ColumnType::Double,
    ),
];

/// Column holding any positions past [`SCHEMA_WIDTH`], as a JSON object.
pub const OVERFLOW_COLUMN: &str = "extra";

/// Key under which an overflow position is stored.
pub fn overflow_key(position: usize) -> String {
    format!("field_{}", position)
}
