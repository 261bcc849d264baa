//! PostgreSQL-backed [`RecordStore`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use esg_common::config::StoreConfig;
use esg_common::datum::Datum;
use esg_common::error::StoreError;
use esg_common::record::Record;
use esg_common::schema::{ColumnDef, ColumnType, ESG_BLOCK_COLUMNS, OVERFLOW_COLUMN, SCHEMA_WIDTH};
use esg_common::store::RecordStore;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, info, warn};

/// Postgres caps bind parameters per statement at 65535.
const MAX_PARAMS: usize = 65_535;
const PARAMS_PER_ROW: usize = SCHEMA_WIDTH + 1;
const MAX_ROWS_PER_STATEMENT: usize = MAX_PARAMS / PARAMS_PER_ROW;

type Param = Box<dyn ToSql + Sync + Send>;

pub struct PgStore {
    client: Client,
    table: String,
    driver: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

fn column_list() -> String {
    ESG_BLOCK_COLUMNS
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .chain(std::iter::once(format!("\"{}\"", OVERFLOW_COLUMN)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_sql(table: &str) -> String {
    let mut cols: Vec<String> = ESG_BLOCK_COLUMNS
        .iter()
        .map(|c| {
            let pk = if c.name == "id" { " PRIMARY KEY" } else { "" };
            format!("\"{}\" {}{}", c.name, c.column_type.sql_name(), pk)
        })
        .collect();
    cols.push(format!("\"{}\" JSONB NOT NULL DEFAULT '{{}}'", OVERFLOW_COLUMN));
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table, cols.join(", "))
}

/// `INSERT INTO t (...) VALUES ($1, ..), ($16, ..)` for `rows` rows.
fn insert_sql(table: &str, rows: usize) -> String {
    let tuples: Vec<String> = (0..rows)
        .map(|r| {
            let base = r * PARAMS_PER_ROW;
            let placeholders: Vec<String> =
                (1..=PARAMS_PER_ROW).map(|i| format!("${}", base + i)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        column_list(),
        tuples.join(", ")
    )
}

fn select_unindexed_sql(table: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE \"index\" IS NULL ORDER BY \"id\" LIMIT $1 OFFSET $2",
        column_list(),
        table
    )
}

fn update_index_sql(table: &str) -> String {
    format!(
        "UPDATE {} SET \"index\" = $1 WHERE \"id\" = $2 AND \"index\" IS NULL",
        table
    )
}

/// Bind a value with the Rust type its column expects. A non-null value
/// that does not convert is an error rather than a silent NULL.
fn to_param(value: &Datum, column: &ColumnDef) -> Result<Param, StoreError> {
    if value.is_null() {
        return Ok(match column.column_type {
            ColumnType::BigInt => Box::new(None::<i64>) as Param,
            ColumnType::Double => Box::new(None::<f64>) as Param,
            ColumnType::Text => Box::new(None::<String>) as Param,
            ColumnType::Timestamp => Box::new(None::<NaiveDateTime>) as Param,
        });
    }
    let param: Option<Param> = match column.column_type {
        ColumnType::BigInt => value.as_i64().map(|v| Box::new(v) as Param),
        ColumnType::Double => value.as_f64().map(|v| Box::new(v) as Param),
        ColumnType::Text => Some(Box::new(value.to_string()) as Param),
        ColumnType::Timestamp => value.to_timestamp().map(|v| Box::new(v) as Param),
    };
    param.ok_or_else(|| {
        StoreError::Query(format!(
            "column {}: cannot store '{}' as {}",
            column.name,
            value,
            column.column_type.sql_name()
        ))
    })
}

fn record_params(record: &Record) -> Result<Vec<Param>, StoreError> {
    record.id().ok_or(StoreError::MissingId)?;
    let mut params = record
        .values()
        .iter()
        .zip(ESG_BLOCK_COLUMNS.iter())
        .map(|(v, c)| to_param(v, c))
        .collect::<Result<Vec<Param>, StoreError>>()?;
    params.push(Box::new(record.overflow_json()));
    Ok(params)
}

fn row_to_record(row: &Row) -> Result<Record, StoreError> {
    let decode = |e: tokio_postgres::Error| StoreError::Query(format!("decode: {}", e));
    let mut values = Vec::with_capacity(SCHEMA_WIDTH);
    for (i, column) in ESG_BLOCK_COLUMNS.iter().enumerate() {
        let value = match column.column_type {
            ColumnType::BigInt => row
                .try_get::<_, Option<i64>>(i)
                .map_err(decode)?
                .map_or(Datum::Null, Datum::Int64),
            ColumnType::Double => row
                .try_get::<_, Option<f64>>(i)
                .map_err(decode)?
                .map_or(Datum::Null, Datum::Float64),
            ColumnType::Text => row
                .try_get::<_, Option<String>>(i)
                .map_err(decode)?
                .map_or(Datum::Null, Datum::Text),
            ColumnType::Timestamp => row
                .try_get::<_, Option<NaiveDateTime>>(i)
                .map_err(decode)?
                .map_or(Datum::Null, Datum::Timestamp),
        };
        values.push(value);
    }
    let extra: Option<JsonValue> = row.try_get(SCHEMA_WIDTH).map_err(decode)?;

    let mut record = Record::from_values(values, Default::default())
        .ok_or_else(|| StoreError::Query("row width mismatch".into()))?;
    if let Some(JsonValue::Object(map)) = extra {
        for (k, v) in map {
            record.insert_overflow(k, Datum::from_json(&v));
        }
    }
    Ok(record)
}

fn query_error(e: tokio_postgres::Error) -> StoreError {
    if e.is_closed() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Query(e.to_string())
    }
}

impl PgStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        debug!("Connecting to store, table {}", config.table);
        let connect = tokio_postgres::connect(&config.url, NoTls);
        let (client, connection) =
            tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), connect)
                .await
                .map_err(|_| {
                    StoreError::Connection(format!(
                        "timed out after {}ms",
                        config.connect_timeout_ms
                    ))
                })?
                .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Spawn the connection driver
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Connection error: {}", e);
            }
        });

        info!("Connected to store");
        Ok(Self {
            client,
            table: config.table.clone(),
            driver: Mutex::new(Some(driver)),
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    async fn insert_chunk(&self, records: &[Record]) -> Result<u64, StoreError> {
        let mut params: Vec<Param> = Vec::with_capacity(records.len() * PARAMS_PER_ROW);
        for r in records {
            params.extend(record_params(r)?);
        }
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        self.client
            .execute(&insert_sql(&self.table, records.len()), &refs)
            .await
            .map_err(query_error)
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_open()?;
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(query_error)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.check_open()?;
        self.client
            .batch_execute(&create_table_sql(&self.table))
            .await
            .map_err(query_error)
    }

    async fn insert_many(&self, records: &[Record]) -> Result<u64, StoreError> {
        self.check_open()?;
        if records.is_empty() {
            return Ok(0);
        }
        self.client.batch_execute("BEGIN").await.map_err(query_error)?;
        let mut inserted = 0u64;
        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            match self.insert_chunk(chunk).await {
                Ok(n) => inserted += n,
                Err(e) => {
                    if let Err(rb) = self.client.batch_execute("ROLLBACK").await {
                        warn!("Rollback after failed bulk insert also failed: {}", rb);
                    }
                    return Err(e);
                }
            }
        }
        self.client.batch_execute("COMMIT").await.map_err(query_error)?;
        Ok(inserted)
    }

    async fn insert_one(&self, record: &Record) -> Result<(), StoreError> {
        self.check_open()?;
        let id = record.id().ok_or(StoreError::MissingId)?;
        let params = record_params(record)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        match self.client.execute(&insert_sql(&self.table, 1), &refs).await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StoreError::DuplicateId(id))
            }
            Err(e) => Err(query_error(e)),
        }
    }

    async fn select_unindexed(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, StoreError> {
        self.check_open()?;
        let rows = self
            .client
            .query(
                &select_unindexed_sql(&self.table),
                &[&(limit as i64), &(offset as i64)],
            )
            .await
            .map_err(query_error)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn update_index(&self, id: i64, index: i64) -> Result<bool, StoreError> {
        self.check_open()?;
        let n = self
            .client
            .execute(&update_index_sql(&self.table), &[&index, &id])
            .await
            .map_err(query_error)?;
        Ok(n == 1)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        info!("Store connection closed");
        Ok(())
    }
}
