//! PostgreSQL 기반 트래커 레지스트리 및 가격 저장소.
//!
//! # 테이블
//!
//! - `dim_trackers`: 트래커 목록과 상태 (tracker, status, last_verified_at, last_collected_at)
//! - `fct_trackers`: 일봉 가격 (tracker, date) 고유 키
//!
//! 가격 저장은 `ON CONFLICT (tracker, date) DO UPDATE`로 멱등하게 처리되므로
//! 겹치는 구간을 다시 저장해도 같은 날짜의 행이 중복되지 않습니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, info, instrument, warn};
use tracker_core::{PriceRecord, RowSink, StoreError, Tracker, TrackerRegistry, TrackerStatus};

use crate::error::{DataError, Result};
use crate::normalize::normalize_column_name;

/// 배치 INSERT 한 번에 담는 최대 행 수
const UPSERT_BATCH_SIZE: usize = 500;

/// 가격 테이블의 원본 헤더 (저장 시 정규화된 컬럼명으로 변환)
const PRICE_HEADERS: [&str; 10] = [
    "Tracker",
    "Date",
    "Open",
    "High",
    "Low",
    "Close",
    "Adj Close",
    "Volume",
    "Dividends",
    "Stock Splits",
];

/// 정규화된 가격 컬럼명
static PRICE_COLUMNS: Lazy<Vec<String>> = Lazy::new(|| {
    PRICE_HEADERS
        .iter()
        .map(|h| normalize_column_name(h))
        .collect()
});

/// 파이프라인이 사용하는 테이블 이름.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    trackers: String,
    prices: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            trackers: "dim_trackers".to_string(),
            prices: "fct_trackers".to_string(),
        }
    }
}

impl TableNames {
    /// 테이블 이름 지정. SQL 식별자로 안전한 이름만 허용합니다.
    pub fn new(trackers: impl Into<String>, prices: impl Into<String>) -> Result<Self> {
        let names = Self {
            trackers: trackers.into(),
            prices: prices.into(),
        };
        for name in [&names.trackers, &names.prices] {
            if !is_safe_identifier(name) {
                return Err(DataError::ConfigError(format!(
                    "허용되지 않는 테이블 이름: {}",
                    name
                )));
            }
        }
        Ok(names)
    }

    pub fn trackers(&self) -> &str {
        &self.trackers
    }

    pub fn prices(&self) -> &str {
        &self.prices
    }
}

fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 트래커 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
struct TrackerRow {
    tracker: String,
    status: String,
    last_verified_at: Option<DateTime<Utc>>,
    last_collected_at: Option<DateTime<Utc>>,
}

impl TrackerRow {
    fn into_tracker(self) -> Tracker {
        let status = self.status.parse::<TrackerStatus>().unwrap_or_else(|_| {
            warn!(tracker = %self.tracker, status = %self.status, "알 수 없는 상태값, unknown으로 처리");
            TrackerStatus::Unknown
        });

        Tracker {
            symbol: self.tracker,
            status,
            last_verified_at: self.last_verified_at,
            last_collected_at: self.last_collected_at,
        }
    }
}

/// PostgreSQL 트래커 저장소.
#[derive(Clone)]
pub struct PgTrackerStore {
    pool: PgPool,
    tables: TableNames,
}

impl PgTrackerStore {
    pub fn new(pool: PgPool, tables: TableNames) -> Self {
        Self { pool, tables }
    }

    /// 테이블이 없으면 생성.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {trackers} (
                tracker TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'unknown',
                last_verified_at TIMESTAMPTZ,
                last_collected_at TIMESTAMPTZ
            )
            "#,
            trackers = self.tables.trackers()
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {prices} (
                tracker TEXT NOT NULL,
                date DATE NOT NULL,
                open NUMERIC,
                high NUMERIC,
                low NUMERIC,
                close NUMERIC,
                adj_close NUMERIC,
                volume NUMERIC,
                dividends NUMERIC NOT NULL DEFAULT 0,
                stock_splits NUMERIC NOT NULL DEFAULT 0,
                fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (tracker, date)
            )
            "#,
            prices = self.tables.prices()
        ))
        .execute(&self.pool)
        .await?;

        // 배당/분할 컬럼 이전에 만들어진 테이블
        sqlx::query(&format!(
            r#"
            ALTER TABLE {prices}
                ADD COLUMN IF NOT EXISTS dividends NUMERIC NOT NULL DEFAULT 0,
                ADD COLUMN IF NOT EXISTS stock_splits NUMERIC NOT NULL DEFAULT 0
            "#,
            prices = self.tables.prices()
        ))
        .execute(&self.pool)
        .await?;

        info!(
            trackers = self.tables.trackers(),
            prices = self.tables.prices(),
            "스키마 확인 완료"
        );
        Ok(())
    }

    /// 연결 확인 (`SELECT 1`)
    async fn ping(&self) -> std::result::Result<(), StoreError> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn fetch_trackers(&self, only_active: bool) -> Result<Vec<Tracker>> {
        let filter = if only_active {
            "WHERE status = 'active'"
        } else {
            ""
        };
        let rows: Vec<TrackerRow> = sqlx::query_as(&format!(
            "SELECT tracker, status, last_verified_at, last_collected_at
             FROM {} {} ORDER BY tracker",
            self.tables.trackers(),
            filter
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrackerRow::into_tracker).collect())
    }

    /// 배치 INSERT로 가격 upsert (트랜잭션 단위).
    async fn batch_upsert(&self, symbol: &str, rows: &[PriceRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut total = 0;

        for chunk in rows.chunks(UPSERT_BATCH_SIZE) {
            let sql = build_upsert_sql(self.tables.prices(), chunk.len());
            let mut query = sqlx::query(&sql);

            for row in chunk {
                query = query
                    .bind(symbol)
                    .bind(row.date)
                    .bind(row.open)
                    .bind(row.high)
                    .bind(row.low)
                    .bind(row.close)
                    .bind(row.adj_close)
                    .bind(row.volume)
                    .bind(row.dividends)
                    .bind(row.stock_splits);
            }

            let result = query.execute(&mut *tx).await.map_err(insert_error)?;
            total += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(insert_error)?;
        Ok(total)
    }
}

/// 쓰기 경로의 쿼리 실패는 `InsertError`로 분류 (연결 장애는 그대로).
fn insert_error(err: sqlx::Error) -> DataError {
    match DataError::from(err) {
        DataError::QueryError(msg) => DataError::InsertError(msg),
        other => other,
    }
}

/// 쓰기 경로의 실패를 `StoreError`로 변환.
fn write_error(err: sqlx::Error) -> StoreError {
    StoreError::from(insert_error(err))
}

/// 다중 행 upsert SQL 생성.
///
/// VALUES 절: ($1, ..., $10), ($11, ..., $20), ...
fn build_upsert_sql(table: &str, row_count: usize) -> String {
    let columns = PRICE_COLUMNS.as_slice();
    let width = columns.len();

    let value_tuples: Vec<String> = (0..row_count)
        .map(|i| {
            let placeholders: Vec<String> =
                (1..=width).map(|j| format!("${}", i * width + j)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    // 키 컬럼(tracker, date)을 제외한 나머지는 최신 값으로 갱신
    let updates: Vec<String> = columns[2..]
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    format!(
        "INSERT INTO {table} ({columns}) VALUES {values} \
         ON CONFLICT ({key_tracker}, {key_date}) DO UPDATE SET {updates}, fetched_at = NOW()",
        table = table,
        columns = columns.join(", "),
        values = value_tuples.join(", "),
        key_tracker = columns[0],
        key_date = columns[1],
        updates = updates.join(", "),
    )
}

#[async_trait]
impl TrackerRegistry for PgTrackerStore {
    async fn read_active_trackers(&self) -> std::result::Result<Vec<Tracker>, StoreError> {
        let trackers = self.fetch_trackers(true).await?;
        info!(count = trackers.len(), "활성 트래커 조회 완료");
        Ok(trackers)
    }

    async fn read_all_trackers(&self) -> std::result::Result<Vec<Tracker>, StoreError> {
        let trackers = self.fetch_trackers(false).await?;
        info!(count = trackers.len(), "전체 트래커 조회 완료");
        Ok(trackers)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        symbol: &str,
        status: TrackerStatus,
        verified_at: DateTime<Utc>,
    ) -> std::result::Result<(), StoreError> {
        sqlx::query(&format!(
            "UPDATE {} SET status = $1, last_verified_at = $2 WHERE tracker = $3",
            self.tables.trackers()
        ))
        .bind(status.as_str())
        .bind(verified_at)
        .bind(symbol)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        debug!(symbol = symbol, status = %status, "상태 기록 완료");
        Ok(())
    }

    async fn health_check(&self) -> std::result::Result<(), StoreError> {
        self.ping().await
    }
}

#[async_trait]
impl RowSink for PgTrackerStore {
    async fn upsert_rows(
        &self,
        symbol: &str,
        rows: &[PriceRecord],
    ) -> std::result::Result<usize, StoreError> {
        let affected = self.batch_upsert(symbol, rows).await?;
        debug!(symbol = symbol, rows = rows.len(), affected, "가격 upsert 완료");
        Ok(affected)
    }

    async fn update_collection_timestamp(
        &self,
        symbol: &str,
        collected_at: DateTime<Utc>,
    ) -> std::result::Result<(), StoreError> {
        sqlx::query(&format!(
            "UPDATE {} SET last_collected_at = $1 WHERE tracker = $2",
            self.tables.trackers()
        ))
        .bind(collected_at)
        .bind(symbol)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn health_check(&self) -> std::result::Result<(), StoreError> {
        self.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_columns_are_normalized() {
        assert_eq!(
            PRICE_COLUMNS.as_slice(),
            &[
                "tracker",
                "date",
                "open",
                "high",
                "low",
                "close",
                "adj_close",
                "volume",
                "dividends",
                "stock_splits"
            ]
        );
    }

    #[test]
    fn test_build_upsert_sql() {
        let sql = build_upsert_sql("fct_trackers", 2);

        assert!(sql.starts_with(
            "INSERT INTO fct_trackers (tracker, date, open, high, low, close, adj_close, volume, \
             dividends, stock_splits)"
        ));
        assert!(sql.contains(
            "($1, $2, $3, $4, $5, $6, $7, $8, $9, $10), \
             ($11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"
        ));
        assert!(sql.contains("ON CONFLICT (tracker, date) DO UPDATE SET open = EXCLUDED.open"));
        assert!(sql.contains("dividends = EXCLUDED.dividends"));
        assert!(sql.contains("stock_splits = EXCLUDED.stock_splits, fetched_at = NOW()"));
        assert!(!sql.contains("tracker = EXCLUDED.tracker"));
    }

    #[test]
    fn test_commit_failure_is_write_error() {
        let err = write_error(sqlx::Error::Protocol("commit rejected".to_string()));
        assert!(matches!(err, StoreError::Write(_)));

        let err: DataError = insert_error(sqlx::Error::Protocol("commit rejected".to_string()));
        assert!(matches!(err, DataError::InsertError(_)));

        // 연결 장애는 쓰기 실패가 아니라 저장소 접근 불가
        assert!(write_error(sqlx::Error::PoolClosed).is_unavailable());
    }

    #[test]
    fn test_table_names_validation() {
        assert!(TableNames::new("dim_trackers", "fct_trackers").is_ok());
        assert!(TableNames::new("dim_trackers; DROP TABLE x", "fct").is_err());
        assert!(TableNames::new("1abc", "fct").is_err());
        assert!(TableNames::new("", "fct").is_err());

        let names = TableNames::default();
        assert_eq!(names.trackers(), "dim_trackers");
        assert_eq!(names.prices(), "fct_trackers");
    }
}
