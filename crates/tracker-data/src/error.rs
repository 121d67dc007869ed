//! 데이터 모듈 오류 타입.

use thiserror::Error;
use tracker_core::StoreError;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 데이터 삽입 오류
    #[error("Insert error: {0}")]
    InsertError(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DataError::ConnectionError(err.to_string())
            }
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<DataError> for StoreError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::ConnectionError(_) | DataError::PoolExhausted => {
                StoreError::Unavailable(err.to_string())
            }
            DataError::InsertError(_) => StoreError::Write(err.to_string()),
            _ => StoreError::Read(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_unavailable() {
        let err: DataError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DataError::PoolExhausted));
        assert!(StoreError::from(err).is_unavailable());

        let err: DataError = sqlx::Error::PoolClosed.into();
        assert!(StoreError::from(err).is_unavailable());
    }

    #[test]
    fn test_insert_error_maps_to_write() {
        let store_err = StoreError::from(DataError::InsertError("duplicate".to_string()));
        assert!(matches!(store_err, StoreError::Write(_)));
    }
}
