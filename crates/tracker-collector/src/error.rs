//! 에러 타입 정의.

use thiserror::Error;
use tracker_core::{CoreError, StoreError};
use tracker_data::DataError;

/// Collector 에러 타입
///
/// 트래커 단위 실패는 리포트 항목으로 기록되며, 이 타입은 실행 전체를
/// 중단시키는 경우에만 사용됩니다.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 데이터 계층 에러 (DB 연결, 스키마 등)
    #[error(transparent)]
    Data(#[from] DataError),

    /// 저장소 전체 접근 불가
    #[error("저장소 접근 불가: {0}")]
    PersistenceUnavailable(String),

    /// 저장소 조회/쓰기 에러
    #[error("저장소 에러: {0}")]
    Store(StoreError),

    /// 리포트 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Json(#[from] serde_json::Error),

    /// 입출력 에러
    #[error("입출력 에러: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Data(err.into())
    }
}

impl From<CoreError> for CollectorError {
    fn from(err: CoreError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<StoreError> for CollectorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::PersistenceUnavailable(msg),
            other => Self::Store(other),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_escalates() {
        let err: CollectorError = StoreError::Unavailable("pool closed".to_string()).into();
        assert!(matches!(err, CollectorError::PersistenceUnavailable(_)));

        let err: CollectorError = StoreError::Read("bad column".to_string()).into();
        assert!(matches!(err, CollectorError::Store(_)));
    }

    #[test]
    fn test_core_error_is_config() {
        let err: CollectorError = CoreError::InvalidTierPlan("empty".to_string()).into();
        assert!(err.to_string().starts_with("설정 에러"));
    }
}
