//! 트래커 레지스트리와 가격 저장소 추상화.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{PriceRecord, Tracker, TrackerStatus};

/// 저장소 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// 저장소 자체에 접근 불가 (연결 풀 소진, 연결 끊김 등)
    #[error("저장소 접근 불가: {0}")]
    Unavailable(String),

    /// 조회 실패
    #[error("조회 실패: {0}")]
    Read(String),

    /// 쓰기 실패
    #[error("쓰기 실패: {0}")]
    Write(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// 트래커 레지스트리.
///
/// 트래커의 생성/삭제는 이 파이프라인의 책임이 아니며, 상태와 검증 시각만 갱신합니다.
#[async_trait]
pub trait TrackerRegistry: Send + Sync {
    /// Active 상태의 트래커 목록.
    async fn read_active_trackers(&self) -> Result<Vec<Tracker>, StoreError>;

    /// 전체 트래커 목록 (검증 대상).
    async fn read_all_trackers(&self) -> Result<Vec<Tracker>, StoreError>;

    /// 검증 결과 상태 기록.
    async fn update_status(
        &self,
        symbol: &str,
        status: TrackerStatus,
        verified_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 레지스트리 연결 확인.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// 가격 레코드 저장소.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// (트래커, 날짜) 기준 upsert. 같은 날짜를 다시 써도 행이 중복되지 않습니다.
    ///
    /// 반환값은 반영된 행 수입니다.
    async fn upsert_rows(&self, symbol: &str, rows: &[PriceRecord]) -> Result<usize, StoreError>;

    /// 마지막 수집 시각 갱신.
    async fn update_collection_timestamp(
        &self,
        symbol: &str,
        collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 저장소 연결 확인.
    async fn health_check(&self) -> Result<(), StoreError>;
}
