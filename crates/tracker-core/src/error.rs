//! 파이프라인 공통 에러 타입.

use thiserror::Error;

/// 핵심 도메인 에러.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// 잘못된 fallback 단계 구성
    #[error("잘못된 단계 구성: {0}")]
    InvalidTierPlan(String),

    /// 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),
}
