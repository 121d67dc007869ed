//! 가격 데이터 조회 추상화.
//!
//! 데이터 소스에 중립적인 `FetchClient` trait와 분류된 조회 에러,
//! 그리고 엔진이 상태 전이에 사용하는 `FetchResult`를 정의합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{FetchWindow, PriceRecord};

// =============================================================================
// 에러 타입
// =============================================================================

/// 조회 실패 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// 심볼을 찾을 수 없음
    NotFound,
    /// 조회는 성공했으나 데이터 없음
    Empty,
    /// 요청 한도 초과
    RateLimited,
    /// 네트워크/타임아웃/기타 인프라 장애
    NetworkError,
}

impl FetchErrorKind {
    /// "데이터 없음" 계열 여부 (상장폐지 판정 근거가 될 수 있음).
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NotFound | Self::Empty)
    }

    /// 같은 구간에서 재시도할 가치가 있는 일시적 장애 여부.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::NetworkError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Empty => "empty",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 분류된 조회 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Empty, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NetworkError, message)
    }
}

// =============================================================================
// FetchClient Trait
// =============================================================================

/// 과거 가격 데이터 조회 클라이언트.
///
/// 데이터가 없는 경우 빈 벡터 또는 `FetchErrorKind::Empty`/`NotFound` 에러 중
/// 어느 쪽을 반환해도 되며, 엔진은 둘 다 "데이터 없음"으로 취급합니다.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// 주어진 구간의 일봉 데이터 조회.
    ///
    /// # Errors
    ///
    /// - `FetchErrorKind::NotFound`: 심볼이 존재하지 않음
    /// - `FetchErrorKind::RateLimited`: 요청 한도 초과
    /// - `FetchErrorKind::NetworkError`: 연결 실패 등
    async fn fetch(&self, symbol: &str, window: FetchWindow)
        -> Result<Vec<PriceRecord>, FetchError>;
}

// =============================================================================
// 조회 결과
// =============================================================================

/// 조회 결과 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 한 건 이상 조회됨
    Success,
    /// 데이터 없음
    Empty,
    /// 에러
    Error(FetchErrorKind),
}

/// 한 번의 구간 조회 결과.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub window: FetchWindow,
    pub rows: Vec<PriceRecord>,
    pub outcome: FetchOutcome,
    /// 마지막 에러 메시지 (진단용)
    pub message: Option<String>,
}

impl FetchResult {
    /// 클라이언트 응답으로부터 결과 생성.
    ///
    /// 요청 구간보다 적은 행이 와도 그대로 성공으로 처리합니다.
    pub fn from_response(
        symbol: &str,
        window: FetchWindow,
        response: Result<Vec<PriceRecord>, FetchError>,
    ) -> Self {
        let (rows, outcome, message) = match response {
            Ok(rows) if rows.is_empty() => (rows, FetchOutcome::Empty, None),
            Ok(rows) => (rows, FetchOutcome::Success, None),
            Err(e) if e.kind == FetchErrorKind::Empty => {
                (Vec::new(), FetchOutcome::Empty, Some(e.message))
            }
            Err(e) => (Vec::new(), FetchOutcome::Error(e.kind), Some(e.message)),
        };

        Self {
            symbol: symbol.to_string(),
            window,
            rows,
            outcome,
            message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == FetchOutcome::Success
    }

    /// 실패 분류 (성공이면 None).
    pub fn error_kind(&self) -> Option<FetchErrorKind> {
        match self.outcome {
            FetchOutcome::Success => None,
            FetchOutcome::Empty => Some(FetchErrorKind::Empty),
            FetchOutcome::Error(kind) => Some(kind),
        }
    }
}
