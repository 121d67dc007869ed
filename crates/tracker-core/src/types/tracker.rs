//! 트래커(추적 종목)와 상태 정의.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 트래커 거래 가능 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerStatus {
    /// 거래 중
    Active,
    /// 상장 폐지
    Delisted,
    /// 판정 불가 (인프라 장애 등)
    #[default]
    Unknown,
}

impl TrackerStatus {
    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Delisted => "delisted",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackerStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "delisted" => Ok(Self::Delisted),
            "unknown" => Ok(Self::Unknown),
            other => Err(CoreError::Parse(format!("알 수 없는 트래커 상태: {}", other))),
        }
    }
}

/// 추적 대상 종목.
///
/// 트래커 레지스트리가 소유하며, 검증기와 수집기는 상태와 타임스탬프만 갱신합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    /// 고유 심볼 (예: "AAPL", "005930.KS")
    pub symbol: String,
    /// 현재 상태
    pub status: TrackerStatus,
    /// 마지막 검증 시각
    pub last_verified_at: Option<DateTime<Utc>>,
    /// 마지막 수집 시각
    pub last_collected_at: Option<DateTime<Utc>>,
}

impl Tracker {
    /// 주어진 상태의 트래커 생성.
    pub fn new(symbol: impl Into<String>, status: TrackerStatus) -> Self {
        Self {
            symbol: symbol.into(),
            status,
            last_verified_at: None,
            last_collected_at: None,
        }
    }

    /// Active 상태의 트래커 생성.
    pub fn active(symbol: impl Into<String>) -> Self {
        Self::new(symbol, TrackerStatus::Active)
    }

    pub fn is_active(&self) -> bool {
        self.status == TrackerStatus::Active
    }
}
