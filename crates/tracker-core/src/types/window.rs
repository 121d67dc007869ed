//! 조회 구간과 단계별 fallback 계획.
//!
//! 구간은 데이터 소스의 기간 문자열("5y", "1y", "5d", "1d" 등)에 대응하며,
//! `TierPlan`은 항상 긴 구간에서 짧은 구간 순으로 엄격하게 감소합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 과거 데이터 조회 구간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchWindow {
    /// 1일
    #[serde(rename = "1d")]
    OneDay,
    /// 5일
    #[serde(rename = "5d")]
    FiveDays,
    /// 1개월
    #[serde(rename = "1mo")]
    OneMonth,
    /// 3개월
    #[serde(rename = "3mo")]
    ThreeMonths,
    /// 6개월
    #[serde(rename = "6mo")]
    SixMonths,
    /// 1년
    #[serde(rename = "1y")]
    OneYear,
    /// 2년
    #[serde(rename = "2y")]
    TwoYears,
    /// 5년
    #[serde(rename = "5y")]
    FiveYears,
    /// 10년
    #[serde(rename = "10y")]
    TenYears,
}

impl FetchWindow {
    /// 수집기 기본 단계의 Long 구간 (5년)
    pub const LONG: Self = Self::FiveYears;
    /// Medium 구간 (1년)
    pub const MEDIUM: Self = Self::OneYear;
    /// 수집기 Short 구간 (5일)
    pub const SHORT: Self = Self::FiveDays;
    /// 검증기 Short 구간 (1일)
    pub const VERIFY_SHORT: Self = Self::OneDay;

    /// 데이터 소스 기간 문자열.
    pub fn as_period(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
        }
    }

    /// 구간 길이 (달력 일수, 근사값).
    pub fn approx_days(&self) -> u32 {
        match self {
            Self::OneDay => 1,
            Self::FiveDays => 5,
            Self::OneMonth => 30,
            Self::ThreeMonths => 91,
            Self::SixMonths => 182,
            Self::OneYear => 365,
            Self::TwoYears => 730,
            Self::FiveYears => 1826,
            Self::TenYears => 3652,
        }
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_period())
    }
}

impl FromStr for FetchWindow {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" => Ok(Self::OneDay),
            "5d" => Ok(Self::FiveDays),
            "1mo" => Ok(Self::OneMonth),
            "3mo" => Ok(Self::ThreeMonths),
            "6mo" => Ok(Self::SixMonths),
            "1y" => Ok(Self::OneYear),
            "2y" => Ok(Self::TwoYears),
            "5y" => Ok(Self::FiveYears),
            "10y" => Ok(Self::TenYears),
            other => Err(CoreError::Parse(format!("알 수 없는 조회 구간: {}", other))),
        }
    }
}

/// 단계별 fallback 계획.
///
/// 비어 있지 않고, 구간 길이가 엄격하게 감소하는 순서만 허용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierPlan(Vec<FetchWindow>);

impl TierPlan {
    /// 검증된 계획 생성.
    pub fn new(tiers: Vec<FetchWindow>) -> Result<Self, CoreError> {
        if tiers.is_empty() {
            return Err(CoreError::InvalidTierPlan("단계가 비어 있습니다".to_string()));
        }

        if let Some(pair) = tiers
            .windows(2)
            .find(|pair| pair[0].approx_days() <= pair[1].approx_days())
        {
            return Err(CoreError::InvalidTierPlan(format!(
                "구간은 엄격하게 감소해야 합니다: {} 다음에 {}",
                pair[0], pair[1]
            )));
        }

        Ok(Self(tiers))
    }

    /// 수집기 기본 계획: 5y → 1y → 5d
    pub fn collector_default() -> Self {
        Self(vec![FetchWindow::LONG, FetchWindow::MEDIUM, FetchWindow::SHORT])
    }

    /// 검증기 기본 계획: 1y → 1d
    pub fn verifier_default() -> Self {
        Self(vec![FetchWindow::MEDIUM, FetchWindow::VERIFY_SHORT])
    }

    /// 첫 단계 (가장 긴 구간).
    pub fn first(&self) -> FetchWindow {
        self.0[0]
    }

    /// 첫 단계를 제외한 나머지 단계.
    pub fn fallbacks(&self) -> &[FetchWindow] {
        &self.0[1..]
    }

    pub fn tiers(&self) -> &[FetchWindow] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 항상 false (빈 계획은 생성할 수 없음).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TierPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let periods: Vec<&str> = self.0.iter().map(|w| w.as_period()).collect();
        f.write_str(&periods.join(","))
    }
}

impl FromStr for TierPlan {
    type Err = CoreError;

    /// 쉼표로 구분된 기간 목록 파싱 (예: "5y,1y,5d").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tiers = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| part.parse::<FetchWindow>())
            .collect::<Result<Vec<FetchWindow>, _>>()?;
        Self::new(tiers)
    }
}
