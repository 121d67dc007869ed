//! 실행 모드 설정.
//!
//! 실행 모드는 시작 시 한 번 구성되어 각 컴포넌트에 명시적으로 전달됩니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::logging::LogFormat;

/// 실행 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// 개발 환경
    #[default]
    Dev,
    /// 운영 환경
    Prod,
}

impl RunMode {
    /// 모드별 기본 로그 형식.
    pub fn default_log_format(&self) -> LogFormat {
        match self {
            Self::Dev => LogFormat::Pretty,
            Self::Prod => LogFormat::Json,
        }
    }

    /// 모드별 기본 로그 레벨.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Self::Dev => "info",
            Self::Prod => "debug",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

impl FromStr for RunMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(CoreError::Parse(format!("알 수 없는 실행 모드: {}", other))),
        }
    }
}
