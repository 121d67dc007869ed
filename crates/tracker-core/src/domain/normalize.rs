//! 행 정규화 인터페이스.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::PriceRecord;

/// 입력 형태 검증 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// 트래커 심볼 누락
    #[error("트래커 심볼이 비어 있습니다")]
    MissingSymbol,

    /// 음수 가격
    #[error("음수 가격: {symbol} {date}")]
    NegativePrice { symbol: String, date: NaiveDate },
}

/// 저장 직전에 호출되는 순수 정규화 함수.
///
/// 상태를 갖지 않으며 입력 형태 검증 외의 에러를 반환하지 않습니다.
pub trait Normalizer: Send + Sync {
    fn normalize(
        &self,
        symbol: &str,
        rows: Vec<PriceRecord>,
    ) -> Result<Vec<PriceRecord>, NormalizeError>;
}
