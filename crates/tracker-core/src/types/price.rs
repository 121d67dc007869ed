//! 일봉 가격 레코드.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 일별 가격 레코드.
///
/// 저장소에서는 (트래커, 날짜)가 고유 키입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// 거래일
    pub date: NaiveDate,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 수정 종가 (배당/분할 반영)
    pub adj_close: Option<Decimal>,
    /// 거래량
    pub volume: Decimal,
    /// 해당일 배당금 (없으면 0)
    #[serde(default)]
    pub dividends: Decimal,
    /// 해당일 주식 분할 비율 (없으면 0)
    #[serde(default)]
    pub stock_splits: Decimal,
}

impl PriceRecord {
    /// 가격 필드 중 음수가 있는지 확인.
    pub fn has_negative_price(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .chain(self.adj_close.iter())
            .any(|p| p.is_sign_negative() && !p.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(close: Decimal) -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: dec!(10),
            high: dec!(12),
            low: dec!(9),
            close,
            adj_close: None,
            volume: dec!(1000),
            dividends: dec!(0),
            stock_splits: dec!(0),
        }
    }

    #[test]
    fn test_negative_price_detection() {
        assert!(!record(dec!(11)).has_negative_price());
        assert!(!record(dec!(0)).has_negative_price());
        assert!(record(dec!(-1)).has_negative_price());

        let mut adjusted = record(dec!(11));
        adjusted.adj_close = Some(dec!(-0.5));
        assert!(adjusted.has_negative_price());
    }
}
