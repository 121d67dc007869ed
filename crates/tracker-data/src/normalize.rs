//! 컬럼명 및 가격 행 정규화.
//!
//! 외부 테이블 헤더("Adj Close", "Stock Splits" 등)를 저장소 컬럼명
//! ("adj_close", "stock_splits")으로 맞추고, 저장 직전 행을 정리합니다.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracker_core::{NormalizeError, Normalizer, PriceRecord};

/// 영숫자가 아닌 문자 구간
static NORMALIZE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static pattern"));

/// 컬럼명 정규화: 소문자화, 영숫자 외 구간을 `_`로 치환, 양 끝 `_` 제거.
pub fn normalize_column_name(name: &str) -> String {
    NORMALIZE_PATTERN
        .replace_all(&name.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// 기본 행 정규화기.
///
/// - 음수 가격 거부
/// - 날짜 오름차순 정렬
/// - 같은 날짜는 마지막 행만 유지
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNormalizer;

impl Normalizer for StandardNormalizer {
    fn normalize(
        &self,
        symbol: &str,
        rows: Vec<PriceRecord>,
    ) -> Result<Vec<PriceRecord>, NormalizeError> {
        if symbol.trim().is_empty() {
            return Err(NormalizeError::MissingSymbol);
        }

        let mut by_date = BTreeMap::new();
        for row in rows {
            if row.has_negative_price() {
                return Err(NormalizeError::NegativePrice {
                    symbol: symbol.to_string(),
                    date: row.date,
                });
            }
            by_date.insert(row.date, row);
        }

        Ok(by_date.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn row(day: u32, close: Decimal) -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            adj_close: Some(close),
            volume: dec!(100),
            dividends: dec!(0),
            stock_splits: dec!(0),
        }
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("Adj Close"), "adj_close");
        assert_eq!(normalize_column_name("Stock Splits"), "stock_splits");
        assert_eq!(normalize_column_name("Column Name!"), "column_name");
        assert_eq!(normalize_column_name("Another@Col"), "another_col");
        assert_eq!(normalize_column_name("__Open__"), "open");
        assert_eq!(normalize_column_name("p/e ratio"), "p_e_ratio");
    }

    #[test]
    fn test_rows_sorted_and_deduplicated() {
        let rows = vec![row(3, dec!(3)), row(1, dec!(1)), row(3, dec!(30)), row(2, dec!(2))];

        let normalized = StandardNormalizer.normalize("AAA", rows).unwrap();

        let dates: Vec<u32> = normalized.iter().map(|r| r.date.day()).collect();
        assert_eq!(dates, vec![1, 2, 3]);
        // 같은 날짜는 마지막 값 유지
        assert_eq!(normalized[2].close, dec!(30));
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert_eq!(
            StandardNormalizer.normalize("  ", vec![row(1, dec!(1))]),
            Err(NormalizeError::MissingSymbol)
        );

        let result = StandardNormalizer.normalize("AAA", vec![row(1, dec!(-2))]);
        assert!(matches!(result, Err(NormalizeError::NegativePrice { .. })));
    }

    #[test]
    fn test_empty_rows_pass_through() {
        assert!(StandardNormalizer.normalize("AAA", Vec::new()).unwrap().is_empty());
    }
}
