//! Yahoo Finance 기반 가격 조회 클라이언트.
//!
//! 기간 문자열("5y", "1y", "5d", "1d")로 일봉 데이터를 조회하고,
//! 실패를 `FetchErrorKind`로 분류합니다.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;
use tracker_core::{FetchClient, FetchError, FetchErrorKind, FetchWindow, PriceRecord};

use crate::error::{DataError, Result};

/// 일봉 간격
const DAILY_INTERVAL: &str = "1d";

/// Yahoo Finance 조회 클라이언트.
pub struct YahooFetchClient {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooFetchClient {
    pub fn new() -> Result<Self> {
        let connector = yahoo_finance_api::YahooConnector::new()
            .map_err(|e| DataError::ConnectionError(format!("Yahoo Finance 연결 실패: {}", e)))?;
        Ok(Self { connector })
    }
}

#[async_trait]
impl FetchClient for YahooFetchClient {
    async fn fetch(
        &self,
        symbol: &str,
        window: FetchWindow,
    ) -> std::result::Result<Vec<PriceRecord>, FetchError> {
        debug!(
            symbol = symbol,
            interval = DAILY_INTERVAL,
            range = window.as_period(),
            "Yahoo Finance API 호출"
        );

        let response = self
            .connector
            .get_quote_range(symbol, DAILY_INTERVAL, window.as_period())
            .await
            .map_err(|e| classify_error(symbol, &e))?;

        let quotes = response.quotes().map_err(|e| classify_error(symbol, &e))?;

        // 이벤트가 없는 응답은 에러가 아니라 빈 목록
        let dividends = events_by_date(
            response
                .dividends()
                .unwrap_or_default()
                .iter()
                .map(|d| (d.date, d.amount)),
        );
        let splits = events_by_date(
            response
                .splits()
                .unwrap_or_default()
                .iter()
                .filter(|s| s.denominator != 0.0)
                .map(|s| (s.date, s.numerator / s.denominator)),
        );

        let mut rows: Vec<PriceRecord> = quotes
            .iter()
            .filter_map(|q| {
                let date = Utc
                    .timestamp_opt(q.timestamp as i64, 0)
                    .single()?
                    .date_naive();

                Some(PriceRecord {
                    date,
                    open: to_decimal(q.open)?,
                    high: to_decimal(q.high)?,
                    low: to_decimal(q.low)?,
                    close: to_decimal(q.close)?,
                    adj_close: to_decimal(q.adjclose),
                    volume: Decimal::from(q.volume),
                    dividends: dividends.get(&date).copied().unwrap_or_default(),
                    stock_splits: splits.get(&date).copied().unwrap_or_default(),
                })
            })
            .collect();

        rows.sort_by_key(|r| r.date);

        debug!(
            symbol = symbol,
            range = window.as_period(),
            quotes = quotes.len(),
            dividends = dividends.len(),
            splits = splits.len(),
            rows = rows.len(),
            "Yahoo Finance 응답 변환 완료"
        );

        Ok(rows)
    }
}

/// (타임스탬프, 값) 이벤트를 UTC 날짜별로 합산.
fn events_by_date(events: impl IntoIterator<Item = (i64, f64)>) -> HashMap<NaiveDate, Decimal> {
    let mut by_date = HashMap::new();
    for (timestamp, value) in events {
        let (Some(at), Some(value)) = (Utc.timestamp_opt(timestamp, 0).single(), to_decimal(value))
        else {
            continue;
        };
        *by_date.entry(at.date_naive()).or_insert(Decimal::ZERO) += value;
    }
    by_date
}

/// NaN/무한대 값은 None.
fn to_decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64_retain(value)
    } else {
        None
    }
}

fn classify_error(symbol: &str, err: &yahoo_finance_api::YahooError) -> FetchError {
    // 에러 variant 안의 HTTP 상태 문자열까지 보려면 Debug 표현이 필요함
    let detail = format!("{:?}", err);
    FetchError::new(
        classify_message(&detail),
        format!("Yahoo Finance API 오류 ({}): {}", symbol, err),
    )
}

/// 에러 메시지로부터 실패 분류.
pub(crate) fn classify_message(message: &str) -> FetchErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit")
    {
        FetchErrorKind::RateLimited
    } else if lower.contains("404")
        || lower.contains("not found")
        || lower.contains("no data found")
        || lower.contains("delisted")
        || lower.contains("no such ticker")
    {
        FetchErrorKind::NotFound
    } else if lower.contains("emptydataset")
        || lower.contains("empty data set")
        || lower.contains("noquotes")
        || lower.contains("noresult")
    {
        FetchErrorKind::Empty
    } else {
        FetchErrorKind::NetworkError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_message() {
        assert_eq!(
            classify_message("FetchFailed(\"429 Too Many Requests\")"),
            FetchErrorKind::RateLimited
        );
        assert_eq!(
            classify_message("FetchFailed(\"404 Not Found\")"),
            FetchErrorKind::NotFound
        );
        assert_eq!(
            classify_message("No data found, symbol may be delisted"),
            FetchErrorKind::NotFound
        );
        assert_eq!(classify_message("EmptyDataSet"), FetchErrorKind::Empty);
        assert_eq!(
            classify_message("ConnectionFailed(reqwest::Error { kind: Request })"),
            FetchErrorKind::NetworkError
        );
    }

    #[test]
    fn test_to_decimal_rejects_nan() {
        assert!(to_decimal(f64::NAN).is_none());
        assert!(to_decimal(f64::INFINITY).is_none());
        assert_eq!(to_decimal(1.5), Decimal::from_f64_retain(1.5));
    }

    #[test]
    fn test_events_grouped_by_utc_date() {
        // 2024-05-10 13:30 UTC 두 건, 2024-08-12 13:30 UTC 한 건
        let events = events_by_date([
            (1_715_347_800, 0.25),
            (1_715_347_800, 0.05),
            (1_723_469_400, 4.0),
            (1_723_469_400 + 60, f64::NAN),
        ]);

        let may = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let aug = NaiveDate::from_ymd_opt(2024, 8, 12).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[&may], Decimal::from_f64_retain(0.25).unwrap() + Decimal::from_f64_retain(0.05).unwrap());
        assert_eq!(events[&aug], Decimal::from(4));
    }

    #[tokio::test]
    #[ignore] // 실제 API 호출 필요
    async fn test_fetch_integration() {
        let client = YahooFetchClient::new().expect("클라이언트 생성 실패");
        match client.fetch("AAPL", FetchWindow::FiveDays).await {
            Ok(rows) => {
                println!("AAPL 5d: {} rows", rows.len());
                assert!(rows.windows(2).all(|w| w[0].date <= w[1].date));
            }
            Err(e) => eprintln!("API 호출 실패: {}", e),
        }
    }
}
