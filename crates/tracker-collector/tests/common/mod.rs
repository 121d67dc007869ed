//! 통합 테스트용 인메모리 협력자.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracker_collector::CollectorConfig;
use tracker_core::{
    FetchClient, FetchError, FetchErrorKind, FetchWindow, PriceRecord, RowSink, StoreError,
    Tracker, TrackerRegistry, TrackerStatus,
};

/// 조회 응답 시나리오
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// 기준일부터 과거로 n개의 일봉
    Rows(usize),
    /// 빈 응답
    Empty,
    /// 분류된 에러
    Fail(FetchErrorKind),
    /// 워커 패닉
    Panic,
}

/// (심볼, 구간)별로 응답을 지정하는 FetchClient.
///
/// 지정된 응답이 여러 개면 순서대로 사용하고, 마지막 응답은 계속 반복합니다.
/// 지정되지 않은 조합은 `Empty`입니다.
#[derive(Default)]
pub struct FakeFetcher {
    scripts: Mutex<HashMap<(String, FetchWindow), VecDeque<Script>>>,
    defaults: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, FetchWindow)>>,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 특정 구간 응답 (순서대로 사용)
    pub fn on(self, symbol: &str, window: FetchWindow, responses: &[Script]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((symbol.to_string(), window), responses.iter().copied().collect());
        self
    }

    /// 모든 구간 기본 응답
    pub fn always(self, symbol: &str, script: Script) -> Self {
        self.defaults
            .lock()
            .unwrap()
            .insert(symbol.to_string(), script);
        self
    }

    /// 모든 조회에 지연 추가
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, FetchWindow)> {
        self.calls.lock().unwrap().clone()
    }

    /// 특정 심볼의 조회 구간 (호출 순서)
    pub fn windows_for(&self, symbol: &str) -> Vec<FetchWindow> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == symbol)
            .map(|(_, w)| *w)
            .collect()
    }

    fn next_script(&self, symbol: &str, window: FetchWindow) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        if let Some(queue) = scripts.get_mut(&(symbol.to_string(), window)) {
            if queue.len() > 1 {
                if let Some(script) = queue.pop_front() {
                    return script;
                }
            }
            if let Some(script) = queue.front() {
                return *script;
            }
        }
        self.defaults
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(Script::Empty)
    }
}

#[async_trait]
impl FetchClient for FakeFetcher {
    async fn fetch(
        &self,
        symbol: &str,
        window: FetchWindow,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), window));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_script(symbol, window) {
            Script::Rows(n) => Ok(daily_rows(n)),
            Script::Empty => Ok(Vec::new()),
            Script::Fail(kind) => Err(FetchError::new(kind, format!("scripted {}", kind))),
            Script::Panic => panic!("scripted panic for {}", symbol),
        }
    }
}

/// 2024-06-28부터 과거로 n개의 일봉 (구간이 달라도 날짜가 겹침)
pub fn daily_rows(n: usize) -> Vec<PriceRecord> {
    let base = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
    (0..n)
        .map(|i| {
            let price = Decimal::from(100 + i as i64);
            PriceRecord {
                date: base - ChronoDuration::days(i as i64),
                open: price,
                high: price + Decimal::ONE,
                low: price - Decimal::ONE,
                close: price,
                adj_close: Some(price),
                volume: Decimal::from(1_000),
                dividends: Decimal::ZERO,
                stock_splits: Decimal::ZERO,
            }
        })
        .collect()
}

/// 인메모리 레지스트리 + 가격 저장소
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<(String, NaiveDate), PriceRecord>>,
    trackers: Mutex<BTreeMap<String, Tracker>>,
    status_writes: Mutex<Vec<(String, TrackerStatus)>>,
    upsert_failures: AtomicUsize,
    status_failures: AtomicUsize,
    upsert_calls: AtomicUsize,
    down: AtomicBool,
    /// 이 횟수만큼의 health check 이후 장애 상태로 전환
    healthy_checks: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trackers(trackers: &[Tracker]) -> Self {
        let store = Self::new();
        {
            let mut map = store.trackers.lock().unwrap();
            for tracker in trackers {
                map.insert(tracker.symbol.clone(), tracker.clone());
            }
        }
        store
    }

    /// 다음 n번의 upsert 실패
    pub fn fail_upserts(&self, n: usize) {
        self.upsert_failures.store(n, Ordering::SeqCst);
    }

    /// 다음 n번의 상태 기록 실패
    pub fn fail_status_writes(&self, n: usize) {
        self.status_failures.store(n, Ordering::SeqCst);
    }

    /// 저장소 전체 장애
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// n번의 health check는 통과하고 이후에는 장애로 응답
    pub fn go_down_after_health_checks(&self, n: usize) {
        *self.healthy_checks.lock().unwrap() = Some(n);
    }

    pub fn row_count(&self, symbol: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .keys()
            .filter(|(s, _)| s == symbol)
            .count()
    }

    pub fn total_rows(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn status_of(&self, symbol: &str) -> Option<TrackerStatus> {
        self.trackers.lock().unwrap().get(symbol).map(|t| t.status)
    }

    pub fn status_writes(&self) -> Vec<(String, TrackerStatus)> {
        self.status_writes.lock().unwrap().clone()
    }

    pub fn last_collected_at(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.trackers
            .lock()
            .unwrap()
            .get(symbol)
            .and_then(|t| t.last_collected_at)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TrackerRegistry for MemoryStore {
    async fn read_active_trackers(&self) -> Result<Vec<Tracker>, StoreError> {
        Ok(self
            .trackers
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_active())
            .cloned()
            .collect())
    }

    async fn read_all_trackers(&self) -> Result<Vec<Tracker>, StoreError> {
        Ok(self.trackers.lock().unwrap().values().cloned().collect())
    }

    async fn update_status(
        &self,
        symbol: &str,
        status: TrackerStatus,
        verified_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        if Self::take_failure(&self.status_failures) {
            return Err(StoreError::Write("injected status failure".to_string()));
        }

        self.status_writes
            .lock()
            .unwrap()
            .push((symbol.to_string(), status));
        let mut trackers = self.trackers.lock().unwrap();
        let tracker = trackers
            .entry(symbol.to_string())
            .or_insert_with(|| Tracker::new(symbol, TrackerStatus::Unknown));
        tracker.status = status;
        tracker.last_verified_at = Some(verified_at);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_health()
    }
}

#[async_trait]
impl RowSink for MemoryStore {
    async fn upsert_rows(&self, symbol: &str, rows: &[PriceRecord]) -> Result<usize, StoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        if Self::take_failure(&self.upsert_failures) {
            return Err(StoreError::Write("injected upsert failure".to_string()));
        }

        let mut stored = self.rows.lock().unwrap();
        for row in rows {
            stored.insert((symbol.to_string(), row.date), row.clone());
        }
        Ok(rows.len())
    }

    async fn update_collection_timestamp(
        &self,
        symbol: &str,
        collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(tracker) = self.trackers.lock().unwrap().get_mut(symbol) {
            tracker.last_collected_at = Some(collected_at);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_health()
    }
}

impl MemoryStore {
    /// 레지스트리와 저장소가 같은 연결 상태를 공유
    fn check_health(&self) -> Result<(), StoreError> {
        {
            let mut remaining = self.healthy_checks.lock().unwrap();
            if let Some(n) = remaining.as_mut() {
                if *n == 0 {
                    self.down.store(true, Ordering::SeqCst);
                } else {
                    *n -= 1;
                }
            }
        }
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// 빠른 재시도 간격의 테스트 설정
pub fn test_config(pool_size: usize, chunk_size: usize) -> CollectorConfig {
    let mut config = CollectorConfig::default();
    config.pool.pool_size = pool_size;
    config.collect.chunk_size = chunk_size;
    config.fetch.timeout_secs = 5;
    config.fetch.retry_backoff_ms = 1;
    config.write.retry_backoff_ms = 1;
    config
}

pub fn active(symbols: &[&str]) -> Vec<Tracker> {
    symbols.iter().map(|s| Tracker::active(*s)).collect()
}

pub fn keys<V>(map: &BTreeMap<String, V>) -> Vec<&str> {
    map.keys().map(String::as_str).collect()
}
