//! 단계별 fallback 병렬 가격 수집기.
//!
//! # 처리 흐름
//!
//! 1. Active 트래커를 고정 크기 청크로 나눠 워커 풀에 배분
//! 2. 1차: 각 워커는 청크 내 트래커를 순서대로 첫 단계(Long)로 조회
//!    - 성공: 정규화 후 upsert
//!    - 실패: 재시도 큐에 넣고 바로 다음 트래커로 진행
//! 3. 2차: 모든 청크가 끝나면 워커들이 재시도 큐를 비움
//!    - 성공: upsert 후 종료
//!    - 실패 + 남은 단계 있음: 해당 단계를 제거하고 다시 큐에 넣음
//!    - 실패 + 남은 단계 없음: 영구 실패로 기록
//!
//! 저장 실패는 재시도 후 조회 실패와 같은 fallback 경로를 따릅니다.
//! 수집기는 트래커 상태를 변경하지 않습니다.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use tracker_core::{
    tracker_span, FetchClient, FetchWindow, Normalizer, PriceRecord, RowSink, TierPlan, Tracker,
};

use super::pool::{run_pool, Job, PoolOutcome, RunGuard};
use super::queue::WorkQueue;
use super::retry::{fetch_with_policy, write_with_retry, FetchPolicy, RetryItem, WritePolicy};
use crate::config::CollectorConfig;
use crate::error::CollectorError;
use crate::report::{CollectionReport, FailureKind};
use crate::Result;

/// 워커에 배분되는 트래커 묶음.
///
/// 복제본은 진행 커서를 공유하므로, 장애 후 재배정된 청크는 중단된
/// 트래커 다음부터 이어서 처리됩니다.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    trackers: Arc<Vec<Tracker>>,
    cursor: Arc<AtomicUsize>,
}

impl Chunk {
    pub fn new(index: usize, trackers: Vec<Tracker>) -> Self {
        Self {
            index,
            trackers: Arc::new(trackers),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 다음 트래커. 처리 전에 커서를 전진시킵니다.
    fn next_tracker(&self) -> Option<&Tracker> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.trackers.get(i)
    }

    /// 마지막으로 꺼낸 트래커 (장애 시점에 처리 중이던 트래커)
    fn in_flight(&self) -> Option<&Tracker> {
        self.cursor
            .load(Ordering::SeqCst)
            .checked_sub(1)
            .and_then(|i| self.trackers.get(i))
    }

    fn has_remaining(&self) -> bool {
        self.cursor.load(Ordering::SeqCst) < self.trackers.len()
    }

    /// 아직 꺼내지 않은 트래커
    fn remaining(&self) -> &[Tracker] {
        let start = self.cursor.load(Ordering::SeqCst).min(self.trackers.len());
        &self.trackers[start..]
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

/// 트래커 가격 수집기
pub struct Collector {
    fetcher: Arc<dyn FetchClient>,
    sink: Arc<dyn RowSink>,
    normalizer: Arc<dyn Normalizer>,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(
        fetcher: Arc<dyn FetchClient>,
        sink: Arc<dyn RowSink>,
        normalizer: Arc<dyn Normalizer>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            fetcher,
            sink,
            normalizer,
            config,
        }
    }

    /// Active 트래커의 과거 가격 수집.
    ///
    /// 트래커 단위 실패는 리포트에 기록됩니다. 시작 시 저장소에 접근할 수
    /// 없거나 설정이 잘못된 경우에만 에러를 반환합니다.
    pub async fn collect(
        &self,
        trackers: Vec<Tracker>,
        cancel: &CancellationToken,
    ) -> Result<CollectionReport> {
        let started = Instant::now();
        self.config.validate()?;

        self.sink
            .health_check()
            .await
            .map_err(|e| CollectorError::PersistenceUnavailable(e.to_string()))?;

        let (active, total, skipped) = select_active(trackers);
        let mut report = CollectionReport::new();
        report.total = total;
        report.skipped_inactive = skipped;

        let guard = RunGuard::new(cancel, self.config.pool.run_timeout());
        let settings = self.config.pool_settings();
        let tiers = self.config.collect.tiers.clone();

        let ctx = Arc::new(CollectContext {
            fetcher: self.fetcher.clone(),
            sink: self.sink.clone(),
            normalizer: self.normalizer.clone(),
            tiers: tiers.clone(),
            fetch_policy: self.config.fetch_policy(),
            write_policy: self.config.write_policy(),
            request_delay: self.config.fetch.request_delay(),
            retry_queue: Arc::new(WorkQueue::new()),
            report: Mutex::new(report),
            cancel: guard.token().clone(),
        });

        let chunks: Vec<Chunk> = active
            .chunks(self.config.collect.chunk_size)
            .enumerate()
            .map(|(i, trackers)| Chunk::new(i, trackers.to_vec()))
            .collect();

        info!(
            trackers = active.len(),
            skipped = skipped,
            chunks = chunks.len(),
            workers = settings.size,
            tiers = %tiers,
            "1차 수집 시작"
        );

        let first_pass = run_pool(
            Arc::new(FirstPass(ctx.clone())),
            Arc::new(WorkQueue::from_items(chunks)),
            settings,
            guard.token().clone(),
        )
        .await;

        let drain_pass = if guard.is_cancelled() {
            PoolOutcome::default()
        } else {
            info!(queued = ctx.retry_queue.len().await, "2차 재시도 시작");
            run_pool(
                Arc::new(DrainPass(ctx.clone())),
                ctx.retry_queue.clone(),
                settings,
                guard.token().clone(),
            )
            .await
        };

        let mut report = std::mem::take(&mut *ctx.report.lock().await);
        report.worker_faults = first_pass.faults + drain_pass.faults;
        report.worker_restarts = first_pass.restarts + drain_pass.restarts;

        // 재시작 한도 초과로 포기된 항목
        for chunk in &first_pass.abandoned {
            for tracker in chunk.remaining() {
                error!(symbol = %tracker.symbol, chunk = chunk.index, "재시작 한도 초과로 처리 포기");
                report.record_failure(&tracker.symbol, FailureKind::WorkerFault);
            }
        }
        for item in &drain_pass.abandoned {
            if !report.is_recorded(&item.tracker.symbol) {
                error!(symbol = %item.tracker.symbol, "재시작 한도 초과로 재시도 포기");
                report.record_failure(&item.tracker.symbol, FailureKind::WorkerFault);
            }
        }

        // 처리되지 못한 트래커: 취소면 미판정, 아니면 워커 장애로 포기된 것
        let cancelled = guard.is_cancelled();
        for tracker in &active {
            if report.is_recorded(&tracker.symbol) {
                continue;
            }
            if cancelled {
                report.record_unresolved(&tracker.symbol, FailureKind::Cancelled);
            } else {
                report.record_failure(&tracker.symbol, FailureKind::WorkerFault);
            }
        }

        if report.aborted.is_none() {
            report.cancelled = guard.cancel_reason().map(str::to_string);
        }
        report.elapsed = started.elapsed();
        Ok(report)
    }
}

/// 중복을 제거하고 Active 트래커만 선택. (active, 전체 수, 건너뛴 수)
fn select_active(trackers: Vec<Tracker>) -> (Vec<Tracker>, usize, usize) {
    let mut seen = HashSet::new();
    let mut active = Vec::with_capacity(trackers.len());
    let mut skipped = 0;

    for tracker in trackers {
        if !seen.insert(tracker.symbol.clone()) {
            warn!(symbol = %tracker.symbol, "중복 트래커 무시");
            continue;
        }
        if tracker.is_active() {
            active.push(tracker);
        } else {
            debug!(symbol = %tracker.symbol, status = %tracker.status, "Active가 아닌 트래커 건너뜀");
            skipped += 1;
        }
    }

    (active, seen.len(), skipped)
}

/// 워커 간 공유 상태
struct CollectContext {
    fetcher: Arc<dyn FetchClient>,
    sink: Arc<dyn RowSink>,
    normalizer: Arc<dyn Normalizer>,
    tiers: TierPlan,
    fetch_policy: FetchPolicy,
    write_policy: WritePolicy,
    request_delay: Duration,
    retry_queue: Arc<WorkQueue<RetryItem>>,
    report: Mutex<CollectionReport>,
    cancel: CancellationToken,
}

impl CollectContext {
    /// 한 단계 조회 → 정규화 → 저장. 성공 시 저장된 행 수를 반환합니다.
    async fn attempt_tier(
        &self,
        symbol: &str,
        window: FetchWindow,
    ) -> std::result::Result<usize, FailureKind> {
        let result =
            fetch_with_policy(self.fetcher.as_ref(), symbol, window, &self.fetch_policy).await;
        self.pause().await;

        if let Some(kind) = result.error_kind() {
            debug!(symbol = symbol, window = %window, kind = %kind, "단계 조회 실패");
            return Err(FailureKind::Fetch(kind));
        }

        let rows = self
            .normalizer
            .normalize(symbol, result.rows)
            .map_err(|e| {
                warn!(symbol = symbol, error = %e, "정규화 실패");
                FailureKind::InvalidData
            })?;

        let sink = self.sink.as_ref();
        let batch: &[PriceRecord] = &rows;
        let written = write_with_retry("upsert_rows", symbol, &self.write_policy, || {
            sink.upsert_rows(symbol, batch)
        })
        .await;

        if written.is_err() {
            self.abort_if_store_down().await;
            return Err(FailureKind::Persistence);
        }

        if let Err(e) = self
            .sink
            .update_collection_timestamp(symbol, Utc::now())
            .await
        {
            warn!(symbol = symbol, error = %e, "수집 시각 갱신 실패");
        }

        Ok(rows.len())
    }

    /// 워커 내 연속 조회 간 딜레이
    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// 저장 재시도 소진 후 저장소 전체가 죽었는지 확인하고, 그렇다면 실행 중단
    async fn abort_if_store_down(&self) {
        if let Err(e) = self.sink.health_check().await {
            error!(error = %e, "저장소 전체 접근 불가, 수집 중단");
            {
                let mut report = self.report.lock().await;
                if report.aborted.is_none() {
                    report.aborted = Some(format!("저장소 접근 불가: {}", e));
                }
            }
            self.cancel.cancel();
        }
    }

    async fn first_tier(&self, tracker: &Tracker) {
        let symbol = tracker.symbol.as_str();
        let window = self.tiers.first();

        match self.attempt_tier(symbol, window).await {
            Ok(rows) => {
                debug!(symbol = symbol, window = %window, rows = rows, "수집 성공");
                self.report
                    .lock()
                    .await
                    .record_success(symbol, window, rows, false);
            }
            Err(failure) => {
                match RetryItem::after_first_tier(tracker.clone(), &self.tiers, failure) {
                    Some(item) => {
                        debug!(symbol = symbol, failure = %failure, "재시도 큐에 추가");
                        self.retry_queue.push(item).await;
                        self.report.lock().await.retries_enqueued += 1;
                    }
                    None => {
                        warn!(symbol = symbol, failure = %failure, "수집 실패 (fallback 단계 없음)");
                        self.report.lock().await.record_failure(symbol, failure);
                    }
                }
            }
        }
    }

    async fn retry(&self, item: RetryItem) {
        let symbol = item.tracker.symbol.clone();
        let Some(window) = item.next_window() else {
            self.report
                .lock()
                .await
                .record_failure(&symbol, item.last_failure);
            return;
        };

        match self.attempt_tier(&symbol, window).await {
            Ok(rows) => {
                info!(
                    symbol = %symbol,
                    window = %window,
                    rows = rows,
                    attempts = item.attempts + 1,
                    "fallback 단계 수집 성공"
                );
                self.report
                    .lock()
                    .await
                    .record_success(&symbol, window, rows, true);
            }
            Err(failure) => match item.advance(failure) {
                Some(next) => {
                    debug!(symbol = %symbol, window = %window, failure = %failure, "다음 단계로 재시도");
                    self.retry_queue.push(next).await;
                    self.report.lock().await.retries_enqueued += 1;
                }
                None => {
                    warn!(symbol = %symbol, failure = %failure, "모든 단계 실패");
                    self.report.lock().await.record_failure(&symbol, failure);
                }
            },
        }
    }

    /// 첫 단계 처리 중 워커 장애: 남은 단계가 있으면 일반 실패처럼 재시도 큐로
    async fn first_tier_fault(&self, tracker: &Tracker) {
        if self.report.lock().await.is_recorded(&tracker.symbol) {
            return;
        }
        match RetryItem::after_first_tier(tracker.clone(), &self.tiers, FailureKind::WorkerFault) {
            Some(item) => {
                warn!(symbol = %tracker.symbol, "워커 장애, 다음 단계로 재시도");
                self.retry_queue.push(item).await;
                self.report.lock().await.retries_enqueued += 1;
            }
            None => self.record_fault(&tracker.symbol).await,
        }
    }

    async fn record_fault(&self, symbol: &str) {
        let mut report = self.report.lock().await;
        if !report.is_recorded(symbol) {
            error!(symbol = symbol, "워커 장애로 트래커 처리 실패");
            report.record_failure(symbol, FailureKind::WorkerFault);
        }
    }
}

/// 1차: 청크 단위 첫 단계 조회
struct FirstPass(Arc<CollectContext>);

#[async_trait]
impl Job for FirstPass {
    type Item = Chunk;

    fn name(&self) -> &'static str {
        "collect:first-pass"
    }

    async fn process(&self, chunk: Chunk) {
        debug!(chunk = chunk.index, size = chunk.len(), "청크 처리 시작");

        while !self.0.cancel.is_cancelled() {
            let Some(tracker) = chunk.next_tracker() else {
                break;
            };
            let span = tracker_span!("collect", tracker.symbol, self.0.tiers.first());
            self.0.first_tier(tracker).instrument(span).await;
        }
    }

    async fn on_fault(&self, chunk: Chunk) -> Option<Chunk> {
        if let Some(tracker) = chunk.in_flight() {
            self.0.first_tier_fault(tracker).await;
        }
        chunk.has_remaining().then_some(chunk)
    }
}

/// 2차: 재시도 큐 소진
struct DrainPass(Arc<CollectContext>);

#[async_trait]
impl Job for DrainPass {
    type Item = RetryItem;

    fn name(&self) -> &'static str {
        "collect:drain"
    }

    async fn process(&self, item: RetryItem) {
        let span = tracker_span!("retry", item.tracker.symbol);
        self.0.retry(item).instrument(span).await;
    }

    async fn on_fault(&self, item: RetryItem) -> Option<RetryItem> {
        let symbol = item.tracker.symbol.clone();
        match item.advance(FailureKind::WorkerFault) {
            Some(next) => {
                warn!(symbol = %symbol, "워커 장애, 다음 단계로 재시도");
                self.0.report.lock().await.retries_enqueued += 1;
                Some(next)
            }
            None => {
                self.0.record_fault(&symbol).await;
                None
            }
        }
    }
}
