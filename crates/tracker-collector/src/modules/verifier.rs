//! 단계별 상장 여부 검증기.
//!
//! 각 단계는 남은 후보 트래커를 워커 풀로 병렬 조회합니다.
//!
//! - 데이터가 있으면 Active로 판정하고 즉시 기록
//! - 데이터가 없거나 에러면 다음 단계 후보
//! - 마지막 단계까지 데이터가 없으면 Delisted
//! - 어느 단계에서든 일시적 장애(요청 한도, 네트워크)가 있었다면 Delisted로
//!   판정하지 않고 Unknown으로 남김 (기존 상태 유지)
//!
//! 상태 기록은 판정이 나오는 즉시 트래커 단위로 이루어집니다. 기록 재시도가
//! 소진된 뒤 레지스트리 자체가 응답하지 않으면 남은 검증을 중단합니다.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use tracker_core::{tracker_span, FetchClient, FetchWindow, Tracker, TrackerRegistry, TrackerStatus};

use super::pool::{run_pool, Job, RunGuard};
use super::queue::WorkQueue;
use super::retry::{fetch_with_policy, write_with_retry, FetchPolicy, WritePolicy};
use crate::config::CollectorConfig;
use crate::report::{FailureKind, VerificationOutcome, VerificationReport};
use crate::{CollectorError, Result};

/// 트래커 상장 여부 검증기
pub struct Verifier {
    fetcher: Arc<dyn FetchClient>,
    registry: Arc<dyn TrackerRegistry>,
    config: CollectorConfig,
}

impl Verifier {
    pub fn new(
        fetcher: Arc<dyn FetchClient>,
        registry: Arc<dyn TrackerRegistry>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            fetcher,
            registry,
            config,
        }
    }

    /// 트래커 목록 검증.
    ///
    /// 조회 실패는 배치를 중단시키지 않습니다. 상태 기록이 재시도 후에도
    /// 실패한 트래커는 `unresolved`로 보고되며 기존 상태가 유지됩니다.
    pub async fn verify(
        &self,
        trackers: Vec<Tracker>,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport> {
        let started = Instant::now();
        self.config.validate()?;

        self.registry
            .health_check()
            .await
            .map_err(|e| CollectorError::PersistenceUnavailable(e.to_string()))?;

        let unique = dedup(trackers);
        let mut report = VerificationReport::new();
        report.total = unique.len();

        let guard = RunGuard::new(cancel, self.config.pool.run_timeout());
        let settings = self.config.pool_settings();
        let tiers = self.config.verify.tiers.tiers().to_vec();

        let ctx = Arc::new(VerifyContext {
            fetcher: self.fetcher.clone(),
            registry: self.registry.clone(),
            fetch_policy: self.config.fetch_policy(),
            write_policy: self.config.write_policy(),
            request_delay: self.config.fetch.request_delay(),
            cancel: guard.token().clone(),
            report: Mutex::new(report),
            transient: Mutex::new(HashSet::new()),
        });

        let mut candidates = unique.clone();
        let mut faults = 0;
        let mut restarts = 0;

        for (phase, window) in tiers.iter().copied().enumerate() {
            if candidates.is_empty() || guard.is_cancelled() {
                break;
            }

            info!(
                phase = phase + 1,
                window = %window,
                candidates = candidates.len(),
                "검증 단계 시작"
            );

            let job = Arc::new(TierCheckJob {
                ctx: ctx.clone(),
                window,
                last: phase + 1 == tiers.len(),
                next: Mutex::new(Vec::new()),
            });
            let outcome = run_pool(
                job.clone(),
                Arc::new(WorkQueue::from_items(candidates)),
                settings,
                guard.token().clone(),
            )
            .await;

            faults += outcome.faults;
            restarts += outcome.restarts;
            candidates = std::mem::take(&mut *job.next.lock().await);
        }

        let mut report = std::mem::take(&mut *ctx.report.lock().await);
        report.worker_faults = faults;
        report.worker_restarts = restarts;

        let cancelled = guard.is_cancelled();
        for tracker in &unique {
            if !report.is_recorded(&tracker.symbol) {
                let kind = if cancelled {
                    FailureKind::Cancelled
                } else {
                    FailureKind::WorkerFault
                };
                report.record_unresolved(&tracker.symbol, kind);
            }
        }

        if report.aborted.is_none() {
            report.cancelled = guard.cancel_reason().map(str::to_string);
        }
        report.elapsed = started.elapsed();
        Ok(report)
    }
}

fn dedup(trackers: Vec<Tracker>) -> Vec<Tracker> {
    let mut seen = HashSet::new();
    trackers
        .into_iter()
        .filter(|t| {
            let first = seen.insert(t.symbol.clone());
            if !first {
                warn!(symbol = %t.symbol, "중복 트래커 무시");
            }
            first
        })
        .collect()
}

struct VerifyContext {
    fetcher: Arc<dyn FetchClient>,
    registry: Arc<dyn TrackerRegistry>,
    fetch_policy: FetchPolicy,
    write_policy: WritePolicy,
    request_delay: Duration,
    /// 레지스트리 장애 시 실행 중단용
    cancel: CancellationToken,
    report: Mutex<VerificationReport>,
    /// 한 번이라도 일시적 장애를 겪은 트래커
    transient: Mutex<HashSet<String>>,
}

impl VerifyContext {
    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// 판정 기록. Unknown은 상태를 쓰지 않습니다.
    async fn decide(&self, symbol: &str, status: TrackerStatus, evidence: Option<FetchWindow>) {
        let outcome = VerificationOutcome {
            symbol: symbol.to_string(),
            status,
            evidence_window: evidence,
        };

        if status == TrackerStatus::Unknown {
            warn!(symbol = symbol, "일시적 장애로 판정 불가, 기존 상태 유지");
            self.report.lock().await.record_outcome(outcome);
            return;
        }

        let registry = self.registry.as_ref();
        let verified_at = Utc::now();
        let written = write_with_retry("update_status", symbol, &self.write_policy, || {
            registry.update_status(symbol, status, verified_at)
        })
        .await;

        match written {
            Ok(()) => {
                debug!(symbol = symbol, status = %status, "상태 기록 완료");
                self.report.lock().await.record_outcome(outcome);
            }
            Err(e) => {
                error!(symbol = symbol, status = %status, error = %e, "상태 기록 실패, 미판정 처리");
                self.report
                    .lock()
                    .await
                    .record_unresolved(symbol, FailureKind::Persistence);
                self.abort_if_registry_down().await;
            }
        }
    }

    /// 기록 재시도 소진 후 레지스트리 전체가 죽었는지 확인하고, 그렇다면 실행 중단
    async fn abort_if_registry_down(&self) {
        if let Err(e) = self.registry.health_check().await {
            error!(error = %e, "레지스트리 전체 접근 불가, 검증 중단");
            {
                let mut report = self.report.lock().await;
                if report.aborted.is_none() {
                    report.aborted = Some(format!("레지스트리 접근 불가: {}", e));
                }
            }
            self.cancel.cancel();
        }
    }
}

/// 한 단계의 조회
struct TierCheckJob {
    ctx: Arc<VerifyContext>,
    window: FetchWindow,
    last: bool,
    /// 다음 단계 후보
    next: Mutex<Vec<Tracker>>,
}

impl TierCheckJob {
    async fn check(&self, tracker: Tracker) {
        let ctx = &self.ctx;
        let symbol = tracker.symbol.as_str();

        let result = fetch_with_policy(ctx.fetcher.as_ref(), symbol, self.window, &ctx.fetch_policy).await;
        ctx.pause().await;

        let Some(kind) = result.error_kind() else {
            ctx.decide(symbol, TrackerStatus::Active, Some(self.window))
                .await;
            return;
        };

        let had_transient = {
            let mut transient = ctx.transient.lock().await;
            if kind.is_transient() {
                transient.insert(symbol.to_string());
            }
            transient.contains(symbol)
        };

        if !self.last {
            debug!(symbol = symbol, window = %self.window, kind = %kind, "다음 단계 후보");
            self.next.lock().await.push(tracker);
        } else if had_transient {
            ctx.decide(symbol, TrackerStatus::Unknown, None).await;
        } else {
            ctx.decide(symbol, TrackerStatus::Delisted, Some(self.window))
                .await;
        }
    }
}

#[async_trait]
impl Job for TierCheckJob {
    type Item = Tracker;

    fn name(&self) -> &'static str {
        "verify"
    }

    async fn process(&self, tracker: Tracker) {
        let span = tracker_span!("verify", tracker.symbol, self.window);
        self.check(tracker).instrument(span).await;
    }

    async fn on_fault(&self, tracker: Tracker) -> Option<Tracker> {
        let mut report = self.ctx.report.lock().await;
        if !report.is_recorded(&tracker.symbol) {
            error!(symbol = %tracker.symbol, "워커 장애로 검증 실패");
            report.record_unresolved(&tracker.symbol, FailureKind::WorkerFault);
        }
        None
    }
}
