//! 실행 결과 리포트.
//!
//! 모든 트래커 단위 실패는 여기에 기록되며, 실행은 설정 오류나 저장소 전체
//! 장애가 아닌 이상 중단되지 않습니다.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracker_core::{FetchErrorKind, FetchWindow, TrackerStatus};

/// 트래커 단위 실패 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 조회 실패 (분류 포함)
    Fetch(FetchErrorKind),
    /// 저장 재시도 소진
    Persistence,
    /// 정규화 단계에서 입력 형태 오류
    InvalidData,
    /// 워커 장애
    WorkerFault,
    /// 타임아웃 또는 외부 취소로 처리되지 못함
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(kind) => write!(f, "fetch:{}", kind),
            Self::Persistence => write!(f, "persistence"),
            Self::InvalidData => write!(f, "invalid_data"),
            Self::WorkerFault => write!(f, "worker_fault"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 저장에 성공한 시계열
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectedSeries {
    /// 성공한 조회 구간
    pub window: FetchWindow,
    /// 저장된 행 수
    pub rows: usize,
}

/// 수집 결과 리포트 (심볼 기준)
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionReport {
    /// 입력된 트래커 수 (중복 제거 후)
    pub total: usize,
    /// Active가 아니어서 건너뛴 트래커 수
    pub skipped_inactive: usize,
    /// 저장에 성공한 트래커
    pub succeeded: BTreeMap<String, CollectedSeries>,
    /// `succeeded` 중 fallback 단계에서 성공한 트래커 (첫 단계보다 짧은 이력)
    pub partial: BTreeMap<String, FetchWindow>,
    /// 모든 단계가 실패한 트래커
    pub failed_permanently: BTreeMap<String, FailureKind>,
    /// 판정되지 못한 트래커 (취소 등)
    pub unresolved: BTreeMap<String, FailureKind>,
    /// 재시도 큐에 넣은 횟수
    pub retries_enqueued: usize,
    /// 감지된 워커 장애 수
    pub worker_faults: usize,
    /// 워커 재시작 수
    pub worker_restarts: usize,
    /// 실행 중단 사유 (저장소 전체 장애)
    pub aborted: Option<String>,
    /// 타임아웃/외부 취소 사유
    pub cancelled: Option<String>,
    /// 소요 시간
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl CollectionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 결과가 이미 기록된 트래커인지 확인
    pub fn is_recorded(&self, symbol: &str) -> bool {
        self.succeeded.contains_key(symbol)
            || self.failed_permanently.contains_key(symbol)
            || self.unresolved.contains_key(symbol)
    }

    /// 성공 기록. `fallback`이면 `partial`에도 기록합니다.
    pub fn record_success(&mut self, symbol: &str, window: FetchWindow, rows: usize, fallback: bool) {
        self.succeeded
            .insert(symbol.to_string(), CollectedSeries { window, rows });
        if fallback {
            self.partial.insert(symbol.to_string(), window);
        }
    }

    /// 영구 실패 기록
    pub fn record_failure(&mut self, symbol: &str, kind: FailureKind) {
        self.failed_permanently.insert(symbol.to_string(), kind);
    }

    /// 미판정 기록
    pub fn record_unresolved(&mut self, symbol: &str, kind: FailureKind) {
        self.unresolved.insert(symbol.to_string(), kind);
    }

    /// 영구 실패가 하나라도 있는지 (종료 코드 결정)
    pub fn has_permanent_failures(&self) -> bool {
        !self.failed_permanently.is_empty()
    }

    /// 저장된 총 행 수
    pub fn total_rows(&self) -> usize {
        self.succeeded.values().map(|s| s.rows).sum()
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        let attempted = self.total.saturating_sub(self.skipped_inactive);
        if attempted == 0 {
            0.0
        } else {
            (self.succeeded.len() as f64 / attempted as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            succeeded = self.succeeded.len(),
            partial = self.partial.len(),
            failed = self.failed_permanently.len(),
            unresolved = self.unresolved.len(),
            skipped = self.skipped_inactive,
            retries = self.retries_enqueued,
            worker_faults = self.worker_faults,
            total_rows = self.total_rows(),
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );

        for (symbol, kind) in &self.failed_permanently {
            tracing::warn!(symbol = %symbol, kind = %kind, "수집 실패");
        }
        if let Some(reason) = &self.aborted {
            tracing::error!(reason = %reason, "수집 중단");
        }
        if let Some(reason) = &self.cancelled {
            tracing::warn!(reason = %reason, unresolved = self.unresolved.len(), "수집 취소");
        }
    }
}

/// 트래커 검증 판정
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub symbol: String,
    pub status: TrackerStatus,
    /// 판정 근거가 된 구간 (Unknown이면 None)
    pub evidence_window: Option<FetchWindow>,
}

/// 검증 결과 리포트 (심볼 기준)
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    /// 입력된 트래커 수 (중복 제거 후)
    pub total: usize,
    /// 판정 결과
    pub outcomes: BTreeMap<String, VerificationOutcome>,
    /// 상태 기록에 실패했거나 판정되지 못한 트래커 (기존 상태 유지)
    pub unresolved: BTreeMap<String, FailureKind>,
    /// 감지된 워커 장애 수
    pub worker_faults: usize,
    /// 워커 재시작 수
    pub worker_restarts: usize,
    /// 실행 중단 사유 (레지스트리 전체 장애)
    pub aborted: Option<String>,
    /// 타임아웃/외부 취소 사유
    pub cancelled: Option<String>,
    /// 소요 시간
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recorded(&self, symbol: &str) -> bool {
        self.outcomes.contains_key(symbol) || self.unresolved.contains_key(symbol)
    }

    /// 트래커의 판정 상태
    pub fn status_of(&self, symbol: &str) -> Option<TrackerStatus> {
        self.outcomes.get(symbol).map(|o| o.status)
    }

    pub fn record_outcome(&mut self, outcome: VerificationOutcome) {
        self.outcomes.insert(outcome.symbol.clone(), outcome);
    }

    pub fn record_unresolved(&mut self, symbol: &str, kind: FailureKind) {
        self.unresolved.insert(symbol.to_string(), kind);
    }

    /// 상태별 집계
    pub fn summary(&self) -> VerificationSummary {
        let mut summary = VerificationSummary {
            total: self.total,
            unresolved: self.unresolved.len(),
            elapsed: self.elapsed,
            ..Default::default()
        };
        for outcome in self.outcomes.values() {
            match outcome.status {
                TrackerStatus::Active => summary.active += 1,
                TrackerStatus::Delisted => summary.delisted += 1,
                TrackerStatus::Unknown => summary.unknown += 1,
            }
        }
        summary
    }
}

/// 검증 상태별 집계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub active: usize,
    pub delisted: usize,
    pub unknown: usize,
    pub unresolved: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl VerificationSummary {
    /// 통계 요약 로그 출력
    pub fn log_summary(&self) {
        tracing::info!(
            total = self.total,
            active = self.active,
            delisted = self.delisted,
            unknown = self.unknown,
            unresolved = self.unresolved,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "검증 완료"
        );
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_success_is_partial() {
        let mut report = CollectionReport::new();
        report.total = 3;
        report.record_success("AAA", FetchWindow::FiveYears, 1200, false);
        report.record_success("BBB", FetchWindow::FiveDays, 4, true);
        report.record_failure("CCC", FailureKind::Fetch(FetchErrorKind::Empty));

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.partial.get("BBB"), Some(&FetchWindow::FiveDays));
        assert!(!report.partial.contains_key("AAA"));
        assert!(report.has_permanent_failures());
        assert!(report.is_recorded("CCC"));
        assert_eq!(report.total_rows(), 1204);
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = CollectionReport::new();
        report.record_failure("XYZ", FailureKind::Fetch(FetchErrorKind::NotFound));
        report.record_unresolved("QQQ", FailureKind::Cancelled);
        report.elapsed = Duration::from_millis(1500);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed_permanently"]["XYZ"]["fetch"], "not_found");
        assert_eq!(json["unresolved"]["QQQ"], "cancelled");
        assert_eq!(json["elapsed_secs"], 1.5);
    }

    #[test]
    fn test_verification_summary() {
        let mut report = VerificationReport::new();
        report.total = 4;
        for (symbol, status) in [
            ("AAA", TrackerStatus::Active),
            ("BBB", TrackerStatus::Delisted),
            ("CCC", TrackerStatus::Unknown),
        ] {
            report.record_outcome(VerificationOutcome {
                symbol: symbol.to_string(),
                status,
                evidence_window: None,
            });
        }
        report.record_unresolved("DDD", FailureKind::Persistence);

        let summary = report.summary();
        assert_eq!(summary.active, 1);
        assert_eq!(summary.delisted, 1);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(report.status_of("BBB"), Some(TrackerStatus::Delisted));
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(
            FailureKind::Fetch(FetchErrorKind::RateLimited).to_string(),
            "fetch:rate_limited"
        );
        assert_eq!(FailureKind::WorkerFault.to_string(), "worker_fault");
    }
}
