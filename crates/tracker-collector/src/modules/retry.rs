//! 재시도 항목과 조회/저장 재시도 정책.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use tracker_core::{
    FetchClient, FetchError, FetchResult, FetchWindow, StoreError, TierPlan, Tracker,
};

use crate::report::FailureKind;

/// 재시도 큐 항목.
///
/// 첫 단계 실패 시 생성되며, 남은 단계는 이미 시도한 단계를 제외하고
/// 항상 긴 구간에서 짧은 구간 순서를 유지합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryItem {
    pub tracker: Tracker,
    /// 아직 시도하지 않은 단계
    pub remaining: Vec<FetchWindow>,
    /// 지금까지 시도한 단계 수
    pub attempts: u32,
    /// 마지막 실패 분류
    pub last_failure: FailureKind,
}

impl RetryItem {
    /// 첫 단계 실패 후 생성. fallback 단계가 없으면 None.
    pub fn after_first_tier(tracker: Tracker, plan: &TierPlan, failure: FailureKind) -> Option<Self> {
        if plan.fallbacks().is_empty() {
            return None;
        }
        Some(Self {
            tracker,
            remaining: plan.fallbacks().to_vec(),
            attempts: 1,
            last_failure: failure,
        })
    }

    /// 다음에 시도할 단계
    pub fn next_window(&self) -> Option<FetchWindow> {
        self.remaining.first().copied()
    }

    /// 방금 시도한 단계를 제거. 남은 단계가 없으면 None.
    pub fn advance(mut self, failure: FailureKind) -> Option<Self> {
        if !self.remaining.is_empty() {
            self.remaining.remove(0);
        }
        self.attempts += 1;
        self.last_failure = failure;
        (!self.remaining.is_empty()).then_some(self)
    }
}

/// 조회 정책 (같은 구간 재시도)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// 조회 1건당 타임아웃
    pub timeout: Duration,
    /// 일시적 장애 시 같은 구간 재시도 횟수
    pub max_retries: u32,
    /// 재시도 간 고정 대기
    pub backoff: Duration,
}

/// 저장 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// 첫 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 간 고정 대기
    pub backoff: Duration,
}

/// 타임아웃과 같은 구간 재시도를 적용한 조회.
///
/// 타임아웃은 `NetworkError`로 분류됩니다. 재시도 후에도 실패하면 마지막
/// 결과를 그대로 반환하며, 호출자는 이를 fallback 대상으로 처리합니다.
pub async fn fetch_with_policy(
    client: &dyn FetchClient,
    symbol: &str,
    window: FetchWindow,
    policy: &FetchPolicy,
) -> FetchResult {
    let mut retries = 0;

    loop {
        let response = match tokio::time::timeout(policy.timeout, client.fetch(symbol, window)).await
        {
            Ok(response) => response,
            Err(_) => Err(FetchError::network(format!(
                "조회 타임아웃 ({}s)",
                policy.timeout.as_secs()
            ))),
        };

        let result = FetchResult::from_response(symbol, window, response);
        match result.error_kind() {
            Some(kind) if kind.is_transient() && retries < policy.max_retries => {
                retries += 1;
                warn!(
                    symbol = symbol,
                    window = %window,
                    kind = %kind,
                    retry = retries,
                    "일시적 조회 실패, 같은 구간 재시도"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            _ => {
                debug!(symbol = symbol, window = %window, outcome = ?result.outcome, "조회 완료");
                return result;
            }
        }
    }
}

/// 고정 대기 간격으로 저장 재시도.
///
/// 총 시도 횟수는 `max_retries + 1`이며, 소진되면 마지막 에러를 반환합니다.
pub async fn write_with_retry<T, F, Fut>(
    operation: &str,
    symbol: &str,
    policy: &WritePolicy,
    mut write: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut retries = 0;

    loop {
        match write().await {
            Ok(value) => return Ok(value),
            Err(e) if retries < policy.max_retries => {
                retries += 1;
                warn!(
                    operation = operation,
                    symbol = symbol,
                    retry = retries,
                    error = %e,
                    "저장 실패, 재시도"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => {
                tracing::error!(
                    operation = operation,
                    symbol = symbol,
                    attempts = retries + 1,
                    error = %e,
                    "저장 재시도 소진"
                );
                return Err(e);
            }
        }
    }
}
