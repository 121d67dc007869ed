//! 고정 크기 워커 풀.
//!
//! 워커는 공유 큐에서 항목을 꺼내 순서대로 처리합니다. 감독 루프는 워커의
//! 패닉을 감지해 처리 중이던 항목을 큐 앞쪽에 되돌리고 새 워커를 띄우며,
//! 재시작 횟수가 한도를 넘으면 해당 항목을 포기합니다.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::WorkQueue;

/// 워커가 처리하는 작업 정의.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    /// 로그용 이름
    fn name(&self) -> &'static str;

    /// 항목 하나 처리. 실패는 내부에서 기록하며 반환하지 않습니다.
    async fn process(&self, item: Self::Item);

    /// 워커 장애로 중단된 항목 정리.
    ///
    /// 이어서 처리할 항목이 있으면 반환하고, 풀은 이를 새 워커에 재배정합니다.
    async fn on_fault(&self, _item: Self::Item) -> Option<Self::Item> {
        None
    }
}

/// 워커 풀 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// 워커 수
    pub size: usize,
    /// 최대 재시작 횟수
    pub max_restarts: usize,
}

/// 풀 실행 결과
#[derive(Debug)]
pub struct PoolOutcome<T> {
    /// 감지된 워커 장애 수
    pub faults: usize,
    /// 재시작된 워커 수
    pub restarts: usize,
    /// 재시작 한도 초과로 포기한 항목
    pub abandoned: Vec<T>,
}

impl<T> Default for PoolOutcome<T> {
    fn default() -> Self {
        Self {
            faults: 0,
            restarts: 0,
            abandoned: Vec::new(),
        }
    }
}

type Slot<T> = Arc<Mutex<Option<T>>>;

/// 큐가 빌 때까지 (또는 취소될 때까지) 워커 풀 실행.
///
/// 남은 항목은 큐에 그대로 두므로 호출자가 정리합니다.
pub async fn run_pool<J: Job>(
    job: Arc<J>,
    queue: Arc<WorkQueue<J::Item>>,
    settings: PoolSettings,
    cancel: CancellationToken,
) -> PoolOutcome<J::Item> {
    let size = settings.size.max(1);
    info!(job = job.name(), workers = size, "워커 풀 시작");

    let mut workers = FuturesUnordered::new();
    for id in 0..size {
        workers.push(spawn_worker(id, job.clone(), queue.clone(), cancel.clone()));
    }

    let mut outcome = PoolOutcome::default();
    let mut next_id = size;

    while let Some((id, slot, result)) = workers.next().await {
        let join_err = match result {
            Ok(()) => continue,
            Err(e) => e,
        };

        if !join_err.is_panic() {
            warn!(job = job.name(), worker = id, error = %join_err, "워커가 비정상 종료됨");
            continue;
        }

        outcome.faults += 1;
        let in_flight = slot.lock().await.take();
        error!(
            job = job.name(),
            worker = id,
            in_flight = in_flight.is_some(),
            "워커 장애 감지"
        );

        let resumed = match in_flight {
            Some(item) => job.on_fault(item).await,
            None => None,
        };

        if outcome.restarts < settings.max_restarts {
            if let Some(item) = resumed {
                queue.push_front(item).await;
            }
            outcome.restarts += 1;
            warn!(
                job = job.name(),
                worker = next_id,
                restarts = outcome.restarts,
                "대체 워커 시작"
            );
            workers.push(spawn_worker(next_id, job.clone(), queue.clone(), cancel.clone()));
            next_id += 1;
        } else {
            error!(
                job = job.name(),
                max_restarts = settings.max_restarts,
                "재시작 한도 초과, 처리 중이던 항목 포기"
            );
            outcome.abandoned.extend(resumed);
        }
    }

    info!(
        job = job.name(),
        faults = outcome.faults,
        restarts = outcome.restarts,
        "워커 풀 종료"
    );
    outcome
}

fn spawn_worker<J: Job>(
    id: usize,
    job: Arc<J>,
    queue: Arc<WorkQueue<J::Item>>,
    cancel: CancellationToken,
) -> impl Future<Output = (usize, Slot<J::Item>, Result<(), JoinError>)> {
    let slot: Slot<J::Item> = Arc::new(Mutex::new(None));
    let handle = tokio::spawn(worker_loop(id, job, queue, slot.clone(), cancel));
    async move { (id, slot, handle.await) }
}

async fn worker_loop<J: Job>(
    id: usize,
    job: Arc<J>,
    queue: Arc<WorkQueue<J::Item>>,
    slot: Slot<J::Item>,
    cancel: CancellationToken,
) {
    debug!(job = job.name(), worker = id, "워커 시작");

    while !cancel.is_cancelled() {
        let Some(item) = queue.pop().await else {
            break;
        };

        *slot.lock().await = Some(item.clone());
        job.process(item).await;
        *slot.lock().await = None;
    }

    debug!(job = job.name(), worker = id, "워커 종료");
}

/// 실행 단위 취소 토큰과 타임아웃 타이머.
///
/// 상위 토큰(Ctrl-C 등)이 취소되거나 타임아웃이 지나면 취소됩니다.
pub struct RunGuard {
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl RunGuard {
    pub fn new(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        let token = parent.child_token();
        let timed_out = Arc::new(AtomicBool::new(false));

        let timer = timeout.map(|limit| {
            let token = token.clone();
            let timed_out = timed_out.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        warn!(timeout_secs = limit.as_secs(), "실행 타임아웃, 새 작업 배정 중단");
                        timed_out.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        Self {
            token,
            timed_out,
            timer,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 취소 사유 (취소되지 않았으면 None)
    pub fn cancel_reason(&self) -> Option<&'static str> {
        if self.timed_out.load(Ordering::SeqCst) {
            Some("실행 타임아웃")
        } else if self.token.is_cancelled() {
            Some("실행 취소")
        } else {
            None
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
