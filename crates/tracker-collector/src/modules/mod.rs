//! 수집 파이프라인 모듈.
//!
//! - `verifier`: 단계별 상장 여부 검증
//! - `collector`: 단계별 fallback 가격 수집
//! - `retry`: 재시도 항목과 조회/저장 재시도 정책
//! - `pool`: 장애 감지/재시작을 포함한 워커 풀
//! - `queue`: 워커 간 공유 작업 큐

pub mod collector;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod verifier;

pub use collector::{Chunk, Collector};
pub use pool::{run_pool, Job, PoolOutcome, PoolSettings, RunGuard};
pub use queue::WorkQueue;
pub use retry::{fetch_with_policy, write_with_retry, FetchPolicy, RetryItem, WritePolicy};
pub use verifier::Verifier;
