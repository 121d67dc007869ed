//! 트래커 검증 및 과거 가격 수집 엔진.
//!
//! 이 crate는 다음을 제공합니다:
//! - 단계별 상장 여부 검증 (Verifier)
//! - 단계별 fallback 병렬 가격 수집 (Collector)
//! - 재시도 큐와 장애 복구 워커 풀
//! - 실행 결과 리포트

pub mod config;
pub mod error;
pub mod modules;
pub mod report;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use modules::{Collector, Verifier};
pub use report::{
    CollectedSeries, CollectionReport, FailureKind, VerificationOutcome, VerificationReport,
    VerificationSummary,
};
