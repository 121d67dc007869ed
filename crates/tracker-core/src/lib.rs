//! # Tracker Core
//!
//! 트래커 검증/수집 파이프라인의 핵심 도메인 타입과 협력자 trait를 제공합니다.
//!
//! 이 크레이트는 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 트래커와 상태 (Active / Delisted / Unknown)
//! - 조회 구간(FetchWindow)과 단계별 fallback 계획(TierPlan)
//! - 일봉 가격 레코드
//! - 외부 협력자 인터페이스 (FetchClient, TrackerRegistry, RowSink, Normalizer)
//! - 실행 모드 설정
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
