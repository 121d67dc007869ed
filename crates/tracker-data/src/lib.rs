//! 데이터 소스 및 저장소.
//!
//! 이 crate는 다음을 제공합니다:
//! - Yahoo Finance 기반 `FetchClient` 구현
//! - PostgreSQL 기반 트래커 레지스트리 및 가격 저장소
//! - 컬럼명/행 정규화

pub mod error;
pub mod normalize;
pub mod provider;
pub mod storage;

pub use error::{DataError, Result};
pub use normalize::{normalize_column_name, StandardNormalizer};
pub use provider::yahoo::YahooFetchClient;
pub use storage::postgres::{PgTrackerStore, TableNames};
