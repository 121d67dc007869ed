//! 환경변수 기반 설정 모듈.
//!
//! 설정은 시작 시 한 번 구성되어 검증기와 수집기에 명시적으로 전달됩니다.

use std::time::Duration;
use tracing::warn;
use tracker_core::{RunMode, TierPlan};

use crate::error::CollectorError;
use crate::modules::pool::PoolSettings;
use crate::modules::retry::{FetchPolicy, WritePolicy};
use crate::Result;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 실행 모드 (dev / prod)
    pub run_mode: RunMode,
    /// DB 최대 연결 수
    pub db_max_connections: u32,
    /// 워커 풀 설정
    pub pool: PoolConfig,
    /// 수집기 설정
    pub collect: CollectConfig,
    /// 검증기 설정
    pub verify: VerifyConfig,
    /// 조회 설정
    pub fetch: FetchConfig,
    /// 저장 재시도 설정
    pub write: WriteConfig,
}

/// 워커 풀 설정
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 워커 수 (기본: 호스트 병렬성)
    pub pool_size: usize,
    /// 워커 장애 시 최대 재시작 횟수 (실행 단계별)
    pub max_restarts: usize,
    /// 실행 전체 타임아웃 (초, 0이면 없음)
    pub run_timeout_secs: u64,
}

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// 청크당 트래커 수
    pub chunk_size: usize,
    /// fallback 단계 (긴 구간 → 짧은 구간)
    pub tiers: TierPlan,
}

/// 검증기 설정
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// 검증 단계 (Medium → Short)
    pub tiers: TierPlan,
}

/// 조회 설정
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// 조회 1건당 타임아웃 (초)
    pub timeout_secs: u64,
    /// 일시적 장애 시 같은 구간 재시도 횟수
    pub max_retries: u32,
    /// 재시도 간 대기 (밀리초)
    pub retry_backoff_ms: u64,
    /// 워커 내 연속 조회 간 딜레이 (밀리초)
    pub request_delay_ms: u64,
}

/// 저장 재시도 설정
#[derive(Debug, Clone)]
pub struct WriteConfig {
    /// 첫 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 간 대기 (밀리초)
    pub retry_backoff_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            run_mode: RunMode::default(),
            db_max_connections: 10,
            pool: PoolConfig {
                pool_size: default_pool_size(),
                max_restarts: 3,
                run_timeout_secs: 0,
            },
            collect: CollectConfig {
                chunk_size: 50,
                tiers: TierPlan::collector_default(),
            },
            verify: VerifyConfig {
                tiers: TierPlan::verifier_default(),
            },
            fetch: FetchConfig {
                timeout_secs: 30,
                max_retries: 2,
                retry_backoff_ms: 1000,
                request_delay_ms: 0,
            },
            write: WriteConfig {
                max_retries: 3,
                retry_backoff_ms: 500,
            },
        }
    }
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        if config.database_url.is_empty() {
            return Err(CollectorError::Config(
                "DATABASE_URL 환경변수가 설정되지 않았습니다".to_string(),
            ));
        }
        Ok(config)
    }

    /// 키 조회 함수로부터 설정 구성.
    ///
    /// 숫자 값은 파싱 실패 시 기본값을 사용하지만, 단계 목록과 실행 모드는
    /// 잘못된 값이면 에러를 반환합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let run_mode = match lookup("RUN_MODE") {
            Some(value) => value.parse::<RunMode>()?,
            None => defaults.run_mode,
        };

        let config = Self {
            database_url: lookup("DATABASE_URL").unwrap_or_default(),
            run_mode,
            db_max_connections: env_var_parse(
                &lookup,
                "DB_MAX_CONNECTIONS",
                defaults.db_max_connections,
            ),
            pool: PoolConfig {
                pool_size: env_var_parse(&lookup, "COLLECTOR_POOL_SIZE", defaults.pool.pool_size),
                max_restarts: env_var_parse(
                    &lookup,
                    "WORKER_MAX_RESTARTS",
                    defaults.pool.max_restarts,
                ),
                run_timeout_secs: env_var_parse(
                    &lookup,
                    "RUN_TIMEOUT_SECS",
                    defaults.pool.run_timeout_secs,
                ),
            },
            collect: CollectConfig {
                chunk_size: env_var_parse(
                    &lookup,
                    "COLLECTOR_CHUNK_SIZE",
                    defaults.collect.chunk_size,
                ),
                tiers: env_var_tiers(&lookup, "COLLECTOR_TIERS", defaults.collect.tiers)?,
            },
            verify: VerifyConfig {
                tiers: env_var_tiers(&lookup, "VERIFIER_TIERS", defaults.verify.tiers)?,
            },
            fetch: FetchConfig {
                timeout_secs: env_var_parse(
                    &lookup,
                    "FETCH_TIMEOUT_SECS",
                    defaults.fetch.timeout_secs,
                ),
                max_retries: env_var_parse(
                    &lookup,
                    "FETCH_MAX_RETRIES",
                    defaults.fetch.max_retries,
                ),
                retry_backoff_ms: env_var_parse(
                    &lookup,
                    "FETCH_RETRY_BACKOFF_MS",
                    defaults.fetch.retry_backoff_ms,
                ),
                request_delay_ms: env_var_parse(
                    &lookup,
                    "REQUEST_DELAY_MS",
                    defaults.fetch.request_delay_ms,
                ),
            },
            write: WriteConfig {
                max_retries: env_var_parse(
                    &lookup,
                    "WRITE_MAX_RETRIES",
                    defaults.write.max_retries,
                ),
                retry_backoff_ms: env_var_parse(
                    &lookup,
                    "WRITE_RETRY_BACKOFF_MS",
                    defaults.write.retry_backoff_ms,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 실행을 중단시키는 설정 오류 검사.
    pub fn validate(&self) -> Result<()> {
        if self.pool.pool_size == 0 {
            return Err(CollectorError::Config(
                "워커 수는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.collect.chunk_size == 0 {
            return Err(CollectorError::Config(
                "청크 크기는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(CollectorError::Config(
                "조회 타임아웃은 1초 이상이어야 합니다".to_string(),
            ));
        }
        if self.db_max_connections == 0 {
            return Err(CollectorError::Config(
                "DB 연결 수는 1 이상이어야 합니다".to_string(),
            ));
        }
        // 필드를 직접 구성한 계획도 재검증
        for (name, plan) in [
            ("COLLECTOR_TIERS", &self.collect.tiers),
            ("VERIFIER_TIERS", &self.verify.tiers),
        ] {
            TierPlan::new(plan.tiers().to_vec())
                .map_err(|e| CollectorError::Config(format!("{}: {}", name, e)))?;
        }
        Ok(())
    }

    /// 조회 정책
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            max_retries: self.fetch.max_retries,
            backoff: Duration::from_millis(self.fetch.retry_backoff_ms),
        }
    }

    /// 저장 재시도 정책
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            max_retries: self.write.max_retries,
            backoff: Duration::from_millis(self.write.retry_backoff_ms),
        }
    }

    /// 워커 풀 설정
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            size: self.pool.pool_size,
            max_restarts: self.pool.max_restarts,
        }
    }
}

impl PoolConfig {
    /// 실행 타임아웃 (설정되지 않았으면 None)
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}

impl FetchConfig {
    /// 연속 조회 간 딜레이를 Duration으로 반환
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// 환경변수에서 값을 파싱 (실패 시 경고 후 기본값 사용)
fn env_var_parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            warn!(key = key, value = %raw, default = %default, error = %e, "잘못된 설정값, 기본값 사용");
            default
        }
    }
}

/// 환경변수에서 단계 목록 파싱 (잘못된 값은 설정 오류)
fn env_var_tiers<F>(lookup: &F, key: &str, default: TierPlan) -> Result<TierPlan>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .parse::<TierPlan>()
            .map_err(|e| CollectorError::Config(format!("{}: {}", key, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tracker_core::FetchWindow;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::from_lookup(lookup_from(&[])).unwrap();

        assert!(config.pool.pool_size >= 1);
        assert_eq!(config.collect.chunk_size, 50);
        assert_eq!(config.collect.tiers, TierPlan::collector_default());
        assert_eq!(config.verify.tiers, TierPlan::verifier_default());
        assert_eq!(config.write.max_retries, 3);
        assert_eq!(config.pool.run_timeout(), None);
        assert_eq!(config.run_mode, RunMode::Dev);
    }

    #[test]
    fn test_overrides() {
        let config = CollectorConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/trackers"),
            ("RUN_MODE", "prod"),
            ("COLLECTOR_POOL_SIZE", "8"),
            ("COLLECTOR_CHUNK_SIZE", "10"),
            ("COLLECTOR_TIERS", "10y,1y"),
            ("RUN_TIMEOUT_SECS", "600"),
            ("FETCH_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/trackers");
        assert_eq!(config.run_mode, RunMode::Prod);
        assert_eq!(config.pool.pool_size, 8);
        assert_eq!(config.collect.chunk_size, 10);
        assert_eq!(
            config.collect.tiers.tiers(),
            &[FetchWindow::TenYears, FetchWindow::OneYear]
        );
        assert_eq!(config.pool.run_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.fetch_policy().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_pool = CollectorConfig::from_lookup(lookup_from(&[("COLLECTOR_POOL_SIZE", "0")]));
        assert!(matches!(zero_pool, Err(CollectorError::Config(_))));

        let zero_chunk =
            CollectorConfig::from_lookup(lookup_from(&[("COLLECTOR_CHUNK_SIZE", "0")]));
        assert!(matches!(zero_chunk, Err(CollectorError::Config(_))));

        let growing = CollectorConfig::from_lookup(lookup_from(&[("VERIFIER_TIERS", "1d,1y")]));
        assert!(matches!(growing, Err(CollectorError::Config(_))));

        let empty = CollectorConfig::from_lookup(lookup_from(&[("COLLECTOR_TIERS", " , ")]));
        assert!(matches!(empty, Err(CollectorError::Config(_))));

        let mode = CollectorConfig::from_lookup(lookup_from(&[("RUN_MODE", "staging")]));
        assert!(matches!(mode, Err(CollectorError::Config(_))));
    }

    /// 로그 출력을 모으는 writer
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_unparsable_number_warns_and_uses_default() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = tracing::subscriber::with_default(subscriber, || {
            CollectorConfig::from_lookup(lookup_from(&[("WRITE_MAX_RETRIES", "many")]))
        })
        .unwrap();

        assert_eq!(config.write.max_retries, 3);
        let logs = captured.text();
        assert!(logs.contains("WRITE_MAX_RETRIES"));
        assert!(logs.contains("many"));
    }

    #[test]
    fn test_write_policy() {
        let mut config = CollectorConfig::default();
        config.write.max_retries = 5;
        config.write.retry_backoff_ms = 20;

        let policy = config.write_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.backoff, Duration::from_millis(20));
    }
}
