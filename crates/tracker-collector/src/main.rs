//! 트래커 검증/수집 CLI.

use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracker_collector::{
    CollectionReport, Collector, CollectorConfig, Result, VerificationReport, Verifier,
};
use tracker_core::{init_logging, LogConfig, LogFormat, TrackerRegistry};
use tracker_data::{PgTrackerStore, StandardNormalizer, TableNames, YahooFetchClient};

/// 영구 실패가 있을 때의 종료 코드
const EXIT_PERMANENT_FAILURES: u8 = 2;
/// 실행 중단 시 종료 코드
const EXIT_ABORTED: u8 = 1;

#[derive(Parser)]
#[command(name = "tracker-collector")]
#[command(about = "Tracker verification and historical price collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (미지정 시 실행 모드 기본값)
    #[arg(long)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long)]
    log_format: Option<String>,

    /// 결과 리포트를 JSON으로 표준 출력에 기록
    #[arg(long)]
    json: bool,

    /// 워커 수 (COLLECTOR_POOL_SIZE 대신 사용)
    #[arg(long)]
    pool_size: Option<usize>,

    /// 청크 크기 (COLLECTOR_CHUNK_SIZE 대신 사용)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// 실행 타임아웃 초 (RUN_TIMEOUT_SECS 대신 사용, 0이면 없음)
    #[arg(long)]
    run_timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// 전체 트래커 상장 여부 검증
    Verify,

    /// Active 트래커 과거 가격 수집
    Collect {
        /// 특정 심볼만 수집 (쉼표로 구분, 예: "AAPL,MSFT")
        #[arg(long)]
        symbols: Option<String>,
    },

    /// 전체 워크플로우 실행 (검증 → 수집)
    RunAll,

    /// 테이블 생성
    InitSchema,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = CollectorConfig::from_env();
    let run_mode = loaded.as_ref().map(|c| c.run_mode).unwrap_or_default();

    // 로깅 초기화
    let mut log_config = LogConfig::for_mode(run_mode);
    if let Some(level) = &cli.log_level {
        log_config = log_config.with_level(level.clone());
    }
    if let Some(format) = &cli.log_format {
        match format.parse::<LogFormat>() {
            Ok(format) => log_config = log_config.with_format(format),
            Err(e) => eprintln!("{}, 기본 형식 사용", e),
        }
    }
    if let Err(e) = init_logging(log_config) {
        eprintln!("로깅 초기화 실패: {}", e);
    }

    tracing::info!(mode = %run_mode, "Tracker Collector 시작");

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("설정 로드 실패: {}", e);
            return ExitCode::from(EXIT_ABORTED);
        }
    };

    if let Some(size) = cli.pool_size {
        config.pool.pool_size = size;
    }
    if let Some(size) = cli.chunk_size {
        config.collect.chunk_size = size;
    }
    if let Some(secs) = cli.run_timeout_secs {
        config.pool.run_timeout_secs = secs;
    }
    if let Err(e) = config.validate() {
        tracing::error!("설정 오류: {}", e);
        return ExitCode::from(EXIT_ABORTED);
    }

    match run(cli.command, &config, cli.json).await {
        Ok(code) => {
            tracing::info!("Tracker Collector 종료");
            code
        }
        Err(e) => {
            tracing::error!("실행 중단: {}", e);
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

async fn run(command: Commands, config: &CollectorConfig, json: bool) -> Result<ExitCode> {
    // DB 연결
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!("데이터베이스 연결 성공");

    let store = Arc::new(PgTrackerStore::new(pool.clone(), TableNames::default()));

    // Ctrl-C: 새 작업 배정 중단, 진행 중인 조회는 마무리
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("종료 신호 수신, 진행 중인 작업 마무리 후 종료");
                cancel.cancel();
            }
        });
    }

    let code = match command {
        Commands::InitSchema => {
            store.ensure_schema().await?;
            ExitCode::SUCCESS
        }
        Commands::Verify => {
            let report = verify(store.clone(), config, &cancel).await?;
            emit(&report, json)?;
            verification_exit_code(&report, &cancel)
        }
        Commands::Collect { symbols } => {
            let report = collect(store.clone(), config, symbols.as_deref(), &cancel).await?;
            emit(&report, json)?;
            collection_exit_code(&report, &cancel)
        }
        Commands::RunAll => {
            tracing::info!("=== 전체 워크플로우 시작 ===");

            tracing::info!("Step 1/2: 트래커 검증");
            let verification = verify(store.clone(), config, &cancel).await?;

            if verification.aborted.is_some() || cancel.is_cancelled() {
                emit(&verification, json)?;
                verification_exit_code(&verification, &cancel)
            } else {
                tracing::info!("Step 2/2: 가격 수집");
                let collection = collect(store.clone(), config, None, &cancel).await?;

                if json {
                    #[derive(Serialize)]
                    struct RunAllReport<'a> {
                        verification: &'a VerificationReport,
                        collection: &'a CollectionReport,
                    }
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&RunAllReport {
                            verification: &verification,
                            collection: &collection,
                        })?
                    );
                }

                tracing::info!("=== 전체 워크플로우 완료 ===");
                collection_exit_code(&collection, &cancel)
            }
        }
    };

    pool.close().await;
    Ok(code)
}

async fn verify(
    store: Arc<PgTrackerStore>,
    config: &CollectorConfig,
    cancel: &CancellationToken,
) -> Result<VerificationReport> {
    let trackers = store.read_all_trackers().await?;
    let fetcher = Arc::new(YahooFetchClient::new()?);

    let verifier = Verifier::new(fetcher, store, config.clone());
    let report = verifier.verify(trackers, cancel).await?;
    report.summary().log_summary();
    Ok(report)
}

async fn collect(
    store: Arc<PgTrackerStore>,
    config: &CollectorConfig,
    symbols: Option<&str>,
    cancel: &CancellationToken,
) -> Result<CollectionReport> {
    let mut trackers = store.read_active_trackers().await?;

    if let Some(symbols) = symbols {
        let wanted: HashSet<&str> = symbols
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        trackers.retain(|t| wanted.contains(t.symbol.as_str()));
        tracing::info!(requested = wanted.len(), matched = trackers.len(), "지정 심볼만 수집");
    }

    let fetcher = Arc::new(YahooFetchClient::new()?);
    let collector = Collector::new(
        fetcher,
        store,
        Arc::new(StandardNormalizer),
        config.clone(),
    );
    let report = collector.collect(trackers, cancel).await?;
    report.log_summary("가격 수집");
    Ok(report)
}

fn emit<T: Serialize>(report: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

fn verification_exit_code(report: &VerificationReport, cancel: &CancellationToken) -> ExitCode {
    if report.aborted.is_some() || cancel.is_cancelled() {
        ExitCode::from(EXIT_ABORTED)
    } else {
        ExitCode::SUCCESS
    }
}

fn collection_exit_code(report: &CollectionReport, cancel: &CancellationToken) -> ExitCode {
    if report.aborted.is_some() || cancel.is_cancelled() {
        ExitCode::from(EXIT_ABORTED)
    } else if report.has_permanent_failures() {
        ExitCode::from(EXIT_PERMANENT_FAILURES)
    } else {
        ExitCode::SUCCESS
    }
}
