use std::process::ExitCode;
use std::sync::Arc;

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use tracing::info;

use kms_cache::cache::ConnectionManager;
use kms_cache::config::{self, Command, Settings};
use kms_cache::error::AppError;
use kms_cache::jobs::{PrimeJobContext, prime_schedule, process_prime_cache_job};
use kms_cache::prime::{PrimeContext, run_prime};
use kms_cache::telemetry;
use kms_cache::upstream::{HttpProducer, SparqlMetadata};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("kms-cache: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, AppError> {
    let (args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let context = Arc::new(build_prime_context(&settings)?);
    match args.command {
        Some(Command::Prime(_)) => prime_once(context).await,
        _ => serve(context, &settings).await,
    }
}

fn build_prime_context(settings: &Settings) -> Result<PrimeContext, AppError> {
    let manager = Arc::new(ConnectionManager::new(settings.store.clone()));
    let producer =
        HttpProducer::new(&settings.upstream).map_err(|err| AppError::unexpected(err.to_string()))?;
    let metadata = SparqlMetadata::new(&settings.upstream)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    Ok(PrimeContext {
        manager,
        producer: Arc::new(producer),
        metadata: Arc::new(metadata),
        settings: settings.prime.clone(),
    })
}

/// One priming pass, summary on stdout, non-zero exit when routes failed.
async fn prime_once(context: Arc<PrimeContext>) -> Result<ExitCode, AppError> {
    let outcome = run_prime(&context).await;
    let body =
        serde_json::to_string_pretty(&outcome).map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{body}");
    Ok(if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Runs the cron scheduler until the process is stopped.
async fn serve(context: Arc<PrimeContext>, settings: &Settings) -> Result<ExitCode, AppError> {
    let schedule = prime_schedule(&settings.prime.schedule)?;
    info!(schedule = %settings.prime.schedule, "starting prime scheduler");

    let prime_worker = WorkerBuilder::new("prime-cache-worker")
        .data(PrimeJobContext { prime: context })
        .backend(CronStream::new(schedule))
        .build_fn(process_prime_cache_job);

    Monitor::new()
        .register(prime_worker)
        .run()
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}
