use anyhow::{bail, Result};
use casper_indexer::chain::CasperRpcClient;
use casper_indexer::fanout::enqueue_all;
use casper_indexer::handlers::block::enqueue_unverified;
use casper_indexer::handlers::deploy::enqueue_reprocess;
use casper_indexer::handlers::HandlerContext;
use casper_indexer::metrics;
use casper_indexer::queue::RedisQueue;
use casper_indexer::store::PgStore;
use casper_indexer::tasks::{QueuePriorities, Task};
use casper_indexer::worker::Worker;
use casper_indexer::{streams, IndexerConfig};
use clap::{Parser, Subcommand};
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_postgres::NoTls;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warp::Filter;

const SEED_CONSUMER: &str = "indexer_seed";

#[derive(Debug, Parser)]
#[command(name = "indexer")]
#[command(about = "Index a Casper chain into PostgreSQL through Redis stream queues")]
struct Args {
    #[arg(
        long,
        env = "REDIS_URL",
        global = true,
        default_value = "redis://localhost:6379"
    )]
    redis_url: String,

    #[arg(
        long,
        env = "DATABASE_URL",
        global = true,
        default_value = "postgres://localhost/casper"
    )]
    database_url: String,

    /// Prefix of the queue stream names (`<prefix>:<queue>`)
    #[arg(
        long,
        env = "INDEXER_STREAM_PREFIX",
        global = true,
        default_value = streams::DEFAULT_PREFIX
    )]
    stream_prefix: String,

    #[arg(long, env = "INDEXER_GROUP", global = true, default_value = streams::DEFAULT_GROUP)]
    consumer_group: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the worker pool
    Worker(WorkerArgs),
    /// Queue `block:raw` for an inclusive height range
    Blocks {
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
    },
    /// Queue `block:verify` for blocks not yet verified
    Verify {
        #[arg(long, default_value = "500")]
        limit: i64,
        /// Skip blocks already scheduled within this many seconds
        #[arg(long, default_value = "0")]
        recheck_secs: u64,
    },
    /// Queue one snapshot of the current auction
    Auction,
    /// Queue `deploy:known` for stored deploys without metadata
    Reprocess {
        #[arg(long, default_value = "1000")]
        limit: i64,
    },
    /// Apply the bundled schema
    Migrate,
}

#[derive(Debug, clap::Args)]
struct WorkerArgs {
    #[arg(long, env = "CASPER_RPC_URL", default_value = "http://localhost:7777/rpc")]
    rpc_url: String,

    #[arg(long, env = "INDEXER_CONCURRENCY", default_value = "20")]
    concurrency: usize,

    /// Queue priorities as `name,priority,name,priority`; all queues at 1 when unset
    #[arg(long, env = "INDEXER_QUEUES", value_delimiter = ',')]
    queues: Vec<String>,

    #[arg(long, env = "INDEXER_CONSUMER", default_value = "indexer_1")]
    consumer_name: String,

    #[arg(long, env = "INDEXER_MAX_RETRIES", default_value = "25")]
    max_retries: u32,

    #[arg(long, env = "INDEXER_RETRY_INITIAL_BACKOFF_MS", default_value = "1000")]
    retry_initial_backoff_ms: u64,

    #[arg(long, env = "INDEXER_RETRY_MAX_BACKOFF_MS", default_value = "60000")]
    retry_max_backoff_ms: u64,

    /// Seconds between verify sweeps; 0 disables the sweeper
    #[arg(long, env = "INDEXER_VERIFY_INTERVAL_SECS", default_value = "60")]
    verify_interval_secs: u64,

    #[arg(long, env = "INDEXER_VERIFY_BATCH", default_value = "500")]
    verify_batch: i64,

    /// Seconds before an unverified block is swept again
    #[arg(long, env = "INDEXER_VERIFY_RECHECK_SECS", default_value = "600")]
    verify_recheck_secs: u64,

    /// Pending entries idle this long are claimed from their consumer
    #[arg(long, env = "INDEXER_CLAIM_MIN_IDLE_MS", default_value = "300000")]
    claim_min_idle_ms: u64,

    #[arg(long, env = "INDEXER_METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Database pool size; defaults to the concurrency
    #[arg(long, env = "DB_POOL_MAX_SIZE")]
    pool_size: Option<usize>,

    #[arg(long, env = "CASPER_RPC_TIMEOUT_SECS", default_value = "30")]
    rpc_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "indexer=info,casper_indexer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Worker(ref worker) => run_worker(&args, worker).await,
        Command::Blocks { from, to } => {
            if from > to {
                bail!("--from {} is above --to {}", from, to);
            }
            let queue = seed_queue(&args).await?;
            let tasks = (from..=to)
                .map(|block_height| Task::BlockRaw { block_height })
                .collect();
            let count = enqueue_all(&queue, tasks).await?;
            info!("Queued {} blocks from {} to {}", count, from, to);
            Ok(())
        }
        Command::Verify {
            limit,
            recheck_secs,
        } => {
            let queue = seed_queue(&args).await?;
            let store = PgStore::new(create_pool(&args.database_url, 2)?);
            let recheck = Duration::from_secs(recheck_secs);
            let count = enqueue_unverified(&store, &queue, limit, recheck).await?;
            info!("Queued verification of {} blocks", count);
            Ok(())
        }
        Command::Auction => {
            let queue = seed_queue(&args).await?;
            enqueue_all(&queue, vec![Task::Auction]).await?;
            info!("Queued auction snapshot");
            Ok(())
        }
        Command::Reprocess { limit } => {
            let queue = seed_queue(&args).await?;
            let store = PgStore::new(create_pool(&args.database_url, 2)?);
            let count = enqueue_reprocess(&store, &queue, limit).await?;
            info!("Queued metadata pass for {} deploys", count);
            Ok(())
        }
        Command::Migrate => {
            let store = PgStore::new(create_pool(&args.database_url, 1)?);
            store.migrate().await?;
            Ok(())
        }
    }
}

async fn run_worker(args: &Args, worker: &WorkerArgs) -> Result<()> {
    let priorities = if worker.queues.is_empty() {
        QueuePriorities::default()
    } else {
        QueuePriorities::parse(&worker.queues)?
    };

    let config = IndexerConfig {
        redis_url: args.redis_url.clone(),
        database_url: args.database_url.clone(),
        rpc_url: worker.rpc_url.clone(),
        stream_prefix: args.stream_prefix.clone(),
        consumer_group: args.consumer_group.clone(),
        consumer_name: worker.consumer_name.clone(),
        concurrency: worker.concurrency,
        priorities,
        max_retries: worker.max_retries,
        retry_initial_backoff_ms: worker.retry_initial_backoff_ms,
        retry_max_backoff_ms: worker.retry_max_backoff_ms,
        verify_interval_secs: worker.verify_interval_secs,
        verify_batch: worker.verify_batch,
        verify_recheck_secs: worker.verify_recheck_secs,
        claim_min_idle_ms: worker.claim_min_idle_ms,
    };
    info!("Configuration: {:?}", config);

    metrics::initialize_metrics();
    serve_metrics(worker.metrics_port);

    // One connection per concurrent task unless overridden
    let pool_size = worker.pool_size.unwrap_or(config.concurrency);
    let pool = create_pool(&config.database_url, pool_size)?;
    info!(
        "PostgreSQL pool configured: max_size={}, concurrency={}",
        pool_size, config.concurrency
    );

    let rpc = Arc::new(CasperRpcClient::new(
        &config.rpc_url,
        Duration::from_secs(worker.rpc_timeout_secs),
    )?);
    let store = Arc::new(PgStore::new(pool));
    let queue = Arc::new(
        RedisQueue::new(
            &config.redis_url,
            config.stream_prefix.clone(),
            config.consumer_group.clone(),
            config.consumer_name.clone(),
        )
        .await?,
    );
    let ctx = Arc::new(HandlerContext::new(rpc, store, queue.clone()));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!("Error waiting for shutdown signal: {}", err),
        }
        shutdown.cancel();
    });

    Worker::new(config, queue, ctx, cancel)?.run().await?;
    Ok(())
}

fn serve_metrics(port: u16) {
    tokio::spawn(async move {
        let metrics_route = warp::path("metrics").map(|| match metrics::encode_metrics() {
            Ok(body) => warp::http::Response::builder()
                .header("Content-Type", "text/plain; version=0.0.4")
                .body(body),
            Err(e) => warp::http::Response::builder()
                .status(500)
                .body(format!("Error encoding metrics: {}", e)),
        })
        .map(|response: Result<_, warp::http::Error>| match response {
            Ok(response) => response,
            Err(e) => {
                let mut fallback = warp::http::Response::new(format!("Error: {}", e));
                *fallback.status_mut() = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            }
        });

        info!("Metrics server listening on 0.0.0.0:{}", port);
        warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
    });
}

async fn seed_queue(args: &Args) -> Result<RedisQueue> {
    Ok(RedisQueue::new(
        &args.redis_url,
        args.stream_prefix.clone(),
        args.consumer_group.clone(),
        SEED_CONSUMER.to_string(),
    )
    .await?)
}

fn create_pool(database_url: &str, max_size: usize) -> Result<Pool> {
    let mut pg_config = Config::new();
    pg_config.url = Some(database_url.to_string());
    pg_config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    pg_config.pool = Some(PoolConfig {
        max_size: max_size.max(1),
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(30)),
            create: Some(Duration::from_secs(30)),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    Ok(pg_config.create_pool(Some(Runtime::Tokio1), NoTls)?)
}
