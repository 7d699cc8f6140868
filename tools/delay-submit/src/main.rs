//! Submit delay requests to a running delay platform.
//!
//! # Usage
//!
//! ```bash
//! # Deliver "hello" to biz_topic in 30 seconds
//! cargo run -p delay-submit -- --redis-url redis://localhost --topic biz_topic \
//!     --value hello --delay-ms 30000
//!
//! # Deliver at an absolute instant, deduplicated by key
//! cargo run -p delay-submit -- --redis-url redis://localhost --topic biz_topic \
//!     --value hello --deadline-ms 1718000000000 --dedup-key order-42
//!
//! # Load test: 1000 requests, one second apart in deadline
//! cargo run -p delay-submit -- --redis-url redis://localhost --topic biz_topic \
//!     --value tick --delay-ms 1000 --count 1000
//! ```

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use clap::Parser;

use delay_core::tracing::init_tracing;
use delay_platform::domain::types::DEFAULT_DELAY_TOPIC;
use delay_platform::infra::redis::RedisStreamPublisher;
use delay_platform::usecase::producer::{Producer, SubmitInput};

#[derive(Parser)]
#[command(about = "Submit delay requests to the delay topic")]
struct Args {
    /// Redis URL of the delay topic (e.g. redis://localhost:6379)
    #[arg(long)]
    redis_url: String,

    /// Stream the delay service consumes
    #[arg(long, default_value = DEFAULT_DELAY_TOPIC)]
    delay_topic: String,

    /// Business topic the payload is forwarded to
    #[arg(long)]
    topic: String,

    /// Payload (UTF-8)
    #[arg(long)]
    value: String,

    /// Delay relative to now, in milliseconds
    #[arg(long, conflicts_with = "deadline_ms")]
    delay_ms: Option<u64>,

    /// Absolute deadline, epoch milliseconds
    #[arg(long)]
    deadline_ms: Option<i64>,

    /// Deduplication key; with --count, a `-{n}` suffix is appended
    #[arg(long)]
    dedup_key: Option<String>,

    /// Number of requests; request n gets n extra delays
    #[arg(long, default_value_t = 1)]
    count: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let base_deadline = match (args.delay_ms, args.deadline_ms) {
        (Some(ms), None) => Utc::now() + chrono::Duration::milliseconds(ms as i64),
        (None, Some(ms)) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .context("deadline out of range")?,
        (None, None) => Utc::now(),
        (Some(_), Some(_)) => bail!("use either --delay-ms or --deadline-ms"),
    };
    let step = chrono::Duration::milliseconds(args.delay_ms.unwrap_or(0) as i64);

    let pool = deadpool_redis::Config::from_url(&args.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .context("failed to create Redis pool")?;
    let producer = Producer {
        delay_topic: RedisStreamPublisher {
            pool,
            stream: args.delay_topic.clone(),
        },
    };

    for n in 0..args.count {
        let dedup_key = match (&args.dedup_key, args.count) {
            (Some(key), 1) => Some(key.clone()),
            (Some(key), _) => Some(format!("{key}-{n}")),
            (None, _) => None,
        };
        let deadline = base_deadline + step * n as i32;
        producer
            .submit(SubmitInput {
                value: Bytes::from(args.value.clone()),
                topic: args.topic.clone(),
                deadline,
                dedup_key,
            })
            .await
            .with_context(|| format!("submit request {n}"))?;
    }

    tracing::info!(
        count = args.count,
        delay_topic = %args.delay_topic,
        topic = %args.topic,
        first_deadline = base_deadline.timestamp_millis(),
        "submitted delay requests"
    );
    Ok(())
}
