use std::sync::Arc;

use futures::future::join_all;
use sea_orm::Database;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use delay_core::config::Config;
use delay_core::health::Readiness;
use delay_core::tracing::init_tracing;
use delay_platform::config::DelayConfig;
use delay_platform::dispatch::routing::ShardRouter;
use delay_platform::dispatch::topics::TopicRegistry;
use delay_platform::infra::db::DbDelayStore;
use delay_platform::infra::id_gen::SnowflakeGenerator;
use delay_platform::infra::redis::{RedisStreamConsumer, RedisStreamPublisher};
use delay_platform::router::build_router;
use delay_platform::usecase::receiver::Receiver;
use delay_platform::usecase::sender::SenderPool;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = DelayConfig::from_env();
    let layout = config.shard_layout().expect("invalid shard layout");
    let sender_shards = config
        .sender_shards(&layout)
        .expect("invalid DELAY_SENDER_SHARDS");

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let store = DbDelayStore { db };

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");

    let ids = Arc::new(SnowflakeGenerator::new(config.delay_node_id).expect("invalid DELAY_NODE_ID"));

    let topics = Arc::new(TopicRegistry::from_topics(
        config.delay_business_topics.iter().cloned(),
        |topic| RedisStreamPublisher {
            pool: redis.clone(),
            stream: topic.to_owned(),
        },
    ));
    if topics.is_empty() {
        error!("DELAY_BUSINESS_TOPICS is empty, every due message will stay waiting");
    }

    let consumer_name = config.consumer_name();
    let mut receivers = Vec::with_capacity(config.delay_receiver_count);
    for i in 0..config.delay_receiver_count {
        let consumer = RedisStreamConsumer::connect(
            redis.clone(),
            config.delay_topic.clone(),
            config.delay_consumer_group.clone(),
            format!("{consumer_name}-{i}"),
            config.claim_idle(),
        )
        .await
        .expect("failed to join consumer group");
        receivers.push(Receiver {
            consumer,
            store: store.clone(),
            ids: Arc::clone(&ids),
            router: ShardRouter::new(layout),
            settings: config.receiver_settings(),
        });
    }

    let senders = SenderPool::new(sender_shards, store, topics, config.sender_settings());

    let readiness = Readiness::new();
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        let readiness = readiness.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown requested");
            readiness.set_ready(false);
            cancel.cancel();
        }
    });

    let addr = format!("0.0.0.0:{}", config.delay_health_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");
    let health = axum::serve(listener, build_router(readiness.clone()))
        .with_graceful_shutdown(cancel.clone().cancelled_owned());

    info!(
        %addr,
        delay_topic = %config.delay_topic,
        receivers = receivers.len(),
        senders = senders.len(),
        shards = layout.total(),
        "delay service started"
    );
    readiness.set_ready(!cancel.is_cancelled());

    tokio::join!(
        join_all(receivers.iter().map(|r| r.run(cancel.clone()))),
        senders.run(cancel.clone()),
        async {
            if let Err(e) = health.await {
                error!(error = %e, "health server failed");
            }
        },
    );
    info!("delay service stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
