use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_relay::classifier::HookParser;
use tracker_relay::classifier::tracker::JiraParser;
use tracker_relay::config::Config;
use tracker_relay::executor::{AlwaysExistsTracker, LoggingExecutor};
use tracker_relay::fsm::Coordinator;
use tracker_relay::queue::QueueHandler;
use tracker_relay::server::{AppState, build_router};
use tracker_relay::store::{KeySpace, RedisStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracker_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let store = match RedisStore::connect(&config.redis_url).await {
        Ok(store) => store,
        Err(error) => {
            error!(%error, url = %config.redis_url, "could not connect to the store");
            std::process::exit(1);
        }
    };

    let keys = KeySpace::new(&config.key_prefix);
    let queue = QueueHandler::new(store.clone(), keys.clone(), config.record_ttl_secs);
    let parser = HookParser::new(
        store.clone(),
        keys,
        queue.clone(),
        JiraParser::new(),
        config.classifier_settings(),
    );

    let cancel = CancellationToken::new();
    let (coordinator, wake) = Coordinator::new(
        queue,
        LoggingExecutor,
        AlwaysExistsTracker,
        cancel.clone(),
    );
    let coordinator_task = tokio::spawn(coordinator.run());

    let secret = config.webhook_secret.as_deref().map(|s| s.as_bytes().to_vec());
    if secret.is_none() {
        info!("no webhook secret configured; signature verification disabled");
    }
    let app = build_router(AppState::new(parser, wake, secret));

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, addr = %config.listen_addr, "could not bind listen address");
            std::process::exit(1);
        }
    };
    info!("listening on {}", config.listen_addr);

    let shutdown = cancel.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "could not listen for the shutdown signal");
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });

    if let Err(error) = serve.await {
        error!(%error, "server error");
    }

    // The coordinator finishes its in-flight cycle before stopping
    cancel.cancel();
    if let Err(error) = coordinator_task.await {
        error!(%error, "coordinator task failed");
    }
    info!("stopped");
}
