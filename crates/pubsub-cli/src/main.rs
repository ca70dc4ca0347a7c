//! Runs a publisher and a subscriber against an in-process broker and registry.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use swim_broker::ConnectionSettings;
use swim_broker_memory::{MemoryBroker, MemoryConnector};
use swim_pubsub::{
    AppConfig, AppError, ClientError, ConfigError, PubApp, PublisherBrokerHandler, SubApp,
    SubscriberBrokerHandler, consumer_fn,
};
use swim_registry_memory::{MemoryRegistry, RegistryEvent};
use swim_topics::{Pipeline, Topic, ValidationError};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// App error
    #[error(transparent)]
    App(#[from] AppError),

    /// Client error
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid log filter
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    /// Invalid topic
    #[error(transparent)]
    Topic(#[from] ValidationError),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Broker host, ignored when a config file is given
    #[arg(long, default_value = "localhost:5672", env = "SWIM_BROKER_HOST")]
    broker_host: String,

    /// YAML configuration file
    #[arg(long, env = "SWIM_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between two publications
    #[arg(long, default_value_t = 5, env = "SWIM_PUBLISH_INTERVAL_SECS")]
    interval_secs: u64,

    /// Topic to publish and subscribe to
    #[arg(long, default_value = "arrivals.brussels", env = "SWIM_TOPIC")]
    topic: String,
}

/// Declares queues on the broker as the registry issues them, the way a
/// Subscription Manager provisions a real broker.
fn provision_queues(broker: &MemoryBroker, registry: &MemoryRegistry) {
    let broker = broker.clone();
    registry.observe(move |event| match event {
        RegistryEvent::SubscriptionCreated {
            topic,
            subscription,
        } => broker.bind_queue(&subscription.queue, &topic.name),
        RegistryEvent::SubscriptionDeleted { subscription } => {
            broker.delete_queue(&subscription.queue);
        }
        RegistryEvent::SubscriptionUpdated { subscription } => {
            let _ = broker.set_queue_active(&subscription.queue, subscription.active);
        }
    });
}

fn clock_topic(id: &str) -> Result<Topic, ValidationError> {
    let sequence = Arc::new(AtomicU64::new(0));
    let pipeline = Pipeline::new()
        .then("clock", move |_| {
            Ok(json!({
                "sequence": sequence.fetch_add(1, Ordering::SeqCst),
                "time": chrono::Utc::now().to_rfc3339(),
            }))
        })
        .with_step_timeout(Duration::from_secs(1));

    Topic::new(id, pipeline)
}

fn init_tracing(config: Option<&AppConfig>) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = config
                .and_then(|config| config.logging.filter.as_deref())
                .unwrap_or("info");
            EnvFilter::try_new(directive)?
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    let config = args.config.as_ref().map(AppConfig::load).transpose()?;

    init_tracing(config.as_ref())?;

    let settings = config.as_ref().map_or_else(
        || ConnectionSettings::plain(&args.broker_host),
        AppConfig::connection_settings,
    );

    let broker = MemoryBroker::new();
    let registry = MemoryRegistry::new();
    provision_queues(&broker, &registry);

    let pub_app: PubApp<_, MemoryRegistry> = PubApp::new(PublisherBrokerHandler::new(
        MemoryConnector::new(broker.clone(), settings.clone()),
    ));
    let publisher = pub_app.register_publisher(registry.clone()).await?;
    publisher
        .register_topic(clock_topic(&args.topic)?.every(Duration::from_secs(args.interval_secs))?)
        .await?;

    let syncing = publisher.clone();
    pub_app
        .app()
        .before_run(move || async move { syncing.sync_sm_topics().await });

    let sub_app: SubApp<_, MemoryRegistry> = SubApp::new(SubscriberBrokerHandler::new(
        MemoryConnector::new(broker, settings),
    ));
    sub_app.app().run_threaded().await?;

    let subscriber = sub_app.register_subscriber(registry).await?;
    let queue = subscriber
        .subscribe(
            &args.topic,
            consumer_fn(|message| {
                info!("Received {}", message);
                Ok(())
            }),
        )
        .await?;
    info!("Consuming {} from queue {}", args.topic, queue);

    pub_app.app().run_threaded().await?;

    // Create shared shutdown token
    let shutdown_token = CancellationToken::new();

    // Set up signal handlers
    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        if cfg!(unix) {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler failed");
            let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler failed");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        } else {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt signal");
        }

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    shutdown_token.cancelled().await;

    subscriber.unsubscribe(&args.topic).await?;
    pub_app.app().shutdown().await?;
    sub_app.app().shutdown().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    #[test]
    #[serial]
    fn test_args_defaults() {
        let args = Args::parse_from(["swim-pubsub-local"]);

        assert_eq!(args.broker_host, "localhost:5672");
        assert_eq!(args.interval_secs, 5);
        assert_eq!(args.topic, "arrivals.brussels");
        assert!(args.config.is_none());
    }

    #[test]
    #[serial]
    fn test_args_from_env() {
        // SAFETY: serialized with every other test reading the environment.
        unsafe {
            std::env::set_var("SWIM_TOPIC", "departures.*");
            std::env::set_var("SWIM_PUBLISH_INTERVAL_SECS", "1");
        }

        let args = Args::parse_from(["swim-pubsub-local"]);

        unsafe {
            std::env::remove_var("SWIM_TOPIC");
            std::env::remove_var("SWIM_PUBLISH_INTERVAL_SECS");
        }

        assert_eq!(args.topic, "departures.*");
        assert_eq!(args.interval_secs, 1);
    }

    #[test]
    fn test_clock_topic_rejects_wildcards() {
        assert!(clock_topic("departures.*").is_err());
        assert!(clock_topic("departures.brussels").is_ok());
    }
}
