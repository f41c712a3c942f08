//! CLI for websub-hub
//!
//! Subcommands:
//! - `demo`: run an in-process subscribe/publish round trip
//! - `config`: print the effective configuration as JSON

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use url::Url;

use websub_hub::broker::LocalBroker;
use websub_hub::config::{Settings, load_config};
use websub_hub::dispatch::{NotificationMessage, SubscriberService, WebhookListener};
use websub_hub::hub::{Hub, SubscriptionRequest, VerificationOutcome};
use websub_hub::transport::{Content, LoopbackClient};
use websub_hub::utils::error::HandlerError;
use websub_hub::utils::logging;

#[derive(Parser)]
#[command(name = "websub-hub")]
enum Command {
    /// Subscribe an in-process listener, publish one message and wait for its delivery
    Demo {
        /// Topic to register and publish to
        #[arg(long, default_value = "https://example.com/topics/news")]
        topic: String,
        /// Text content to publish
        #[arg(long, default_value = "Hello from websub-hub")]
        message: String,
        /// Callback URL the in-process listener is mounted at
        #[arg(long, default_value = "http://127.0.0.1:9292/callback")]
        callback: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    match run(Command::parse(), &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Demo {
            topic,
            message,
            callback,
        } => {
            if let Err(e) = run_demo(settings, &topic, &message, &callback).await {
                return Err(format!("Demo failed: {e}").into());
            }
        }
        Command::Config => {
            if let Err(e) = print_config(settings) {
                return Err(format!("Failed to print configuration: {e}").into());
            }
        }
    }
    Ok(())
}

async fn run_demo(
    settings: &Settings,
    topic: &str,
    message: &str,
    callback: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = SubscriberService::builder()
        .topic(topic)
        .on_notification(move |notification: NotificationMessage| {
            let tx = tx.clone();
            async move {
                tx.send(notification).ok();
                Ok::<(), HandlerError>(())
            }
        })
        .build()?;

    let mut listener = WebhookListener::with_handler_timeout(settings.handler_timeout());
    listener.attach(Url::parse(callback)?.path(), service)?;
    let client = Arc::new(LoopbackClient::new());
    client.mount(callback, Arc::new(listener))?;

    let broker = Arc::new(LocalBroker::from_settings(&settings.broker)?);
    let hub = Arc::new(Hub::with_options(broker, client, settings.hub_options()));
    let handle = hub.start(settings.hub_config()).await?;
    let reaper = hub.start_lease_reaper(settings.lease_check_interval());

    hub.register_topic(topic).await?;
    let ticket = hub
        .handle_subscription_request(SubscriptionRequest::subscribe(topic, callback))
        .await?;
    if let VerificationOutcome::Rejected { reason } = ticket.outcome().await {
        return Err(format!("subscription was not verified: {reason}").into());
    }
    info!(topic = %topic, callback = %callback, "Subscriber verified");

    hub.publish(topic, Content::text(message)).await?;
    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(notification)) => info!(
            topic = %topic,
            content_type = %notification.content_type,
            "Delivery received: {:?}",
            notification.content
        ),
        _ => warn!(topic = %topic, "No delivery received"),
    }

    hub.stop(&handle).await?;
    reaper.abort();
    Ok(())
}

fn print_config(settings: &Settings) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
