//! Demo for SignalHub
//!
//! Starts a broker and a home thread, wires a couple of subscribers and
//! publishes a few events both synchronously and asynchronously.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use signalhub::broker::{Affinity, BroadcastMessage, Broker, Sender, SubscribeOptions, UserData};
use signalhub::config::{load_config, load_config_from};
use signalhub::executor::HomeQueue;
use signalhub::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "signalhub")]
struct Args {
    /// Base path of the config file (extension optional)
    #[arg(long)]
    config: Option<String>,
    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

struct Door {
    name: &'static str,
}

fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let settings = match args.config.as_deref() {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return;
        }
    };
    logging::init(args.log_level.as_deref().unwrap_or(&settings.logging.level));

    if let Err(e) = run(&settings) {
        error!("Demo failed: {}", e);
    }
}

fn run(settings: &signalhub::config::Settings) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Broker::with_settings(&settings.broker)?;
    let (home, home_thread) = HomeQueue::spawn("home", settings.broker.home_queue_capacity)?;
    broker.set_home_context(Some(Arc::new(home)));

    let door = Arc::new(Door { name: "front" });
    broker.subscribe_with(
        &door,
        "door",
        SubscribeOptions::new()
            .filter(|data: &UserData| data.get("state") == Some(&json!("opening"))),
        |publication, _| {
            let current = thread::current();
            info!(thread = ?current.name(), data = ?publication.data(), "door is opening");
        },
    )?;

    let status = broker.subscribe_to_with(
        SubscribeOptions::new().affinity(Affinity::Anywhere),
        |msg: &BroadcastMessage<String>, _| {
            let current = thread::current();
            info!(thread = ?current.name(), content = %msg.content, "status");
        },
    )?;

    for state in ["closed", "opening"] {
        let mut data = UserData::new();
        data.insert("state".to_string(), json!(state));
        let report = broker.publish(Some(door.clone() as Sender), "door", Some(data))?;
        info!(
            door = door.name,
            state,
            dispatched = report.dispatched,
            filtered = report.filtered,
            "published"
        );
    }

    broker.send_async(None, BroadcastMessage::new("all quiet".to_string()));
    thread::sleep(Duration::from_millis(100));

    status.unsubscribe();
    drop(door);
    info!(purged = broker.purge(), topics = broker.topic_count(), "cleaned up");

    broker.set_home_context(None);
    if home_thread.join().is_err() {
        error!("home thread panicked");
    }
    Ok(())
}
