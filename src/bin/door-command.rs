//! Operator tool for a running garage door controller.
//!
//! Usage:
//!   door-command pulse            # send the configured trigger payload
//!   door-command send <payload>   # send an arbitrary payload to the command topic
//!   door-command watch            # log distance telemetry and debug messages
//!
//! Broker and topic settings are resolved exactly like the controller's:
//! defaults, then the JSON config file, then environment variables
//! (`MQTT_BROKER_HOST`, `GARAGE_COMMAND_TOPIC`, ...).

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use smart_garage_door::config::{self, Config};
use smart_garage_door::error::{GarageError, Result};
use smart_garage_door::transport::TransportError;
use std::path::PathBuf;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "door-command")]
#[command(about = "Send commands to and watch a smart garage door controller")]
struct Cli {
    /// JSON configuration file shared with the controller
    #[arg(long, env = config::CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Fire the relay once
    Pulse,
    /// Publish a raw payload on the command topic
    Send {
        payload: String,
    },
    /// Follow telemetry until Ctrl+C
    Watch,
}

fn client_for(config: &Config) -> (AsyncClient, EventLoop) {
    let client_id = format!("door-command-{}", uuid::Uuid::new_v4().simple());
    let mut options = MqttOptions::new(
        client_id,
        config.mqtt.broker_host.clone(),
        config.mqtt.broker_port,
    );
    options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs.max(1)));
    if let (Some(user), Some(pass)) = (&config.mqtt.username, &config.mqtt.password) {
        options.set_credentials(user, pass);
    }
    AsyncClient::new(options, 10)
}

/// Poll the event loop until an outgoing packet matching `done` has been written.
async fn flush_until(event_loop: &mut EventLoop, done: fn(&Outgoing) -> bool) -> Result<()> {
    let flushed = tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Outgoing(outgoing)) if done(&outgoing) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(TransportError::from(e)),
            }
        }
    })
    .await
    .map_err(|_| {
        GarageError::IoError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out waiting for the broker",
        ))
    })?;
    Ok(flushed?)
}

/// Publish `payload`, wait until it is on the wire, then disconnect cleanly.
async fn send(config: &Config, payload: String) -> Result<()> {
    let (client, mut event_loop) = client_for(config);
    client
        .publish(&config.topics.command, QoS::AtMostOnce, false, payload)
        .await
        .map_err(TransportError::from)?;
    flush_until(&mut event_loop, |out: &Outgoing| matches!(out, Outgoing::Publish(_))).await?;

    client.disconnect().await.map_err(TransportError::from)?;
    flush_until(&mut event_loop, |out: &Outgoing| matches!(out, Outgoing::Disconnect)).await
}

async fn watch(config: &Config) {
    let (client, mut event_loop) = client_for(config);
    for topic in [
        &config.topics.distance,
        &config.topics.debug,
        &config.topics.last_will,
    ] {
        if let Err(e) = client.subscribe(topic.as_str(), QoS::AtMostOnce).await {
            warn!("Failed to subscribe to {}: {}", topic, e);
        }
    }

    info!("Watching... Press Ctrl+C to exit.");
    loop {
        tokio::select! {
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    info!(
                        "{} = {}",
                        publish.topic,
                        String::from_utf8_lossy(&publish.payload)
                    );
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to {}:{}", config.mqtt.broker_host, config.mqtt.broker_port);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection error: {}", e);
                    tokio::time::sleep(Duration::from_millis(config.mqtt.reconnect_delay_ms)).await;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file before anything else
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let payload = match cli.command {
        Command::Pulse => config.topics.command_payload.clone(),
        Command::Send { payload } => payload,
        Command::Watch => {
            watch(&config).await;
            return;
        }
    };

    info!("Sending {:?} to {}", payload, config.topics.command);
    match send(&config, payload).await {
        Ok(()) => info!("Sent"),
        Err(e) => {
            error!("Failed to send command: {}", e);
            std::process::exit(1);
        }
    }
}
