use clap::Parser;
use log::{error, info};
use smart_garage_door::clock::{Clock, SystemClock};
use smart_garage_door::config::{self, Config};
use smart_garage_door::display::{LogDisplay, StatusPresenter};
use smart_garage_door::door::{DoorController, RelayActuator};
use smart_garage_door::error::{GarageError, Result};
use smart_garage_door::instance_lock::InstanceLock;
use smart_garage_door::sensors::{DistanceSampler, SensorError};
use smart_garage_door::simulation::{SimulatedDoor, SimulatedRangingSensor, SimulatedRelay};
use smart_garage_door::transport::MqttBridge;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;

#[derive(Parser)]
#[command(name = "smart-garage-door")]
#[command(about = "Garage door controller: distance telemetry and relay commands over MQTT")]
struct Cli {
    /// JSON configuration file (defaults, then this file, then environment)
    #[arg(long, env = config::CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Stop for good: the sensor cannot be trusted, so no further I/O happens.
fn halt(err: SensorError) -> ! {
    error!("{}", GarageError::SensorInitFailed(err));
    error!("Halting");
    loop {
        std::thread::park();
    }
}

#[tokio::main]
async fn main() {
    // Load .env file before anything else
    config::load_dotenv();
    init_logger();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => {}
        Err(GarageError::SensorInitFailed(e)) => halt(e),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting Smart Garage Door");
    info!(
        "  Thresholds: open < {} mm, closed > {} mm",
        config.calibration.open_threshold_mm, config.calibration.closed_threshold_mm
    );
    info!(
        "  Publish: every {} ms moving, {} ms idle, settle {} ms",
        config.calibration.moving_interval_ms,
        config.calibration.idle_interval_ms,
        config.calibration.settle_duration_ms
    );
    info!(
        "  Broker: {}:{}",
        config.mqtt.broker_host, config.mqtt.broker_port
    );

    let _lock = InstanceLock::acquire()?;

    let clock = SystemClock;
    let door = Arc::new(SimulatedDoor::new(&config.simulation, clock.now()));

    let sensor = SimulatedRangingSensor::new(door.clone(), clock, &config.simulation);
    let sampler = DistanceSampler::start(sensor, clock)?;

    let relay = RelayActuator::new(
        SimulatedRelay::new(door, clock, config.relay.polarity),
        config.relay.polarity,
    );
    let presenter = StatusPresenter::new(LogDisplay::default(), config.topics.distance.clone());
    let transport = MqttBridge::connect(&config.mqtt, &config.topics);

    let mut controller =
        DoorController::new(&config, sampler, relay, presenter, transport, clock);

    // The polling loop blocks during relay pulses, so it gets its own thread
    let running = Arc::new(AtomicBool::new(true));
    let loop_running = running.clone();
    let idle = Duration::from_millis(config.runtime.loop_idle_ms);
    let door_loop = std::thread::Builder::new()
        .name("door-loop".into())
        .spawn(move || controller.run(&loop_running, idle))?;

    info!("Smart Garage Door is running");
    info!("  - Press Ctrl+C to exit");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    running.store(false, Ordering::SeqCst);
    match tokio::task::spawn_blocking(move || door_loop.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Door loop panicked"),
        Err(e) => error!("Failed to join door loop: {}", e),
    }

    info!("Smart Garage Door stopped");
    Ok(())
}
