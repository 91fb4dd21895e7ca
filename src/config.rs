use crate::error::{GarageError, Result};
use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_FILE_ENV: &str = "GARAGE_CONFIG_FILE";

/// Longest accepted calibration duration (about 49 days). Keeps every
/// `Instant + Duration` in the door core far from tick overflow.
const MAX_DURATION_MS: u64 = u32::MAX as u64;

const CONFIG_DIR: &str = "smart-garage-door";
const CONFIG_FILE: &str = "config.json";

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Split `.env` content into key/value pairs, skipping blanks and comments.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            if !key.is_empty() {
                pairs.push((key, value));
            }
        }
    }

    pairs
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub calibration: CalibrationConfig,
    pub mqtt: MqttConfig,
    pub topics: TopicConfig,
    pub relay: RelayConfig,
    pub simulation: SimulationConfig,
    pub runtime: RuntimeConfig,
}

/// Thresholds and timings of the door core. Fixed once the controller starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Readings below this distance mean the door is fully open.
    pub open_threshold_mm: u16,
    /// Readings above this distance mean the door is fully closed.
    pub closed_threshold_mm: u16,
    pub sample_period_ms: u64,
    /// Publish interval while moving or settling.
    pub moving_interval_ms: u64,
    /// Publish interval at rest.
    pub idle_interval_ms: u64,
    /// Grace window after observed motion or a relay pulse.
    pub settle_duration_ms: u64,
    pub pulse_duration_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            open_threshold_mm: 240,
            closed_threshold_mm: 2540,
            sample_period_ms: 1000,
            moving_interval_ms: 1000,
            idle_interval_ms: 5000,
            settle_duration_ms: 5000,
            pulse_duration_ms: 300,
        }
    }
}

impl CalibrationConfig {
    /// Check the startup invariants.
    pub fn validate(&self) -> Result<()> {
        if self.open_threshold_mm >= self.closed_threshold_mm {
            return Err(GarageError::InvalidThresholds {
                open_mm: self.open_threshold_mm,
                closed_mm: self.closed_threshold_mm,
            });
        }

        let durations = [
            ("sample_period_ms", self.sample_period_ms),
            ("moving_interval_ms", self.moving_interval_ms),
            ("idle_interval_ms", self.idle_interval_ms),
            ("pulse_duration_ms", self.pulse_duration_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(GarageError::ZeroDuration(name));
            }
        }

        let settle = ("settle_duration_ms", self.settle_duration_ms);
        for (name, value) in durations.into_iter().chain([settle]) {
            if value > MAX_DURATION_MS {
                return Err(GarageError::InvalidConfigValue {
                    key: format!("calibration.{name}"),
                    value: value.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn moving_interval(&self) -> Duration {
        Duration::from_millis(self.moving_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn settle_duration(&self) -> Duration {
        Duration::from_millis(self.settle_duration_ms)
    }

    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_duration_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Delay before the session task retries after a connection error.
    pub reconnect_delay_ms: u64,
    /// Keep the broker-side session across reconnects (clean session off).
    pub persistent_session: bool,
}

impl MqttConfig {
    /// The client id identifies the persistent session and must be usable as-is.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_id.starts_with(' ') {
            return Err(GarageError::InvalidConfigValue {
                key: "mqtt.client_id".to_string(),
                value: self.client_id.clone(),
            });
        }
        if self.broker_host.trim().is_empty() {
            return Err(GarageError::InvalidConfigValue {
                key: "mqtt.broker_host".to_string(),
                value: self.broker_host.clone(),
            });
        }
        Ok(())
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "192.168.178.2".to_string(),
            broker_port: 1883,
            client_id: "garage-door".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 15,
            reconnect_delay_ms: 1000,
            persistent_session: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Inbound door-command channel.
    pub command: String,
    /// Exact payload that fires the relay.
    pub command_payload: String,
    /// Outbound distance telemetry channel.
    pub distance: String,
    pub debug: String,
    pub announcement: String,
    pub last_will: String,
    pub last_will_payload: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            command: "garage_door/relay".to_string(),
            command_payload: "pulse".to_string(),
            distance: "garage_door/VL53L1X/distance_mm".to_string(),
            debug: "garage_door/debug".to_string(),
            announcement: "Garage door controller online".to_string(),
            last_will: "garage_door/lastwill".to_string(),
            last_will_payload: "I am going offline".to_string(),
        }
    }
}

/// Electrical level that closes the relay contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayPolarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

impl RelayPolarity {
    /// Pin level (true = high) for the requested relay state.
    pub fn level(self, active: bool) -> bool {
        match self {
            RelayPolarity::ActiveLow => !active,
            RelayPolarity::ActiveHigh => active,
        }
    }
}

impl FromStr for RelayPolarity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active-low" | "active_low" | "low" => Ok(RelayPolarity::ActiveLow),
            "active-high" | "active_high" | "high" => Ok(RelayPolarity::ActiveHigh),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub polarity: RelayPolarity,
}

/// Parameters of the simulated door used by the host backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub open_distance_mm: u16,
    pub closed_distance_mm: u16,
    /// Time for a full open or close run.
    pub travel_time_ms: u64,
    /// Peak uniform noise added to each reading.
    pub noise_mm: u16,
    pub starts_closed: bool,
    /// When false the simulated sensor fails to start.
    pub sensor_present: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            open_distance_mm: 120,
            closed_distance_mm: 2600,
            travel_time_ms: 12_000,
            noise_mm: 15,
            starts_closed: true,
            sensor_present: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Sleep between polling loop iterations.
    pub loop_idle_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { loop_idle_ms: 10 }
    }
}

impl Config {
    /// Build the effective configuration: defaults, then the JSON file (if any),
    /// then environment overrides. The result is validated.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with(file, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with environment lookups going through `lookup`.
    pub fn load_with<F>(file: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = file
            .map(Path::to_path_buf)
            .or_else(|| lookup(CONFIG_FILE_ENV).map(PathBuf::from))
            .or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => {
                log::info!("Loading configuration from {:?}", path);
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;
        self.mqtt.validate()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Defaults plus environment overrides, without a file and without validation.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `KEY=value` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cal = &mut self.calibration;
        override_parsed(&lookup, "GARAGE_OPEN_THRESHOLD_MM", &mut cal.open_threshold_mm)?;
        override_parsed(&lookup, "GARAGE_CLOSED_THRESHOLD_MM", &mut cal.closed_threshold_mm)?;
        override_parsed(&lookup, "GARAGE_SAMPLE_PERIOD_MS", &mut cal.sample_period_ms)?;
        override_parsed(&lookup, "GARAGE_MOVING_INTERVAL_MS", &mut cal.moving_interval_ms)?;
        override_parsed(&lookup, "GARAGE_IDLE_INTERVAL_MS", &mut cal.idle_interval_ms)?;
        override_parsed(&lookup, "GARAGE_SETTLE_DURATION_MS", &mut cal.settle_duration_ms)?;
        override_parsed(&lookup, "GARAGE_PULSE_DURATION_MS", &mut cal.pulse_duration_ms)?;
        override_parsed(&lookup, "GARAGE_RELAY_POLARITY", &mut self.relay.polarity)?;

        // MQTT configuration
        if let Some(host) = lookup("MQTT_BROKER_HOST") {
            self.mqtt.broker_host = host;
        }
        override_parsed(&lookup, "MQTT_BROKER_PORT", &mut self.mqtt.broker_port)?;
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(username) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        override_parsed(&lookup, "MQTT_KEEP_ALIVE_SECS", &mut self.mqtt.keep_alive_secs)?;
        override_parsed(&lookup, "MQTT_RECONNECT_DELAY_MS", &mut self.mqtt.reconnect_delay_ms)?;
        override_parsed(&lookup, "MQTT_PERSISTENT_SESSION", &mut self.mqtt.persistent_session)?;

        // Topics
        if let Some(topic) = lookup("GARAGE_COMMAND_TOPIC") {
            self.topics.command = topic;
        }
        if let Some(payload) = lookup("GARAGE_COMMAND_PAYLOAD") {
            self.topics.command_payload = payload;
        }
        if let Some(topic) = lookup("GARAGE_DISTANCE_TOPIC") {
            self.topics.distance = topic;
        }
        if let Some(topic) = lookup("GARAGE_DEBUG_TOPIC") {
            self.topics.debug = topic;
        }

        override_parsed(&lookup, "GARAGE_LOOP_IDLE_MS", &mut self.runtime.loop_idle_ms)?;
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| GarageError::InvalidConfigValue {
                key: key.to_string(),
                value: raw.clone(),
            })?;
    }
    Ok(())
}

/// `<config dir>/smart-garage-door/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
