//! The cooperative polling loop that runs the door.
//!
//! Each [`DoorController::tick`] services the transport, takes a distance
//! sample when the sample period has elapsed, and publishes the latest
//! reading when the scheduler's current interval has elapsed. Inbound relay
//! commands are handled inside the tick that drains them. All state lives in
//! the controller and is only touched from the loop.

use super::position::{DoorPosition, classify};
use super::relay::{RelayActuator, RelayPin};
use super::scheduler::PublishScheduler;
use crate::clock::Clock;
use crate::config::{CalibrationConfig, Config, TopicConfig};
use crate::display::{DisplaySink, StatusPresenter, StatusSnapshot};
use crate::sensors::{DistanceSample, DistanceSampler, RangingSensor};
use crate::transport::{InboundMessage, TransportBridge, TransportEvent};
use embassy_time::{Duration, Instant};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct DoorController<S, R, D, T, C>
where
    S: RangingSensor,
    R: RelayPin,
    D: DisplaySink,
    T: TransportBridge,
    C: Clock,
{
    calibration: CalibrationConfig,
    topics: TopicConfig,
    sampler: DistanceSampler<S, C>,
    relay: RelayActuator<R>,
    presenter: StatusPresenter<D>,
    transport: T,
    clock: C,
    scheduler: PublishScheduler,
    latest: Option<DistanceSample>,
    position: Option<DoorPosition>,
    last_sample_at: Option<Instant>,
    last_publish_at: Option<Instant>,
    last_command: Option<String>,
}

impl<S, R, D, T, C> DoorController<S, R, D, T, C>
where
    S: RangingSensor,
    R: RelayPin,
    D: DisplaySink,
    T: TransportBridge,
    C: Clock,
{
    /// Assemble the controller from started components.
    ///
    /// The scheduler's start-up settling window opens at construction time.
    pub fn new(
        config: &Config,
        sampler: DistanceSampler<S, C>,
        relay: RelayActuator<R>,
        presenter: StatusPresenter<D>,
        transport: T,
        clock: C,
    ) -> Self {
        let scheduler = PublishScheduler::new(&config.calibration, clock.now());
        Self {
            calibration: config.calibration.clone(),
            topics: config.topics.clone(),
            sampler,
            relay,
            presenter,
            transport,
            clock,
            scheduler,
            latest: None,
            position: None,
            last_sample_at: None,
            last_publish_at: None,
            last_command: None,
        }
    }

    /// Run ticks until `running` is cleared, sleeping `idle` between them.
    pub fn run(&mut self, running: &AtomicBool, idle: std::time::Duration) {
        info!("[Door] Polling loop started");
        while running.load(Ordering::SeqCst) {
            self.tick();
            std::thread::sleep(idle);
        }
        info!("[Door] Polling loop stopped");
    }

    /// One iteration of the polling loop.
    pub fn tick(&mut self) {
        for event in self.transport.service() {
            self.handle_transport_event(event);
        }

        let now = self.clock.now();
        if is_due(self.last_sample_at, now, self.calibration.sample_period()) {
            self.last_sample_at = Some(now);
            self.sample();
        }

        let now = self.clock.now();
        if is_due(self.last_publish_at, now, self.scheduler.current_interval()) {
            self.last_publish_at = Some(now);
            self.publish_latest();
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::SessionEstablished => self.on_session_established(),
            TransportEvent::SessionLost => {
                warn!("[Door] Broker session lost, telemetry paused");
                self.refresh_display();
            }
            TransportEvent::Message(message) => self.handle_message(message),
        }
    }

    fn on_session_established(&mut self) {
        info!("[Door] Connected, subscribing to {}", self.topics.command);
        if let Err(e) = self.transport.subscribe(&self.topics.command) {
            warn!("[Door] Failed to subscribe to {}: {}", self.topics.command, e);
        }
        if let Err(e) = self
            .transport
            .publish(&self.topics.debug, &self.topics.announcement)
        {
            warn!("[Door] Failed to publish announcement: {}", e);
        }
        self.refresh_display();
    }

    fn handle_message(&mut self, message: InboundMessage) {
        if message.topic != self.topics.command {
            debug!("[Door] Ignoring message on {}", message.topic);
            return;
        }
        if message.payload != self.topics.command_payload {
            debug!("[Door] Ignoring unknown command: {:?}", message.payload);
            return;
        }

        info!("[Door] Command received: {}", message.payload);
        self.last_command = Some(message.payload);
        self.actuate();
    }

    /// Pulse the relay, then open the settling window and update the screen.
    fn actuate(&mut self) {
        self.relay
            .trigger(&self.clock, self.calibration.pulse_duration());

        let now = self.clock.now();
        self.scheduler.on_actuation(now);
        debug!(
            "[Door] Settling until {} ms, publish interval {} ms",
            self.scheduler.settle_until().as_millis(),
            self.scheduler.current_interval().as_millis()
        );
        self.refresh_display();
    }

    fn sample(&mut self) {
        let sample = self.sampler.poll();
        let position = classify(sample.distance_mm, &self.calibration);

        if self.position != Some(position) {
            info!(
                "[Door] Position {} ({} mm)",
                position, sample.distance_mm
            );
        }

        let before = self.scheduler.mode();
        let after = self
            .scheduler
            .on_classification(sample.observed_at, position);
        if before != after {
            info!(
                "[Door] Publish mode {} -> {} (every {} ms)",
                before,
                after,
                self.scheduler.current_interval().as_millis()
            );
        }

        self.position = Some(position);
        self.latest = Some(sample);
        self.refresh_display();
    }

    fn publish_latest(&mut self) {
        // The sensor buffers continuously, so a fresh poll is the latest reading
        let sample = self.sampler.poll();
        self.latest = Some(sample);

        let payload = sample.distance_mm.to_string();
        match self.transport.publish(&self.topics.distance, &payload) {
            Ok(()) => debug!("[Door] Published {} mm", sample.distance_mm),
            Err(e) => debug!("[Door] Telemetry not published: {}", e),
        }
    }

    fn refresh_display(&mut self) {
        let status = StatusSnapshot {
            sample: self.latest,
            link_up: self.transport.is_link_up(),
            session_up: self.transport.is_session_up(),
            last_command: self.last_command.as_deref(),
        };
        self.presenter.present(&status);
    }

    pub fn scheduler(&self) -> &PublishScheduler {
        &self.scheduler
    }

    pub fn latest_sample(&self) -> Option<DistanceSample> {
        self.latest
    }

    pub fn position(&self) -> Option<DoorPosition> {
        self.position
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn relay(&self) -> &RelayActuator<R> {
        &self.relay
    }

    pub fn presenter(&self) -> &StatusPresenter<D> {
        &self.presenter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn is_due(last: Option<Instant>, now: Instant, period: Duration) -> bool {
    match last {
        None => true,
        Some(last) => now.as_ticks().saturating_sub(last.as_ticks()) >= period.as_ticks(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RelayPolarity;
    use crate::door::scheduler::PublishMode;
    use crate::sensors::SensorError;
    use crate::transport::TransportError;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU16;

    const MOVING: Duration = Duration::from_millis(1000);
    const IDLE: Duration = Duration::from_millis(5000);

    /// Sensor whose buffered range is set by the test.
    struct DialSensor {
        range: Arc<AtomicU16>,
    }

    impl RangingSensor for DialSensor {
        fn start_continuous(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn latest_range_mm(&mut self) -> u16 {
            self.range.load(Ordering::SeqCst)
        }
    }

    struct TracePin {
        clock: Arc<ManualClock>,
        trace: Vec<(u64, bool)>,
    }

    impl RelayPin for TracePin {
        fn set_level(&mut self, high: bool) {
            self.trace.push((self.clock.now().as_millis(), high));
        }
    }

    #[derive(Default)]
    struct FrameRecorder {
        frames: Vec<Vec<String>>,
    }

    impl DisplaySink for FrameRecorder {
        fn show(&mut self, lines: &[String]) {
            self.frames.push(lines.to_vec());
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        pending: Vec<TransportEvent>,
        published: Vec<(String, String)>,
        subscriptions: Vec<String>,
        session_up: bool,
    }

    impl FakeTransport {
        fn deliver(&mut self, topic: &str, payload: &str) {
            self.pending.push(TransportEvent::Message(InboundMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
            }));
        }

        fn telemetry(&self) -> Vec<&str> {
            self.published
                .iter()
                .filter(|(topic, _)| topic == "garage_door/VL53L1X/distance_mm")
                .map(|(_, payload)| payload.as_str())
                .collect()
        }
    }

    impl TransportBridge for FakeTransport {
        fn service(&mut self) -> Vec<TransportEvent> {
            std::mem::take(&mut self.pending)
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            self.subscriptions.push(topic.to_string());
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError> {
            if !self.session_up {
                return Err(TransportError::SessionDown);
            }
            self.published.push((topic.to_string(), payload.to_string()));
            Ok(())
        }

        fn is_link_up(&self) -> bool {
            self.session_up
        }

        fn is_session_up(&self) -> bool {
            self.session_up
        }
    }

    type TestController =
        DoorController<DialSensor, TracePin, FrameRecorder, FakeTransport, Arc<ManualClock>>;

    struct Harness {
        clock: Arc<ManualClock>,
        range: Arc<AtomicU16>,
        controller: TestController,
    }

    impl Harness {
        fn new(initial_mm: u16) -> Self {
            let mut config = Config::default();
            config.calibration = CalibrationConfig {
                open_threshold_mm: 240,
                closed_threshold_mm: 2540,
                sample_period_ms: 1000,
                moving_interval_ms: 1000,
                idle_interval_ms: 5000,
                settle_duration_ms: 5000,
                pulse_duration_ms: 300,
            };

            let clock = Arc::new(ManualClock::new(0));
            let range = Arc::new(AtomicU16::new(initial_mm));
            let sampler = DistanceSampler::start(
                DialSensor {
                    range: range.clone(),
                },
                clock.clone(),
            )
            .unwrap();
            let relay = RelayActuator::new(
                TracePin {
                    clock: clock.clone(),
                    trace: Vec::new(),
                },
                RelayPolarity::ActiveLow,
            );
            let presenter = StatusPresenter::new(FrameRecorder::default(), "door");
            let transport = FakeTransport {
                session_up: true,
                ..FakeTransport::default()
            };
            let controller =
                DoorController::new(&config, sampler, relay, presenter, transport, clock.clone());

            Self {
                clock,
                range,
                controller,
            }
        }

        fn set_range(&self, mm: u16) {
            self.range.store(mm, Ordering::SeqCst);
        }

        /// Jump to `ms` and run one tick there.
        fn tick_at(&mut self, ms: u64) {
            self.clock.set(Instant::from_millis(ms));
            self.controller.tick();
        }

        fn interval(&self) -> Duration {
            self.controller.scheduler().current_interval()
        }

        fn relay_trace(&self) -> &[(u64, bool)] {
            &self.controller.relay().pin().trace
        }
    }

    #[test]
    fn test_fully_open_falls_back_to_idle_after_settle_window() {
        let mut h = Harness::new(100);

        h.tick_at(0);
        assert_eq!(h.controller.position(), Some(DoorPosition::FullyOpen));
        assert_eq!(h.interval(), MOVING);

        for ms in (1000..=5000).step_by(1000) {
            h.tick_at(ms);
            assert_eq!(h.interval(), MOVING, "at {ms} ms");
        }

        h.tick_at(6000);
        assert_eq!(h.controller.position(), Some(DoorPosition::FullyOpen));
        assert_eq!(h.interval(), IDLE);
    }

    #[test]
    fn test_transit_reading_holds_fast_mode() {
        let mut h = Harness::new(2600);
        for ms in (0..=10_000).step_by(1000) {
            h.tick_at(ms);
        }
        assert_eq!(h.interval(), IDLE);

        h.set_range(2541);
        h.tick_at(11_000);
        assert_eq!(h.controller.position(), Some(DoorPosition::FullyClosed));
        assert_eq!(h.interval(), IDLE);

        h.set_range(1500);
        h.tick_at(12_000);
        assert_eq!(h.controller.position(), Some(DoorPosition::InTransit));
        assert_eq!(h.interval(), MOVING);

        h.set_range(2541);
        for ms in (13_000..=17_000).step_by(1000) {
            h.tick_at(ms);
            assert_eq!(h.controller.position(), Some(DoorPosition::FullyClosed));
            assert_eq!(h.interval(), MOVING, "at {ms} ms");
        }

        h.tick_at(18_000);
        assert_eq!(h.interval(), IDLE);
    }

    #[test]
    fn test_reading_on_closed_threshold_counts_as_transit() {
        let mut h = Harness::new(2600);
        for ms in (0..=10_000).step_by(1000) {
            h.tick_at(ms);
        }

        for (ms, mm) in [(11_000, 2540), (12_000, 1500), (13_000, 2540)] {
            h.set_range(mm);
            h.tick_at(ms);
            assert_eq!(h.controller.position(), Some(DoorPosition::InTransit));
            assert_eq!(h.interval(), MOVING);
        }
        assert_eq!(
            h.controller.scheduler().settle_until(),
            Instant::from_millis(18_000)
        );
    }

    #[test]
    fn test_pulse_command_fires_relay_and_opens_settle_window() {
        let mut h = Harness::new(2600);
        for ms in (0..=10_000).step_by(1000) {
            h.tick_at(ms);
        }
        assert_eq!(h.controller.scheduler().mode(), PublishMode::Slow);
        let sample_before = h.controller.latest_sample();

        h.controller
            .transport_mut()
            .deliver("garage_door/relay", "pulse");
        h.tick_at(10_100);

        // Relay held active for exactly the pulse duration, then released
        assert_eq!(
            h.relay_trace(),
            &[(0, true), (10_100, false), (10_400, true)]
        );
        assert_eq!(h.controller.relay().pulse_count(), 1);

        // Settling window opened from the end of the pulse, no new reading yet
        assert_eq!(
            h.controller.scheduler().settle_until(),
            Instant::from_millis(15_400)
        );
        assert_eq!(h.interval(), MOVING);
        assert_eq!(h.controller.latest_sample(), sample_before);
        assert_eq!(h.controller.last_command(), Some("pulse"));

        // Door still reads closed on the next tick, fast mode holds
        h.tick_at(11_000);
        assert_eq!(h.controller.position(), Some(DoorPosition::FullyClosed));
        assert_eq!(h.interval(), MOVING);
        h.tick_at(15_000);
        assert_eq!(h.interval(), MOVING);
        h.tick_at(16_000);
        assert_eq!(h.interval(), IDLE);
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let mut h = Harness::new(2600);
        for ms in (0..=10_000).step_by(1000) {
            h.tick_at(ms);
        }
        let settle_before = h.controller.scheduler().settle_until();
        let mode_before = h.controller.scheduler().mode();

        h.controller
            .transport_mut()
            .deliver("garage_door/relay", "open");
        h.tick_at(10_100);

        assert_eq!(h.relay_trace(), &[(0, true)]);
        assert_eq!(h.controller.relay().pulse_count(), 0);
        assert_eq!(h.controller.scheduler().settle_until(), settle_before);
        assert_eq!(h.controller.scheduler().mode(), mode_before);
        assert_eq!(h.controller.last_command(), None);
    }

    #[test]
    fn test_pulse_on_other_topic_is_ignored() {
        let mut h = Harness::new(2600);
        h.tick_at(0);

        h.controller
            .transport_mut()
            .deliver("garage_door/debug", "pulse");
        h.tick_at(100);

        assert_eq!(h.controller.relay().pulse_count(), 0);
    }

    #[test]
    fn test_session_established_subscribes_and_announces() {
        let mut h = Harness::new(2600);
        h.controller
            .transport_mut()
            .pending
            .push(TransportEvent::SessionEstablished);
        h.tick_at(0);

        let transport = h.controller.transport();
        assert_eq!(transport.subscriptions, vec!["garage_door/relay"]);
        assert_eq!(
            transport.published[0],
            (
                "garage_door/debug".to_string(),
                "Garage door controller online".to_string()
            )
        );
    }

    #[test]
    fn test_publish_cadence_follows_scheduler() {
        let mut h = Harness::new(2600);
        for ms in (0..=30_000).step_by(500) {
            h.tick_at(ms);
        }

        // Fast inside the start-up window (0..=5000), then every idle interval
        let telemetry = h.controller.transport().telemetry();
        assert_eq!(telemetry.len(), 6 + 5);
        assert!(telemetry.iter().all(|payload| *payload == "2600"));
    }

    #[test]
    fn test_publish_uses_latest_reading() {
        let mut h = Harness::new(2600);
        h.tick_at(0);
        h.set_range(1234);
        h.tick_at(1000);

        let telemetry = h.controller.transport().telemetry();
        assert_eq!(telemetry, vec!["2600", "1234"]);
    }

    #[test]
    fn test_no_publish_while_session_down() {
        let mut h = Harness::new(2600);
        h.controller.transport_mut().session_up = false;
        for ms in (0..=3000).step_by(1000) {
            h.tick_at(ms);
        }
        assert!(h.controller.transport().published.is_empty());
        assert_eq!(h.controller.position(), Some(DoorPosition::FullyClosed));
    }

    #[test]
    fn test_display_shows_reading_flags_and_command() {
        let mut h = Harness::new(2600);
        h.tick_at(0);
        h.controller
            .transport_mut()
            .deliver("garage_door/relay", "pulse");
        h.tick_at(100);

        let frames = &h.controller.presenter().sink().frames;
        let last = frames.last().unwrap();
        assert_eq!(last[1], "2600 mm");
        assert_eq!(last[2], "Wifi: 1");
        assert_eq!(last[3], "MQTT: 1");
        assert_eq!(last[4], "Cmd: pulse");
    }

    #[test]
    fn test_is_due() {
        let period = Duration::from_millis(1000);
        assert!(is_due(None, Instant::from_millis(0), period));
        assert!(!is_due(
            Some(Instant::from_millis(0)),
            Instant::from_millis(999),
            period
        ));
        assert!(is_due(
            Some(Instant::from_millis(0)),
            Instant::from_millis(1000),
            period
        ));
    }
}
