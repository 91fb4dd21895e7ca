//! MQTT implementation of the transport bridge.
//!
//! The rumqttc event loop runs as a tokio task. It tracks link and session
//! state in shared flags and forwards session changes and inbound publishes
//! into a bounded inbox. The polling loop drains the inbox without blocking
//! and publishes through the client's non-blocking request queue.

use super::{InboundMessage, TransportBridge, TransportError, TransportEvent};
use crate::config::{MqttConfig, TopicConfig};
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the inbound event queue between the session task and the loop.
const INBOX_CAPACITY: usize = 64;

/// Capacity of rumqttc's outgoing request queue.
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct LinkStatus {
    link_up: AtomicBool,
    session_up: AtomicBool,
}

/// Transport bridge backed by an MQTT broker session.
pub struct MqttBridge {
    client: AsyncClient,
    inbox: mpsc::Receiver<TransportEvent>,
    status: Arc<LinkStatus>,
    session_task: JoinHandle<()>,
}

impl MqttBridge {
    /// Create the client and spawn its session task.
    ///
    /// Must be called from within a tokio runtime. Connection happens in the
    /// background; the bridge reports [`TransportEvent::SessionEstablished`]
    /// once the broker accepts the session.
    pub fn connect(config: &MqttConfig, topics: &TopicConfig) -> Self {
        let options = mqtt_options(config, topics);
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let status = Arc::new(LinkStatus::default());

        info!(
            "[MQTT] Connecting to {}:{} as {}",
            config.broker_host, config.broker_port, config.client_id
        );

        let session_task = tokio::spawn(run_session(
            event_loop,
            tx,
            status.clone(),
            Duration::from_millis(config.reconnect_delay_ms),
        ));

        Self {
            client,
            inbox,
            status,
            session_task,
        }
    }
}

impl Drop for MqttBridge {
    fn drop(&mut self) {
        self.session_task.abort();
    }
}

impl TransportBridge for MqttBridge {
    fn service(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        // Bounded drain keeps one service call short even under a burst
        while events.len() < INBOX_CAPACITY {
            match self.inbox.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        info!("[MQTT] Subscribing to topic: {}", topic);
        self.client.try_subscribe(topic, QoS::AtMostOnce)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError> {
        if !self.is_session_up() {
            return Err(TransportError::SessionDown);
        }
        debug!("[MQTT] Publishing to {}: {}", topic, payload);
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes())?;
        Ok(())
    }

    fn is_link_up(&self) -> bool {
        self.status.link_up.load(Ordering::SeqCst)
    }

    fn is_session_up(&self) -> bool {
        self.status.session_up.load(Ordering::SeqCst)
    }
}

fn mqtt_options(config: &MqttConfig, topics: &TopicConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(1)));
    options.set_clean_session(!config.persistent_session);
    options.set_last_will(LastWill::new(
        topics.last_will.clone(),
        topics.last_will_payload.clone(),
        QoS::AtMostOnce,
        false,
    ));

    // Set credentials if provided
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    options
}

/// Drive the rumqttc event loop until the bridge is dropped.
async fn run_session(
    mut event_loop: EventLoop,
    tx: mpsc::Sender<TransportEvent>,
    status: Arc<LinkStatus>,
    reconnect_delay: Duration,
) {
    info!("[MQTT] Starting event loop");

    loop {
        let event = match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                status.link_up.store(true, Ordering::SeqCst);
                status.session_up.store(true, Ordering::SeqCst);
                info!(
                    "[MQTT] Session established (session present: {})",
                    ack.session_present
                );
                Some(TransportEvent::SessionEstablished)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                decode_publish(&publish.topic, &publish.payload).map(TransportEvent::Message)
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("[MQTT] Broker closed the session");
                session_lost(&status)
            }
            Ok(_) => None,
            Err(e) => {
                error!("[MQTT] Connection error: {:?}", e);
                if is_link_failure(&e) {
                    status.link_up.store(false, Ordering::SeqCst);
                }
                let lost = session_lost(&status);
                if lost.is_some() && tx.send(TransportEvent::SessionLost).await.is_err() {
                    break;
                }
                // Wait before reconnecting
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };

        if let Some(event) = event
            && tx.send(event).await.is_err()
        {
            debug!("[MQTT] Inbox closed, stopping event loop");
            break;
        }
    }
}

/// Mark the session down. Yields an event only on the up-to-down edge.
fn session_lost(status: &LinkStatus) -> Option<TransportEvent> {
    status
        .session_up
        .swap(false, Ordering::SeqCst)
        .then_some(TransportEvent::SessionLost)
}

fn decode_publish(topic: &str, payload: &[u8]) -> Option<InboundMessage> {
    match std::str::from_utf8(payload) {
        Ok(text) => {
            debug!("[MQTT] Received message on {}: {}", topic, text);
            Some(InboundMessage {
                topic: topic.to_string(),
                payload: text.to_string(),
            })
        }
        Err(e) => {
            warn!("[MQTT] Invalid UTF-8 in payload on {}: {}", topic, e);
            None
        }
    }
}

/// Errors that mean the network path itself is gone, not just the session.
fn is_link_failure(error: &ConnectionError) -> bool {
    matches!(
        error,
        ConnectionError::Io(_) | ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout
    )
}
