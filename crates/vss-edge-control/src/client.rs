//! The message-bus client: connect (mTLS when configured), subscribe to
//! the control topic, publish heartbeats, handle commands.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use tokio::sync::watch;
use tokio::task;
use tracing::{error, info, warn};

use vss_edge_core::EdgeConfig;
use vss_edge_store::Store;

use crate::error::ControlError;
use crate::handlers::ClipDispatcher;
use crate::heartbeat::{build_heartbeat, HEARTBEAT_INTERVAL_SECS};
use crate::messages::{control_topic, event_topic, heartbeat_topic, ControlMessage, EventSummary};

/// Delay before re-polling the event loop after a connection error;
/// rumqttc reconnects on the next poll.
const RECONNECT_DELAY_SECS: u64 = 5;

pub struct ControlPlaneClient {
    config: Arc<EdgeConfig>,
    store: Store,
    dispatcher: ClipDispatcher,
}

impl ControlPlaneClient {
    pub fn new(config: Arc<EdgeConfig>, store: Store) -> Self {
        let dispatcher = ClipDispatcher::new(config.services.ingest);
        Self {
            config,
            store,
            dispatcher,
        }
    }

    /// Override where clip requests are dispatched (tests).
    pub fn dispatcher(mut self, dispatcher: ClipDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    fn mqtt_options(&self) -> Result<MqttOptions, ControlError> {
        let network = &self.config.network;
        let mut options = MqttOptions::new(
            self.config.device.device_id.clone(),
            network.mqtt_broker.clone(),
            network.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(60));

        if network.mqtt_tls {
            let read = |path: &std::path::Path| {
                std::fs::read(path).map_err(|e| ControlError::Certificates {
                    message: format!("{}: {e}", path.display()),
                })
            };
            let ca = read(&network.cert_paths.ca_cert)?;
            let client_cert = read(&network.cert_paths.client_cert)?;
            let client_key = read(&network.cert_paths.client_key)?;
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: Some((client_cert, client_key)),
            }));
            info!("message bus configured with mTLS");
        }

        Ok(options)
    }

    /// Connect and serve until shutdown: the network loop on this task,
    /// heartbeats on a sibling task publishing through the shared handle.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), ControlError> {
        let options = self.mqtt_options()?;
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        let heartbeat_handle = tokio::spawn(Self::heartbeat_loop(
            self.config.clone(),
            self.store.clone(),
            client.clone(),
            shutdown.clone(),
        ));

        let control = control_topic(&self.config.device.device_id);
        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to message bus");
                        if let Err(e) = client.subscribe(&control, QoS::AtLeastOnce).await {
                            error!("failed to subscribe to control topic: {e}");
                        } else {
                            info!(topic = %control, "subscribed to control topic");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if publish.topic == control {
                            self.handle_control_payload(&client, &publish.payload).await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("message bus connection error: {e}; reconnecting");
                        tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                    }
                },
                _ = shutdown.changed() => {
                    info!("control-plane client stopping");
                    let _ = client.disconnect().await;
                    heartbeat_handle.abort();
                    return Ok(());
                }
            }
        }
    }

    async fn heartbeat_loop(
        config: Arc<EdgeConfig>,
        store: Store,
        client: AsyncClient,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let topic = heartbeat_topic(&config.device.device_id);
        let mut ticker =
            tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let heartbeat = build_heartbeat(&config);
                    match serde_json::to_vec(&heartbeat) {
                        Ok(payload) => {
                            if let Err(e) = client
                                .publish(&topic, QoS::AtLeastOnce, false, payload)
                                .await
                            {
                                warn!("heartbeat publish failed: {e}");
                            }
                        }
                        Err(e) => warn!("heartbeat serialization failed: {e}"),
                    }

                    let store = store.clone();
                    let device_id = config.device.device_id.clone();
                    if let Ok(Err(e)) =
                        task::spawn_blocking(move || store.record_heartbeat(&device_id)).await
                    {
                        warn!("failed to record heartbeat in store: {e}");
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Decode and act on one control-topic message. Bad payloads are
    /// logged and dropped, never fatal.
    async fn handle_control_payload(&self, client: &AsyncClient, payload: &[u8]) {
        let message: ControlMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                error!("non-JSON or malformed control message: {e}");
                return;
            }
        };

        match message {
            ControlMessage::RequestClip {
                camera_id,
                from,
                to,
                request_id,
            } => {
                info!(%camera_id, %request_id, "clip requested over control topic");
                match self
                    .dispatcher
                    .dispatch(&camera_id, from, to, &request_id)
                    .await
                {
                    Ok(outcome) => {
                        info!(
                            %camera_id,
                            %request_id,
                            event_id = %outcome.event_id,
                            "clip request fulfilled"
                        );
                        self.publish_summary(client, &camera_id, &request_id, &outcome.event_id)
                            .await;
                    }
                    Err(e) => {
                        error!(%camera_id, %request_id, "clip request failed: {e}");
                    }
                }
            }
            ControlMessage::Unknown => {
                warn!("unknown control action received, ignoring");
            }
        }
    }

    async fn publish_summary(
        &self,
        client: &AsyncClient,
        camera_id: &str,
        request_id: &str,
        event_id: &str,
    ) {
        let topic = event_topic(
            &self.config.network.mqtt_topic_prefix,
            &self.config.device.tenant_id,
            camera_id,
        );
        let summary = EventSummary {
            event_id: event_id.to_string(),
            camera_id: camera_id.to_string(),
            event_type: "clip_extracted".to_string(),
            request_id: Some(request_id.to_string()),
        };
        match serde_json::to_vec(&summary) {
            Ok(payload) => {
                if let Err(e) = client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
                    warn!(%topic, "event summary publish failed: {e}");
                }
            }
            Err(e) => warn!("event summary serialization failed: {e}"),
        }
    }
}
