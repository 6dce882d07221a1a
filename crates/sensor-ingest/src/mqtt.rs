// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT transport adapter.
//!
//! Drives a `rumqttc` event loop and feeds every publish into an
//! [`IngressNormalizer`]. Reconnection is left to `rumqttc`: after an error
//! the loop waits `reconnect_delay_ms` and polls again, and every `ConnAck`
//! re-subscribes to the configured topic.

use crate::config::MqttConfig;
use crate::normalizer::IngressNormalizer;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::future::Future;

/// Requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 100;

/// Map a numeric QoS level onto `rumqttc`'s enum. Values above 2 clamp.
pub fn qos_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Build connection options from configuration.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);
    options
}

/// One MQTT session bound to a normalizer.
pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    config: MqttConfig,
    normalizer: IngressNormalizer,
}

impl MqttSubscriber {
    /// Create the client; no connection is made until [`run`](Self::run).
    pub fn new(config: MqttConfig, normalizer: IngressNormalizer) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(&config), REQUEST_CAPACITY);
        Self {
            client,
            eventloop,
            config,
            normalizer,
        }
    }

    /// Poll the broker until `shutdown` resolves, then disconnect.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.topic,
            "starting MQTT subscriber"
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received, leaving MQTT session");
                    break;
                }
                event = self.eventloop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = self.config.reconnect_delay_ms,
                            "MQTT connection error"
                        );
                        tokio::select! {
                            _ = &mut shutdown => break,
                            _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
                        }
                    }
                },
            }
        }

        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "MQTT disconnect request not sent");
        }
        tracing::info!("MQTT subscriber stopped");
    }

    /// Dispatch one event loop notification.
    pub fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => self.on_connect(ack.code),
            Event::Incoming(Packet::Publish(publish)) => {
                self.normalizer.handle(&publish.topic, &publish.payload);
            }
            Event::Incoming(Packet::SubAck(_)) => {
                tracing::debug!(topic = %self.config.topic, "subscription acknowledged");
            }
            _ => {}
        }
    }

    /// Connect handler: (re)subscribe on every successful connect.
    fn on_connect(&self, code: ConnectReturnCode) {
        if code != ConnectReturnCode::Success {
            tracing::warn!(code = ?code, "MQTT broker refused connection");
            return;
        }

        tracing::info!(topic = %self.config.topic, "MQTT connected, subscribing");
        if let Err(e) = self
            .client
            .try_subscribe(&self.config.topic, qos_level(self.config.qos))
        {
            tracing::warn!(topic = %self.config.topic, error = %e, "failed to queue subscription");
        }
    }
}
