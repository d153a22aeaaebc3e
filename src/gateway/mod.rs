use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::config::AppConfig;

pub mod structs;

pub use structs::{GatewayEvent, Rs485Request, SensorMessage, SensorPayload, RS485_RESPONSE};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unable to encode or decode gateway message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

pub fn parse_sensor_message(payload: &[u8]) -> Result<SensorMessage, GatewayError> {
    return Ok(serde_json::from_slice(payload)?);
}

/// Bridges the RS485 USB gateway, which is exposed on an MQTT broker
pub struct GatewayManager {
    rx: Receiver<Rs485Request>,
    client: AsyncClient,
    request_topic: String,
}

impl GatewayManager {
    /// Connects to the broker. Returns the manager, the sender requests go
    /// out through and the receiver all gateway events arrive on.
    pub fn new(config: &AppConfig) -> (Self, Sender<Rs485Request>, Receiver<GatewayEvent>) {
        let (request_tx, request_rx) = tokio::sync::mpsc::channel(10);
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(100);

        info!("MQTT connection to {}:{} starting up", config.mqtt.host, config.mqtt.port);
        let mut mqttoptions = MqttOptions::new(config.mqtt.client_name.clone(), config.mqtt.host.clone(), config.mqtt.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if let (Some(user), Some(pass)) = (&config.mqtt.user, &config.mqtt.pass) {
            mqttoptions.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        let message_topic = config.gateway.message_topic();
        let subscribe_c = client.clone();
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            let mut ready = false;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected, subscribing to {message_topic}");

                        /* The eventloop has to keep running for the subscription to go through */
                        let client_clone = subscribe_c.clone();
                        let topic = message_topic.clone();
                        tokio::spawn(async move {
                            if let Err(e) = client_clone.subscribe(topic, QoS::AtLeastOnce).await {
                                error!("Subscribing to gateway messages failed: {e}");
                            }
                        });
                    },
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        if !ready {
                            ready = true;
                            info!("Gateway is ready.");
                            if event_tx.send(GatewayEvent::Ready).await.is_err() {
                                break;
                            }
                        }
                    },
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        if p.topic != message_topic {
                            continue;
                        }

                        match parse_sensor_message(&p.payload) {
                            Ok(message) => {
                                debug!("Received gateway message {message:?}");
                                if event_tx.send(GatewayEvent::Message(message)).await.is_err() {
                                    break;
                                }
                            },
                            Err(e) => {
                                warn!("Dropping unparseable gateway message: {e}");
                            }
                        }
                    },
                    Ok(_) => {},
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            debug!("Nobody is listening for gateway events anymore, eventloop stopped");
        });

        return (GatewayManager {
            rx: request_rx,
            client,
            request_topic: config.gateway.request_topic(),
        }, request_tx, event_rx);
    }

    pub async fn start_thread(&mut self) {
        while let Some(request) = self.rx.recv().await {
            if let Err(e) = self.publish(&request).await {
                error!("Error sending request {}: {}", request.tracking_id, e);
            }
        }

        info!("Request channel closed, gateway thread exits");
    }

    async fn publish(&self, request: &Rs485Request) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(request)?;
        self.client.publish(self.request_topic.clone(), QoS::AtLeastOnce, false, payload).await?;

        debug!("Published request {} to {}", request.tracking_id, self.request_topic);
        return Ok(());
    }
}
