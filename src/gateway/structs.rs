use serde::{Deserialize, Serialize};

/// Message type the gateway uses for the answer of a device to an RS485 request
pub const RS485_RESPONSE: &str = "rs485Response";

/// Request handed to the USB gateway, which frames it for the RS485 bus
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rs485Request {
    pub message: String,
    pub destination: String,
    pub hex_encode_payload: bool,
    pub tracking_id: String,
}

impl Rs485Request {
    pub fn new(message: String, destination: String, tracking_id: String) -> Self {
        Self { message, destination, hex_encode_payload: false, tracking_id }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SensorPayload {
    #[serde(default)]
    pub rs485: Option<String>,
}

/// Any message the gateway reports, RS485 responses are only one kind of them
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SensorMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub sensor_id: String,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub payload: SensorPayload,
}

impl SensorMessage {
    pub fn is_rs485_response(&self) -> bool {
        return self.message_type == RS485_RESPONSE;
    }

    pub fn status_code(&self) -> Option<&str> {
        return self.payload.rs485.as_deref();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready,
    Message(SensorMessage),
}
