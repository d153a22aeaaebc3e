//! Configuration handshake for a single meter.
//!
//! A session sends identify, set password, set CT ratio and terminate in
//! that order. Every request carries a fresh tracking id and the next one is
//! only sent once a response with that id acknowledges the previous request.
//! Responses with any other tracking id are left alone, they belong to an
//! exchange that is already over.
//!
//! The session does no I/O itself: it hands back the request to send and
//! the caller puts it on the bus.

use log::debug;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::ekm::{self, EkmMessageError, MessageKind, ACK};
use crate::gateway::{Rs485Request, SensorMessage};
use crate::meters::MeterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    AwaitIdentifyAck,
    AwaitPasswordAck,
    AwaitCtRatioAck,
    AwaitTerminateAck,
    Completed,
    Aborted,
}

impl Step {
    fn awaiting_for(kind: MessageKind) -> Step {
        match kind {
            MessageKind::Identify => Step::AwaitIdentifyAck,
            MessageKind::Password => Step::AwaitPasswordAck,
            MessageKind::CtRatio => Step::AwaitCtRatioAck,
            MessageKind::Terminate => Step::AwaitTerminateAck,
        }
    }

    /// The request whose acknowledgment this state waits for
    pub fn awaiting(&self) -> Option<MessageKind> {
        match self {
            Step::AwaitIdentifyAck => Some(MessageKind::Identify),
            Step::AwaitPasswordAck => Some(MessageKind::Password),
            Step::AwaitCtRatioAck => Some(MessageKind::CtRatio),
            Step::AwaitTerminateAck => Some(MessageKind::Terminate),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        return matches!(self, Step::Completed | Step::Aborted);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    NegativeAck { step: MessageKind, status: Option<String> },
    Timeout { step: MessageKind },
    Message { step: MessageKind, error: EkmMessageError },
}

impl AbortReason {
    pub fn step(&self) -> MessageKind {
        match self {
            AbortReason::NegativeAck { step, .. } => *step,
            AbortReason::Timeout { step } => *step,
            AbortReason::Message { step, .. } => *step,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::NegativeAck { step, status: Some(status) } => write!(f, "{} rejected with status {}", step, status),
            AbortReason::NegativeAck { step, status: None } => write!(f, "{} answered without status", step),
            AbortReason::Timeout { step } => write!(f, "no answer to {}", step),
            AbortReason::Message { step, error } => write!(f, "unable to build {} message: {}", step, error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Not for this session, nothing changed
    Ignored,
    Sent(Rs485Request),
    Completed,
    Aborted(AbortReason),
}

/// Hands out 4 hex digit tracking ids, never the same one twice in a row
pub struct TrackingIds {
    next: u16,
}

impl TrackingIds {
    pub fn new() -> Self {
        return Self::starting_at(Uuid::new_v4().as_u128() as u16);
    }

    pub fn starting_at(first: u16) -> Self {
        return TrackingIds { next: first };
    }

    pub fn issue(&mut self) -> String {
        let id = format!("{:04x}", self.next);
        self.next = self.next.wrapping_add(1);
        return id;
    }
}

impl Default for TrackingIds {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProvisioningSession {
    meter: Arc<MeterConfig>,
    step: Step,
    expected_tracking_id: Option<String>,
}

impl ProvisioningSession {
    pub fn new(meter: Arc<MeterConfig>) -> Self {
        return ProvisioningSession { meter, step: Step::Start, expected_tracking_id: None };
    }

    pub fn meter(&self) -> &MeterConfig {
        return &self.meter;
    }

    pub fn step(&self) -> Step {
        return self.step;
    }

    pub fn expected_tracking_id(&self) -> Option<&str> {
        return self.expected_tracking_id.as_deref();
    }

    /// Sends the identify request to the hub configured for the meter
    pub fn start(&mut self, ids: &mut TrackingIds) -> Transition {
        if self.step != Step::Start {
            return Transition::Ignored;
        }

        let destination = self.meter.rs485_hub_id.clone();
        return self.send(MessageKind::Identify, destination, ids);
    }

    pub fn handle(&mut self, message: &SensorMessage, ids: &mut TrackingIds) -> Transition {
        let Some(step) = self.step.awaiting() else {
            return Transition::Ignored;
        };

        if message.tracking_id.is_none() || message.tracking_id != self.expected_tracking_id {
            debug!("Ignoring message with tracking id {:?} while waiting for {:?}",
                   message.tracking_id, self.expected_tracking_id);
            return Transition::Ignored;
        }

        /* Only device answers carry a status, other correlated messages count as accepted */
        if message.is_rs485_response() && message.status_code() != Some(ACK) {
            return self.abort(AbortReason::NegativeAck {
                step,
                status: message.status_code().map(|s| s.to_string()),
            });
        }

        match step.next() {
            /* The address the meter answered from is used for the rest of the session */
            Some(next) => self.send(next, message.sensor_id.clone(), ids),
            None => {
                self.step = Step::Completed;
                self.expected_tracking_id = None;
                Transition::Completed
            }
        }
    }

    /// Gives up on the outstanding request
    pub fn expire(&mut self) -> Transition {
        match self.step.awaiting() {
            Some(step) => self.abort(AbortReason::Timeout { step }),
            None => Transition::Ignored,
        }
    }

    fn send(&mut self, kind: MessageKind, destination: String, ids: &mut TrackingIds) -> Transition {
        let body = match ekm::build_message(kind, &self.meter) {
            Ok(body) => body,
            Err(error) => return self.abort(AbortReason::Message { step: kind, error }),
        };

        let tracking_id = ids.issue();
        self.expected_tracking_id = Some(tracking_id.clone());
        self.step = Step::awaiting_for(kind);

        return Transition::Sent(Rs485Request::new(body, destination, tracking_id));
    }

    fn abort(&mut self, reason: AbortReason) -> Transition {
        self.step = Step::Aborted;
        self.expected_tracking_id = None;
        return Transition::Aborted(reason);
    }
}
