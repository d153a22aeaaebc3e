use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::Instant;

use crate::config::ProvisioningConfig;
use crate::gateway::{GatewayEvent, Rs485Request, SensorMessage};
use crate::meters::MeterRegistry;
use crate::provisioning::{AbortReason, ProvisioningSession, TrackingIds, Transition};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Gateway event channel closed before all meters were processed")]
    GatewayClosed,
    #[error("Gateway request channel closed")]
    RequestChannelClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedMeter {
    pub serial_number: String,
    pub reason: AbortReason,
}

/// What happened to every meter of the batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub completed: Vec<String>,
    pub failed: Vec<FailedMeter>,
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn log(&self) {
        info!("Batch finished: {} configured, {} failed, {} skipped",
              self.completed.len(), self.failed.len(), self.skipped.len());
        for failed in &self.failed {
            info!("Meter {} failed: {}", failed.serial_number, failed.reason);
        }
    }
}

/// Works through the registry one meter at a time. Owns the only session
/// and the cursor, everything arrives through the gateway event channel.
pub struct Orchestrator {
    registry: MeterRegistry,
    session: Option<ProvisioningSession>,
    tracking_ids: TrackingIds,
    requests: Sender<Rs485Request>,
    settings: ProvisioningConfig,
    summary: BatchSummary,
    started: bool,
    finished: bool,
    start_at: Option<Instant>,
    step_deadline: Option<Instant>,
}

impl Orchestrator {
    pub fn new(registry: MeterRegistry, requests: Sender<Rs485Request>, settings: ProvisioningConfig) -> Self {
        let summary = BatchSummary {
            skipped: registry.skipped().map(|m| m.serial_number.clone()).collect(),
            ..Default::default()
        };

        return Orchestrator {
            registry,
            session: None,
            tracking_ids: TrackingIds::new(),
            requests,
            settings,
            summary,
            started: false,
            finished: false,
            start_at: None,
            step_deadline: None,
        };
    }

    pub fn with_tracking_ids(mut self, tracking_ids: TrackingIds) -> Self {
        self.tracking_ids = tracking_ids;
        return self;
    }

    pub async fn run(mut self, mut events: Receiver<GatewayEvent>) -> Result<BatchSummary, OrchestratorError> {
        while !self.finished {
            let wake_at = self.start_at.or(self.step_deadline);

            tokio::select! {
                event = events.recv() => {
                    match event {
                        None => return Err(OrchestratorError::GatewayClosed),
                        Some(GatewayEvent::Ready) => self.on_ready(),
                        Some(GatewayEvent::Message(message)) => self.on_message(&message).await?,
                    }
                }
                _ = tokio::time::sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                    self.on_timer().await?;
                }
            }
        }

        return Ok(self.summary);
    }

    fn on_ready(&mut self) {
        if self.started {
            debug!("Gateway reconnected, batch is already running");
            return;
        }

        self.started = true;
        self.select_next();
    }

    fn select_next(&mut self) {
        let first = self.registry.current_index().is_none();

        match self.registry.advance() {
            Some((index, meter)) => {
                info!("Configuring meter {} (entry {} of {})", meter.serial_number, index + 1, self.registry.len());
                self.session = Some(ProvisioningSession::new(meter));
                self.start_at = Some(Instant::now() + self.settings.settle_delay());
            },
            None => {
                if first {
                    info!("Nothing to do - no meters with password and CT ratio found.");
                } else {
                    info!("Processed all meters.");
                }
                self.finished = true;
            }
        }
    }

    async fn on_timer(&mut self) -> Result<(), OrchestratorError> {
        let Some(session) = self.session.as_mut() else {
            self.start_at = None;
            self.step_deadline = None;
            return Ok(());
        };

        let transition = if self.start_at.take().is_some() {
            session.start(&mut self.tracking_ids)
        } else {
            self.step_deadline = None;
            session.expire()
        };

        return self.apply(transition).await;
    }

    async fn on_message(&mut self, message: &SensorMessage) -> Result<(), OrchestratorError> {
        let Some(session) = self.session.as_mut() else {
            debug!("No meter in progress, ignoring message from {}", message.sensor_id);
            return Ok(());
        };

        let transition = session.handle(message, &mut self.tracking_ids);
        return self.apply(transition).await;
    }

    async fn apply(&mut self, transition: Transition) -> Result<(), OrchestratorError> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let serial_number = session.meter().serial_number.clone();

        match transition {
            Transition::Ignored => {},
            Transition::Sent(request) => {
                if let Some(kind) = session.step().awaiting() {
                    info!("Sent {} message {} to meter {}", kind, request.message, serial_number);
                }
                self.step_deadline = self.settings.step_timeout().map(|timeout| Instant::now() + timeout);
                self.requests.send(request).await.map_err(|_| OrchestratorError::RequestChannelClosed)?;
            },
            Transition::Completed => {
                info!("Configuration process completed for meter {}", serial_number);
                self.summary.completed.push(serial_number);
                self.finish_meter();
            },
            Transition::Aborted(reason) => {
                error!("Bad response from meter {}: {}", serial_number, reason);
                self.summary.failed.push(FailedMeter { serial_number, reason });
                self.finish_meter();
            },
        }

        return Ok(());
    }

    fn finish_meter(&mut self) {
        self.session = None;
        self.step_deadline = None;
        self.select_next();
    }
}
