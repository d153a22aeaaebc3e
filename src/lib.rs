//! Provisioning of EKM electricity meters over an RS485 gateway
//!
//! This library sets the password and the current transformer ratio of a
//! batch of meters, one meter after the other, through a USB RS485 gateway
//! which is bridged onto an MQTT broker.

use log::{error, info};
use std::path::Path;
use std::process::ExitCode;

pub mod config;
pub mod ekm;
pub mod gateway;
pub mod meters;
pub mod orchestrator;
pub mod provisioning;

// Re-export common types for easier access
pub use config::AppConfig;
pub use gateway::GatewayManager;
pub use meters::{MeterConfig, MeterRegistry};
pub use orchestrator::{BatchSummary, Orchestrator};
pub use provisioning::{ProvisioningSession, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchExit {
    Success,
    Failure,
}

impl BatchExit {
    pub fn exit_code(self) -> ExitCode {
        match self {
            BatchExit::Success => ExitCode::SUCCESS,
            BatchExit::Failure => ExitCode::FAILURE,
        }
    }
}

pub enum BatchPlan {
    /// At least one meter needs the gateway
    Run(MeterRegistry),
    /// Decided without talking to any meter
    Exit(BatchExit),
}

/// Loads the meters file and decides whether the gateway is needed at all
pub fn plan_batch(meters_path: &Path) -> BatchPlan {
    let registry = match MeterRegistry::from_file(meters_path) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Errors detected in meters file {}:", meters_path.display());
            error!("{e}");
            return BatchPlan::Exit(BatchExit::Failure);
        }
    };

    registry.log_plan();
    if registry.eligible_count() == 0 {
        info!("Nothing to do - no meters with password and CT ratio found in {}.", meters_path.display());
        return BatchPlan::Exit(BatchExit::Success);
    }

    return BatchPlan::Run(registry);
}
