use setct::{plan_batch, AppConfig, BatchPlan, GatewayManager, Orchestrator};
use std::path::Path;
use std::process::ExitCode;
use log::error;


#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let default_filter = std::env::var("SETCT_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        error!("Usage: setct <meters.json> [config.yaml]");
        return ExitCode::FAILURE;
    }

    let config = match AppConfig::load(args.get(2).map(Path::new)) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let registry = match plan_batch(Path::new(&args[1])) {
        BatchPlan::Run(registry) => registry,
        BatchPlan::Exit(exit) => return exit.exit_code(),
    };

    /* The gateway has to be connected before the batch can start */
    let (mut gateway, requests, events) = GatewayManager::new(&config);
    let gateway_thread = tokio::spawn(async move {
        gateway.start_thread().await;
    });

    let orchestrator = Orchestrator::new(registry, requests, config.provisioning.clone());
    let result = orchestrator.run(events).await;

    /* The orchestrator dropped its request sender, wait for the queue to drain */
    let _ = gateway_thread.await;

    match result {
        Ok(summary) => {
            summary.log();
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
