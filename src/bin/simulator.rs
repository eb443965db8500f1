use harvbus::agent::HarvesterAgent;
use harvbus::master::DispatchOutcome;
use std::time::Duration;
use tokio::time;
use tracing::{info, warn};

// Nominal period of the external timing source driving the dispatcher.
const DISPATCH_PERIOD_MS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("🚜 Harvester Command Bus Simulator");
    println!("==================================");

    let mut agent = HarvesterAgent::new();
    let mut interval = time::interval(Duration::from_millis(DISPATCH_PERIOD_MS));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let telemetry = agent.tick();

                match telemetry.outcome {
                    DispatchOutcome::Delivered { target, command } => {
                        info!("📨 delivered command 0x{:02X} to unit 0x{:02X}", command, target.raw());
                    }
                    DispatchOutcome::AddressNotAcknowledged { target } => {
                        warn!("unit 0x{:02X} did not acknowledge its address, skipping tick", target.raw());
                    }
                    DispatchOutcome::CommandNotAcknowledged { target, command } => {
                        warn!("unit 0x{:02X} did not acknowledge command 0x{:02X}", target.raw(), command);
                    }
                    DispatchOutcome::BusStuck => {
                        warn!("bus stayed busy past the spin bound, skipping tick");
                    }
                    DispatchOutcome::Idle => {}
                }

                if let Some(status) = telemetry.completion {
                    info!("✅ completion status 0x{:02X}", status);
                }

                match serde_json::to_string(&telemetry) {
                    Ok(line) => info!("📡 TELEMETRY: {}", line),
                    Err(e) => warn!("Failed to serialize telemetry: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    println!("🚜 Harvester Command Bus Simulator stopped");
    Ok(())
}
