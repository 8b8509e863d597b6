#[cfg(feature = "cli")]
use streamliner::{config::FleetConfig, run_fleet_server, telemetry};

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Installed first so config loading is logged; `from_env` reads `.env`.
    telemetry::init_tracing();

    let cfg = FleetConfig::from_env()?;
    run_fleet_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
