use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_bus::Bus;
use relay_bus::registry::{ProviderCatalog, providers};
use relay_host::{EchoFacility, HostArgs, StdoutTransport, read_envelopes};
use tokio::io::BufReader;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = HostArgs::parse();
    let service = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    if args.json_logs {
        relay_telemetry::install_json(service, version)?;
    } else {
        relay_telemetry::install(service, version)?;
    }

    let config = args.bus_config()?;
    let mut catalog = ProviderCatalog::new();
    providers::register_all(&mut catalog, config.bus_id)
        .context("registering built-in providers")?;

    let transport = Arc::new(StdoutTransport::stdout());
    let facility = Arc::new(EchoFacility::new(config.channel_prefix.clone()));
    let bus = Bus::new(&config, catalog, facility, transport.clone());
    info!(
        bus_id = %bus.id(),
        seed_core = config.seed_core,
        max_channels = ?config.max_channels,
        "relay host ready"
    );

    let (sink, inbound) = futures::channel::mpsc::unbounded();
    let reader = tokio::spawn(read_envelopes(
        BufReader::new(tokio::io::stdin()),
        transport,
        sink,
    ));

    bus.run(inbound).await?;
    match reader.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "stdin reader failed"),
        Err(err) => error!(error = %err, "stdin reader task failed"),
    }
    info!("relay host stopped");
    Ok(())
}
