use anyhow::{bail, Context, Result};
use pentarchy::bus::{create_message_bus, BusType, HeartbeatEmitter, MessageBus, RequestClient};
use pentarchy::core::{logging::init_logging, Config};
use pentarchy::governance::{GovernanceEngine, ProposalRequest};
use pentarchy::voting::{ReferenceVoter, VoterPanel, VoterService};
use std::sync::Arc;
use std::time::Duration;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const HEARTBEAT_JITTER: Duration = Duration::from_secs(2);

const USAGE: &str = "usage:
  pentarchy voter <name>
  pentarchy propose [--metrics] <title> <cost> <description...>
  pentarchy thresholds";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config.logging.level);
    tracing::info!("Pentarchy {} ({} bus)", env!("CARGO_PKG_VERSION"), config.bus.backend);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("voter") => {
            let name = args.get(1).context(USAGE)?;
            run_voter(&config, name).await
        }
        Some("propose") => {
            let mut args: Vec<&String> = args[1..].iter().collect();
            let show_metrics = args.first().is_some_and(|arg| *arg == "--metrics");
            if show_metrics {
                args.remove(0);
            }
            if args.len() < 3 {
                bail!(USAGE);
            }
            let cost: f64 = args[1]
                .parse()
                .with_context(|| format!("invalid cost: {}", args[1]))?;
            let description = args[2..].iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ");
            let request = ProposalRequest::new(args[0], &description, cost).initiated_by("cli");
            run_proposal(&config, request, show_metrics).await
        }
        Some("thresholds") => {
            let (engine, bus) = build_engine(&config).await?;
            println!("{}", serde_json::to_string_pretty(&engine.thresholds())?);
            if let Some(bus) = bus {
                bus.disconnect().await?;
            }
            Ok(())
        }
        _ => bail!(USAGE),
    }
}

/// Host a reference panel member until Ctrl-C.
async fn run_voter(config: &Config, name: &str) -> Result<()> {
    if config.bus.backend == BusType::Memory {
        bail!("voter processes need a shared bus; set MESSAGE_BUS_TYPE=redis");
    }
    let voter = ReferenceVoter::from_name(name)?;

    let bus = create_message_bus(&config.bus.for_agent(name), None).await?;
    let service = VoterService::host(bus.clone(), Arc::new(voter)).await?;
    let heartbeat = HeartbeatEmitter::new(bus.clone(), HEARTBEAT_INTERVAL)
        .with_jitter(HEARTBEAT_JITTER)
        .start();
    tracing::info!(voter = %name, "Voter running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!(voter = %name, "Shutting down");

    heartbeat.stop().await?;
    service.stop().await?;
    bus.disconnect().await?;
    Ok(())
}

/// Engine over the configured panel: in-process reference voters on the
/// memory bus, remote voters otherwise.
async fn build_engine(config: &Config) -> Result<(GovernanceEngine, Option<Arc<dyn MessageBus>>)> {
    match config.bus.backend {
        BusType::Memory => {
            let panel = VoterPanel::reference(&config.panel)?;
            Ok((GovernanceEngine::from_config(config, panel)?, None))
        }
        BusType::Redis => {
            let bus = create_message_bus(&config.bus, None).await?;
            let client = Arc::new(RequestClient::attach(bus.clone()).await?);
            let panel = VoterPanel::remote(&config.panel, client, config.coordinator.voter_timeout())?;
            let engine = GovernanceEngine::from_config(config, panel)?.with_bus(bus.clone());
            Ok((engine, Some(bus)))
        }
    }
}

/// Submit one proposal and print the resolved record.
async fn run_proposal(config: &Config, request: ProposalRequest, show_metrics: bool) -> Result<()> {
    let (engine, bus) = build_engine(config).await?;
    let proposal = engine.submit_and_resolve(request).await;
    if let Some(bus) = bus {
        bus.disconnect().await?;
    }

    println!("{}", serde_json::to_string_pretty(&proposal?)?);
    if show_metrics {
        eprint!("{}", engine.metrics().export_prometheus());
    }
    Ok(())
}
