//! # Example: embedding the agent in a server process
//!
//! Reads `CONTROLLER_ADDRESS`, `SERVER_TOKEN` and (optionally)
//! `CONTROLLER_CERTIFICATE`, connects to the controller over gRPC and
//! heartbeats until Ctrl-C or until the controller asks the server to stop.
//!
//! ```text
//! CONTROLLER_ADDRESS=http://127.0.0.1:12892 SERVER_TOKEN=dev \
//!     RUST_LOG=fleetlink=debug cargo run --example embedded_agent
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use fleetlink::{
    AgentBuilder, AgentConfig, ControlPlaneEndpoint, Event, EventKind, HostDescriptor,
    ReconnectPolicy, RuntimeError, Subscribe,
};

/// Prints configuration pushes from the controller.
struct ConfigWatcher;

#[async_trait]
impl Subscribe for ConfigWatcher {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::ConfigUpdated {
            println!(
                "[config] {} bytes pushed for session {}",
                ev.size.unwrap_or(0),
                ev.session.as_deref().unwrap_or("-")
            );
        }
    }

    fn name(&self) -> &'static str {
        "config-watcher"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let endpoint = ControlPlaneEndpoint::from_env()?;
    let cfg = AgentConfig {
        interval: Duration::from_secs(5),
        reconnect: ReconnectPolicy::backoff(),
        ..AgentConfig::default()
    };

    let mut subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(ConfigWatcher)];
    #[cfg(feature = "logging")]
    subs.push(Arc::new(fleetlink::LogWriter::new()));

    let agent = AgentBuilder::new(cfg, endpoint, HostDescriptor::new("demo-server"))
        .with_subscribers(subs)
        .build()?;

    agent.on_load().await?;
    agent.on_enable().await?;

    let outcome = agent.run().await;
    agent.on_disable().await?;

    match outcome {
        Err(RuntimeError::Terminated { reason }) => {
            println!("controller ended this server: {reason}");
            Ok(())
        }
        other => Ok(other?),
    }
}
