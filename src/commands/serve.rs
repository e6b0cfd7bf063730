use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;
use eyre::Context;
use tokio::net::TcpListener;

use logswitch::control::{serve, ControlSurface};
use logswitch::logging::Level;

use crate::config::ConfigManager;

use super::SinkArgs;

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(long, default_value = "127.0.0.1:8080", help = "Address the control surface listens on.")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub sinks: SinkArgs,
}

impl Cmd {
    pub async fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let setup = self.sinks.setup(config).await?;

        for broker in &setup.brokers {
            let mut errors = broker.errors();
            tokio::spawn(async move {
                while let Some(err) = errors.recv().await {
                    tracing::warn!(target: "logswitch", "broker delivery failed: {}", err);
                }
            });
        }

        let listener = TcpListener::bind(self.listen)
            .await
            .with_context(|| format!("Failed binding control surface to {}", self.listen))?;
        let local = listener.local_addr()?;

        setup.registry.log(
            Level::Info,
            format!(
                "control surface listening on http://{} with sink {}",
                local,
                setup
                    .registry
                    .active_sink_name()
                    .map(|name| name.to_string())
                    .unwrap_or_default()
            ),
        );

        let surface = Arc::new(ControlSurface::new(setup.registry.clone()));
        serve(listener, surface, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(target: "logswitch", "failed listening for ctrl-c: {}", err);
            }
        })
        .await;

        setup.registry.log(Level::Info, "shutting down");
        setup.shutdown().await;

        Ok(())
    }
}
