use clap::Args;
use eyre::eyre;
use serde_json::Value;

use logswitch::logging::Level;

use crate::config::ConfigManager;

use super::SinkArgs;

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(help = "Severity of the record.")]
    pub level: Level,

    #[arg(help = "Message to log.")]
    pub message: String,

    #[arg(long, help = "Parse the message as JSON before logging it.")]
    pub json: bool,

    #[command(flatten)]
    pub sinks: SinkArgs,
}

impl Cmd {
    pub async fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let message = if self.json {
            serde_json::from_str::<Value>(&self.message)?
        } else {
            Value::String(self.message.clone())
        };

        let setup = self.sinks.setup(config).await?;
        let delivered = setup.registry.log(self.level, message);
        setup.shutdown().await;

        if !delivered {
            return Err(eyre!(
                "{} record was not delivered (threshold {})",
                self.level,
                setup.registry.threshold()
            ));
        }

        Ok(())
    }
}
