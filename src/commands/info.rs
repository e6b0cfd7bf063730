use clap::{Args, CommandFactory};

use logswitch::logging::Level;

use crate::{commands::Cli, config::ConfigManager};

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cmd {}

impl Cmd {
    pub fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let levels: Vec<&str> = Level::ALL.iter().map(|level| level.as_str()).collect();

        println!(
            "Version:        {}",
            Cli::command().get_version().unwrap_or("")
        );
        println!(
            "Logs:           {}",
            config
                .get_log_path()
                .map(|path| path.display().to_string())
                .unwrap_or_default()
        );
        println!("Levels:         {}", levels.join(", "));
        println!("Routes:         GET /sinks, GET|POST /sinks/active, GET /levels, GET|POST /level");
        Ok(())
    }
}
