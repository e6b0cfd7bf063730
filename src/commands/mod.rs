use std::{fmt::Display, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use eyre::{eyre, Context};
use tracing::level_filters::LevelFilter;

use logswitch::logging::{
    BrokerConfig, BrokerSink, Config, ConsoleSink, DefaultFormatter, FileSink, Level, Registry,
    Sink, BROKER, CONSOLE, FILE,
};

use crate::config::{ConfigManager, LocalConfigManager};

mod emit;
mod info;
mod serve;

#[derive(Subcommand, Debug)]
pub enum Cmd {
    Serve(serve::Cmd),

    Emit(emit::Cmd),

    Info(info::Cmd),
}

impl Display for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cmd::Serve(cmd) => write!(f, "serve {}", cmd.listen),
            Cmd::Emit(cmd) => write!(f, "emit {}", cmd.level),
            Cmd::Info(_cmd) => write!(f, "info"),
        }
    }
}

#[derive(Parser)]
#[command(version, long_version = "")]
#[command(about = "Route log records to switchable sinks and control them over HTTP.", long_about = None, disable_help_subcommand = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        help = "Write verbose diagnostics to stderr.",
        display_order = 999
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Cli {
    fn log_filter(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::ERROR,
            2 => LevelFilter::WARN,
            3 => LevelFilter::INFO,
            4 => LevelFilter::DEBUG,
            5..=u8::MAX => LevelFilter::TRACE,
        }
    }

    fn setup_logging(&self) -> eyre::Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(self.log_filter())
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| eyre!("Failed installing diagnostics subscriber: {}", e))
    }

    pub fn run(self) -> eyre::Result<()> {
        self.setup_logging()?;

        tracing::info!(target: "logswitch", "logswitch starting up");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        tracing::info!(target: "logswitch", "running command {}", &self.cmd);
        tracing::trace!(target: "logswitch", "diagnostics level: {}", self.log_filter());

        let result = runtime.block_on(self.invoke_sub_command(LocalConfigManager::new()));

        if let Err(msg) = &result {
            tracing::error!(target: "logswitch", "failed running command {}, error={} cause={}", &self.cmd, msg, msg.root_cause());
        }

        result
    }

    async fn invoke_sub_command<T>(&self, config: T) -> eyre::Result<()>
    where
        T: ConfigManager,
    {
        match &self.cmd {
            Cmd::Serve(serve) => serve.run(&config).await,
            Cmd::Emit(emit) => emit.run(&config).await,
            Cmd::Info(info) => info.run(&config),
        }
    }
}

/// Sink selection shared by every command that builds a registry.
#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    #[arg(long, default_value = "INFO", help = "Initial threshold: NONE, FATAL, ERROR, WARN, DEBUG, INFO or TRACE.")]
    pub level: Level,

    #[arg(long, help = "Sink to activate instead of the first registered one.")]
    pub active: Option<String>,

    #[arg(long, help = "Log file path. Defaults to $XDG_DATA_HOME/logswitch/logswitch.log.")]
    pub log_file: Option<std::path::PathBuf>,

    #[arg(long, help = "Don't register the file sink.")]
    pub no_file: bool,

    #[arg(long = "broker", value_name = "HOST:PORT", help = "Broker address, may be repeated.")]
    pub brokers: Vec<String>,

    #[arg(long, default_value = "logs")]
    pub topic: String,

    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration, help = "Give up on a broker that stops reading for this long.")]
    pub write_timeout: Duration,

    #[arg(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    #[arg(long, default_value_t = 2, help = "Default call depth; 0 leaves out source locations.")]
    pub call_depth: usize,

    #[arg(long, default_value_t = 5)]
    pub level_width: usize,
}

pub struct Setup {
    pub registry: Arc<Registry>,
    pub brokers: Vec<Arc<BrokerSink>>,
}

impl Setup {
    /// Shuts every sink down and waits for broker connections to drain.
    pub async fn shutdown(&self) {
        self.registry.shutdown_all();

        for broker in &self.brokers {
            broker.closed().await;
        }
    }
}

impl SinkArgs {
    /// Builds the console, file and broker sinks and registers whatever could be brought up.
    /// The console doubles as the fallback.
    pub async fn setup(&self, config: &impl ConfigManager) -> eyre::Result<Setup> {
        let formatter_config = Config::new().with_level_width(self.level_width);

        let console: Arc<dyn Sink> = Arc::new(ConsoleSink::new(
            CONSOLE,
            self.call_depth,
            Box::new(DefaultFormatter::new(formatter_config.clone())),
        ));
        let mut sinks = vec![console.clone()];

        if !self.no_file {
            let path = match &self.log_file {
                Some(path) => path.clone(),
                None => config.get_log_path()?,
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed creating log directory {}", parent.display()))?;
            }

            let plain = Config {
                use_ansi: false,
                ..formatter_config
            };
            match FileSink::new(&path, FILE, self.call_depth, Box::new(DefaultFormatter::new(plain))) {
                Ok(sink) => sinks.push(Arc::new(sink)),
                Err(err) => tracing::warn!(target: "logswitch", "skipping file sink: {}", err),
            }
        }

        let mut brokers = Vec::new();
        if !self.brokers.is_empty() {
            let broker_config = BrokerConfig::new(self.brokers.clone(), &self.topic)
                .with_name(BROKER)
                .with_call_depth(self.call_depth)
                .with_connect_timeout(self.connect_timeout)
                .with_write_timeout(self.write_timeout)
                .with_queue_capacity(self.queue_capacity);

            match BrokerSink::connect(broker_config).await {
                Ok(sink) => {
                    let sink = Arc::new(sink);
                    brokers.push(sink.clone());
                    sinks.push(sink);
                }
                Err(err) => tracing::warn!(target: "logswitch", "skipping broker sink: {}", err),
            }
        }

        let registry = Registry::new()
            .with_threshold(self.level)
            .with_fallback(console);
        registry.register(sinks);

        if let Some(active) = &self.active {
            if !registry.activate(active) {
                let known: Vec<String> = registry
                    .sink_names()
                    .iter()
                    .map(|name| name.to_string())
                    .collect();
                return Err(eyre!(
                    "Unknown sink {:?}, registered sinks: {}",
                    active,
                    known.join(", ")
                ));
            }
        }

        Ok(Setup {
            registry: Arc::new(registry),
            brokers,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone)]
    struct TempConfig {
        log_path: PathBuf,
    }

    impl ConfigManager for TempConfig {
        fn get_log_path(&self) -> eyre::Result<PathBuf> {
            Ok(self.log_path.clone())
        }
    }

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        sinks: SinkArgs,
    }

    fn sink_args(args: &[&str]) -> SinkArgs {
        Harness::parse_from(std::iter::once("logswitch").chain(args.iter().copied())).sinks
    }

    fn names(setup: &Setup) -> Vec<String> {
        setup
            .registry
            .sink_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    #[tokio::test]
    async fn default_setup_activates_console_with_console_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let config = TempConfig {
            log_path: dir.path().join("nested").join("logswitch.log"),
        };

        let setup = sink_args(&["--level", "WARN"]).setup(&config).await.unwrap();

        assert_eq!(names(&setup), vec![CONSOLE, FILE]);
        assert_eq!(setup.registry.active_sink_name().unwrap().as_str(), CONSOLE);
        assert_eq!(setup.registry.fallback_name().unwrap().as_str(), CONSOLE);
        assert_eq!(setup.registry.threshold(), Level::Warn);
        assert!(setup.brokers.is_empty());
        assert!(config.log_path.exists());

        setup.shutdown().await;
    }

    #[tokio::test]
    async fn unopenable_log_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = TempConfig {
            log_path: dir.path().join("unused.log"),
        };
        let as_file = dir.path().to_string_lossy().to_string();

        let setup = sink_args(&["--log-file", &as_file])
            .setup(&config)
            .await
            .unwrap();

        assert_eq!(names(&setup), vec![CONSOLE]);
        assert_eq!(setup.registry.threshold(), Level::Info);
    }

    #[tokio::test]
    async fn unreachable_broker_is_skipped() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = dead.local_addr().unwrap().to_string();
        drop(dead);

        let setup = sink_args(&["--no-file", "--broker", &addr, "--connect-timeout", "1s"])
            .setup(&TempConfig {
                log_path: PathBuf::from("unused.log"),
            })
            .await
            .unwrap();

        assert_eq!(names(&setup), vec![CONSOLE]);
        assert!(setup.brokers.is_empty());
    }

    #[tokio::test]
    async fn explicit_active_sink_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let config = TempConfig {
            log_path: dir.path().join("logswitch.log"),
        };

        let setup = sink_args(&["--active", FILE]).setup(&config).await.unwrap();
        assert_eq!(setup.registry.active_sink_name().unwrap().as_str(), FILE);

        setup.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_active_sink_is_an_error() {
        let config = TempConfig {
            log_path: PathBuf::from("unused.log"),
        };

        let err = sink_args(&["--no-file", "--active", "Kafka"])
            .setup(&config)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Kafka"), "{err}");
    }
}
