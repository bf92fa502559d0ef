pub mod watches;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::daemon;
use crate::models::ServerConfig;

/// Media archiver - scheduled playlist downloads with library rescans
#[derive(Parser, Debug)]
#[command(
    name = "archiver",
    version,
    about = "Media archiver - scheduled playlist downloads with library rescans"
)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the web service and watch scheduler
    Serve {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Watches file (overrides config)
        #[arg(long = "watches-file")]
        watches_file: Option<PathBuf>,

        /// Directory for per-watch download archives (overrides config)
        #[arg(long = "archives-dir")]
        archives_dir: Option<PathBuf>,
    },

    /// List stored watches
    Watches {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Watches file (overrides config)
        #[arg(long = "watches-file")]
        watches_file: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one scheduler pass now and exit
    Tick {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Watches file (overrides config)
        #[arg(long = "watches-file")]
        watches_file: Option<PathBuf>,
    },
}

/// Flag values that take precedence over config file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub watches_file: Option<PathBuf>,
    pub archives_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.watches_file {
            config.watches_file = Some(path);
        }
        if let Some(dir) = self.archives_dir {
            config.archives_dir = Some(dir);
        }
    }
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Serve {
            config,
            host,
            port,
            watches_file,
            archives_dir,
        } => {
            let mut server_config = daemon::load_config(config.as_deref())?;
            Overrides {
                host: host.clone(),
                port: *port,
                watches_file: watches_file.clone(),
                archives_dir: archives_dir.clone(),
            }
            .apply(&mut server_config);

            let _log_guard = daemon::init_tracing(cli.verbose, server_config.log_dir.as_deref());
            daemon::start_server(server_config).await
        }
        Commands::Watches {
            config,
            watches_file,
            json,
        } => {
            let mut server_config = daemon::load_config(config.as_deref())?;
            Overrides {
                watches_file: watches_file.clone(),
                ..Default::default()
            }
            .apply(&mut server_config);

            let _log_guard = daemon::init_tracing(cli.verbose, None);
            watches::cmd_watches(&server_config, *json).await
        }
        Commands::Tick {
            config,
            watches_file,
        } => {
            let mut server_config = daemon::load_config(config.as_deref())?;
            Overrides {
                watches_file: watches_file.clone(),
                ..Default::default()
            }
            .apply(&mut server_config);

            let _log_guard = daemon::init_tracing(cli.verbose, server_config.log_dir.as_deref());
            watches::cmd_tick(server_config).await
        }
    }
}
