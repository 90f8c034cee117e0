use clap::{Parser, Subcommand};

pub mod config;
pub mod init_account;
pub mod operations;
pub mod run;
pub mod version;

#[derive(Parser)]
#[command(name = "groupd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Group management and identity trust daemon", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve newline-delimited JSON requests on stdin/stdout
    Run {
        /// Path to configuration file
        #[arg(long)]
        config: Option<String>,

        /// Directory of account snapshots (overrides the config file)
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Create a local snapshot for a new account
    InitAccount {
        /// Account number in E.164 format (e.g., +12024561414)
        #[arg(long)]
        number: String,

        /// Stable account id (generated if not specified)
        #[arg(long)]
        uuid: Option<String>,

        /// Path to configuration file
        #[arg(long)]
        config: Option<String>,

        /// Directory of account snapshots (overrides the config file)
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Print every operation's schema as JSON
    Operations,

    /// Show version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config, data_dir } => run::execute(config, data_dir).await,
        Commands::InitAccount {
            number,
            uuid,
            config,
            data_dir,
        } => init_account::execute(config, data_dir, number, uuid).await,
        Commands::Operations => operations::execute(),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
