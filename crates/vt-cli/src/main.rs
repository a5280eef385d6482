//! vm-tunnel CLI
//!
//! Interactive SSH sessions and port forwards into VMs that are reachable
//! only through a WebSocket proxy.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vm_tunnel::api::ApiClient;
use vm_tunnel::commands;
use vm_tunnel::output::{print_error, set_quiet};
use vt_core::config;
use vt_core::{OutputFormat, SessionConfig};

#[derive(Parser)]
#[command(name = "vm-tunnel")]
#[command(author, version, about = "SSH into VMs over a WebSocket tunnel")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// VM API base URL (overrides the config file)
    #[arg(long, global = true, env = "VM_TUNNEL_API_URL")]
    api_url: Option<String>,

    /// VM API key
    #[arg(long, global = true, env = "VM_TUNNEL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive SSH session to a VM
    ///
    /// By default an ephemeral ed25519 keypair is generated for the session
    /// and removed when it ends. Port forwards use standard ssh syntax:
    ///   -L localport:host:remoteport   forward a local port to the VM
    ///   -R remoteport:host:localport   expose a local port on the VM
    Ssh {
        /// VM identifier
        vm_id: String,
        /// Path to SSH private key (generates an ephemeral key if omitted)
        #[arg(short = 'i', long = "identity")]
        identity: Option<PathBuf>,
        /// Local port forwarding (localport:host:remoteport)
        #[arg(short = 'L', long = "local-forward")]
        local_forward: Option<String>,
        /// Remote port forwarding (remoteport:host:localport)
        #[arg(short = 'R', long = "remote-forward")]
        remote_forward: Option<String>,
        /// Set up SSH on the VM without connecting
        #[arg(long)]
        setup_only: bool,
        /// Format of the --setup-only report
        #[arg(short, long, value_enum, default_value_t = OutputArg::Text)]
        output: OutputArg,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
    /// Write a config file with all defaults
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputArg {
    Text,
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Text => OutputFormat::Text,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    set_quiet(cli.quiet);

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ssh {
            vm_id,
            identity,
            local_forward,
            remote_forward,
            setup_only,
            output,
        } => {
            let mut file = config::load_or_default(cli.config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(url) = cli.api_url {
                file.api.base_url = url;
            }

            let session = SessionConfig {
                vm_id,
                identity_file: identity,
                local_forward,
                remote_forward,
                setup_only,
                output: output.into(),
            };

            let client =
                ApiClient::new(&file.api, cli.api_key).context("Failed to create API client")?;
            let cancel = CancellationToken::new();
            let mut stdout = std::io::stdout();
            commands::ssh_command(&client, &session, &file, &cancel, &mut stdout).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_deref())?,
            ConfigAction::Path => commands::config_path(cli.config.as_deref())?,
            ConfigAction::Init { force } => commands::config_init(cli.config.as_deref(), force)?,
        },
    }

    Ok(())
}
