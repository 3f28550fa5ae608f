//! Catalyst Assist - chat with your network through MCP tools

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{chat_command, init_command, status_command, tools_command};

/// Catalyst Assist - network questions answered by an LLM and MCP tools
#[derive(Parser)]
#[command(name = "catalyst")]
#[command(about = "◆ Ask questions about your network in plain language")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config
    Init,
    /// Chat with the assistant
    Chat {
        /// Ask a single question and exit
        #[arg(short, long)]
        message: Option<String>,
        /// Chat history to continue
        #[arg(short, long, default_value = "default")]
        session: String,
    },
    /// List the tools the provider exposes
    Tools,
    /// Show resolved configuration
    Status,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Chat { message, session } => chat_command(message, session).await,
        Commands::Tools => tools_command().await,
        Commands::Status => status_command().await,
    };

    if let Err(e) = result {
        error!("◆ {:#}", e);
        std::process::exit(1);
    }
}
