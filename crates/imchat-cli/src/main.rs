//! imchat command-line client.
//!
//! Reads and writes a JSON message store on disk. Commands that touch
//! message content need the wallet address and the signature it
//! produced over the login message (`imchat login-message`).

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use imchat_types::config::AppConfig;
use output::Printer;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// imchat: wallet-keyed end-to-end encrypted chat.
#[derive(Parser)]
#[command(name = "imchat", version, about)]
struct Cli {
    /// Output in JSON format (no colors, machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// Path of the shared message store.
    #[arg(long, global = true, default_value = "imchat-store.json")]
    store: PathBuf,

    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Wallet address of the local user.
    #[arg(long, global = true, env = "IMCHAT_ADDRESS")]
    address: Option<String>,

    /// Wallet signature over the login message.
    #[arg(long, global = true, env = "IMCHAT_SIGNATURE", hide_env_values = true)]
    signature: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the message the wallet must sign to log in.
    LoginMessage,
    /// Send a text message.
    Send {
        /// Recipient address.
        peer: String,
        /// Message text.
        text: String,
    },
    /// Send an audio file as a voice message.
    SendAudio {
        /// Recipient address.
        peer: String,
        /// Audio file to send.
        file: PathBuf,
        /// MIME type of the recording.
        #[arg(long, default_value = imchat_protocol::message::DEFAULT_AUDIO_MIME)]
        mime: String,
    },
    /// Print a conversation.
    Read {
        /// Peer address.
        peer: String,
    },
    /// Follow a conversation, printing messages as they arrive.
    Watch {
        /// Peer address.
        peer: String,
        /// Stop after this many seconds (default: until Ctrl-C).
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Manage contacts.
    Contact {
        #[command(subcommand)]
        action: commands::contact::ContactAction,
    },
    /// Show or edit profiles.
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
}

// ---------------------------------------------------------------------------
// Global options passed to every command handler
// ---------------------------------------------------------------------------

/// Shared options threaded into command handlers.
pub struct GlobalOpts {
    pub out: Printer,
    pub store: PathBuf,
    pub config: AppConfig,
    pub address: Option<String>,
    pub signature: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let out = Printer::new(cli.json);

    let result = match config::load(cli.config.as_deref()) {
        Ok(app_config) => {
            let opts = GlobalOpts {
                out,
                store: cli.store,
                config: app_config,
                address: cli.address,
                signature: cli.signature,
            };
            dispatch(opts, cli.command).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        out.failure(&e.to_string());
        std::process::exit(1);
    }
}

async fn dispatch(opts: GlobalOpts, cmd: Commands) -> imchat_types::Result<()> {
    match cmd {
        Commands::LoginMessage => commands::message::login_message(&opts),
        Commands::Send { peer, text } => commands::message::send(&opts, &peer, &text).await,
        Commands::SendAudio { peer, file, mime } => {
            commands::message::send_audio(&opts, &peer, &file, &mime).await
        }
        Commands::Read { peer } => commands::message::read(&opts, &peer).await,
        Commands::Watch { peer, seconds } => commands::message::watch(&opts, &peer, seconds).await,
        Commands::Contact { action } => commands::contact::run(action, &opts).await,
        Commands::Profile { action } => commands::profile::run(action, &opts).await,
    }
}
