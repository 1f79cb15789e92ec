//! Command-line host for running the assistant without a chat platform.

pub mod ask;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::cli::ask::{run_ask, run_command};
use crate::core::config::defaults::{DEFAULT_MAX_HISTORY, DEFAULT_MODEL};
use crate::core::config::Config;
use crate::core::history::ConversationStore;


#[derive(Parser)]
#[command(name = "lotb", disable_help_subcommand = true)]
#[command(about = "Tool-augmented LLM assistant for chat bots")]
#[command(
    long_about = "lotb runs the chat bot's LLM assistant from the terminal. Queries go through \
the same path as chat messages: input checks, MCP tool calls and per-chat history.\n\n\
Environment Variables (fallback if no api_key configured):\n\
  LOTB_API_KEY      API key for the completion endpoint\n\
  OPENAI_API_KEY    Used when LOTB_API_KEY is not set\n\
  RUST_LOG          Log filter (default: lotb=info)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// User id the conversation is stored under
    #[arg(short = 'u', long, global = true, default_value_t = 0)]
    pub user: i64,

    /// Chat id the conversation is stored under
    #[arg(long, global = true, default_value_t = 0)]
    pub chat: i64,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Ask the assistant something
    Ask {
        /// Message the query replies to (simple mode only)
        #[arg(short = 'q', long)]
        quote: Option<String>,
        /// The query
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Show tools and resources from the configured MCP servers
    Tools,
    /// Show configuration and loading status
    Status,
    /// Show assistant commands
    Help,
    /// Print the stored conversation for --user/--chat
    History,
    /// Forget the stored conversation for --user/--chat
    Clear,
    /// Validate the configuration file
    Check,
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config_path = match args.config.clone() {
        Some(path) => path,
        None => Config::get_config_path()?,
    };

    match args.command {
        Commands::Init { force } => init_config(&config_path, force),
        Commands::Check => {
            let config = load_config(&config_path)?;
            check_config(&config_path, &config);
            Ok(())
        }
        Commands::History => {
            let config = load_config(&config_path)?;
            print_history(&config, args.user, args.chat)
        }
        Commands::Clear => {
            let config = load_config(&config_path)?;
            let store = open_store(&config)?;
            let removed = store.clear(args.user, args.chat)?;
            println!("✅ Removed {removed} stored messages");
            Ok(())
        }
        Commands::Ask { quote, prompt } => {
            let config = load_config(&config_path)?;
            run_ask(&config, args.user, args.chat, prompt, quote).await
        }
        Commands::Tools => {
            let config = load_config(&config_path)?;
            run_command(&config, args.user, args.chat, "tools").await
        }
        Commands::Status => {
            let config = load_config(&config_path)?;
            run_command(&config, args.user, args.chat, "status").await
        }
        Commands::Help => {
            let config = load_config(&config_path)?;
            run_command(&config, args.user, args.chat, "help").await
        }
    }
}

/// Loads the config and fills a missing api key from the environment.
pub fn load_config(path: &Path) -> Result<Config, Box<dyn Error>> {
    let mut config = Config::load_from_path(path)?;
    if let Some(var) = config.apply_api_key_fallback(|name| std::env::var(name).ok()) {
        info!(var, "Using api key from environment");
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<ConversationStore, Box<dyn Error>> {
    let path = config.database_path()?;
    Ok(ConversationStore::open(&path, config.effective_max_history())?)
}

fn check_config(path: &Path, config: &Config) {
    println!("Config: {}", path.display());
    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✅ No problems found");
    } else {
        for warning in &warnings {
            println!("⚠️  {warning}");
        }
    }
    println!("{}", config.info());
}

fn print_history(config: &Config, user: i64, chat: i64) -> Result<(), Box<dyn Error>> {
    let store = open_store(config)?;
    let turns = store.get_history(user, chat)?;
    if turns.is_empty() {
        println!("No stored messages for user {user} in chat {chat}");
        return Ok(());
    }
    for turn in turns {
        println!(
            "[{}] {}: {}",
            turn.created_at.format("%Y-%m-%d %H:%M:%S"),
            turn.role,
            turn.content
        );
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    if path.exists() && !force {
        eprintln!(
            "⚠️  {} already exists. Use --force to overwrite it.",
            path.display()
        );
        std::process::exit(1);
    }
    starter_config().save_to_path(path)?;
    println!("✅ Wrote starter configuration to {}", path.display());
    Ok(())
}

/// Simple mode with the default model; fill in the api key and servers.
pub fn starter_config() -> Config {
    Config {
        model: Some(DEFAULT_MODEL.to_string()),
        max_history: Some(DEFAULT_MAX_HISTORY),
        ..Default::default()
    }
}
