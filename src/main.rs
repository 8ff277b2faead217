use clap::{Parser, Subcommand};
use parley::chat::{HistoryGateway, HttpGateway, SessionFilter};
use parley::core::config::{self, ResolvedConfig};
use parley::core::conversation::{Character, Conversation};
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::File;

#[derive(Parser)]
#[command(name = "parley", about = "Talk to the characters of a document")]
struct Args {
    /// Chat service base URL (overrides config and PARLEY_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a conversation with one character
    Chat {
        /// Document the character belongs to
        #[arg(long)]
        document: String,
        /// Character identifier
        #[arg(long)]
        character: String,
        /// Display name, also used by the local greeting
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List stored conversations for a document
    Sessions {
        #[arg(long)]
        document: String,
    },
}

fn init_logging(config: &ResolvedConfig) {
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();

    if let Ok(log_file) = File::create(&config.log_file) {
        let _ = WriteLogger::init(config.log_level, log_config, log_file);
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let (file_config, origin) = match config::load_config() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Ignoring unreadable config: {e}");
            (config::ParleyConfig::default(), config::ConfigOrigin::Defaults)
        }
    };
    let resolved = config::resolve(&file_config, args.base_url.as_deref());
    init_logging(&resolved);

    // Logging starts after the config is read, so repeat what loading found
    for notice in config::startup_notices(&origin, &resolved) {
        eprintln!("{notice}");
        log::warn!("{notice}");
    }
    log::info!("Parley starting up against {} ({:?})", resolved.base_url, origin);

    match args.command {
        Command::Chat {
            document,
            character,
            name,
            description,
        } => {
            let conversation = Conversation::new(document, Character::new(character, name, description));
            parley::tui::run(resolved, conversation).await
        }
        Command::Sessions { document } => list_sessions(&resolved, &document).await,
    }
}

async fn list_sessions(config: &ResolvedConfig, document: &str) -> std::io::Result<()> {
    let gateway = HttpGateway::new(config.base_url.clone(), config.request_timeout);
    let filter = SessionFilter::new(config.hidden_characters.clone());

    let sessions = match gateway.list_sessions(document).await {
        Ok(sessions) => filter.apply(sessions),
        Err(e) => {
            log::error!("Listing sessions failed: {e}");
            return Err(std::io::Error::other(e));
        }
    };

    if sessions.is_empty() {
        println!("No stored conversations for {document}");
        return Ok(());
    }
    for session in sessions {
        let name = session.character_name.as_deref().unwrap_or("-");
        match session.message_count {
            Some(count) => println!("{}\t{}\t{} messages", session.character_id, name, count),
            None => println!("{}\t{}", session.character_id, name),
        }
    }
    Ok(())
}
