//! Binary entrypoint for the questbot CLI.
//!
//! Commands:
//! - `start` - run the bot over the JSON-lines stdio transport
//! - `init` - write a starter `config.toml` and the default quest catalog
//! - `status` - print store statistics and configuration summary
//!
//! Replies go to stdout, so all logging goes to stderr and the optional log files.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use questbot::bot::BotServer;
use questbot::config::Config;
use questbot::storage::{default_quest_seeds, BotStore};
use questbot::transport;

#[derive(Parser)]
#[command(name = "questbot")]
#[command(about = "Chat bot with onboarding, coins, XP, quests and friends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot, reading events from stdin and writing replies to stdout
    Start,
    /// Write a default configuration and quest catalog
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Show store statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting questbot v{}", env!("CARGO_PKG_VERSION"));
            let server = BotServer::new(config)?;
            let (inbound, outbound) = transport::spawn_stdio();
            server.run(inbound, outbound).await?;
        }
        Commands::Init { force } => {
            init_logging(&None, cli.verbose);
            if !force && tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                anyhow::bail!("{} already exists (use --force to overwrite)", cli.config);
            }
            let mut config = Config::default();
            tokio::fs::create_dir_all(&config.storage.data_dir).await?;
            let seed_path = format!("{}/quests.json", config.storage.data_dir);
            let seeds = serde_json::to_string_pretty(&default_quest_seeds())?;
            tokio::fs::write(&seed_path, seeds).await?;
            config.storage.quest_seed_file = Some(seed_path.clone());

            let serialized = toml::to_string_pretty(&config)?;
            tokio::fs::write(&cli.config, serialized).await?;
            info!("Configuration file created at {}", cli.config);
            info!("Quest catalog written to {}", seed_path);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let store = BotStore::open(config.storage.db_path())?;
            let stats = store.statistics()?;
            println!("{} status", config.bot.name);
            println!("  data dir:         {}", config.storage.data_dir);
            println!("  users:            {}", stats.users);
            println!("  pending consents: {}", stats.pending_consents);
            println!("  quests:           {} ({} active)", stats.quests_total, stats.quests_active);
            println!("  friendships:      {}", stats.friendships);
            println!("  privileged ids:   {}", config.bot.privileged.len());
            println!("  banned ids:       {}", config.bot.banned.len());
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    let config_level = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let level = match verbosity {
        0 => config_level,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config.as_ref().and_then(|c| c.logging.file.as_ref()).and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());
    let file = log_file.map(|f| std::sync::Arc::new(std::sync::Mutex::new(f)));
    // Only echo to the console when someone is watching it.
    let echo = file.is_none() || atty::is(atty::Stream::Stderr);

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());

        if let Some(ref file) = file {
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
        }
        if record.target() == "security" {
            if let Some(ref sec_path) = security_path {
                if let Ok(mut sf) = std::fs::OpenOptions::new().create(true).append(true).open(sec_path) {
                    let _ = writeln!(sf, "{}", line);
                }
            }
        }
        if echo {
            writeln!(fmt, "{}", line)
        } else {
            Ok(())
        }
    });
    let _ = builder.try_init();
}
