//! TG Wordcloud - word clouds from Telegram chats
//!
//! Signs in to Telegram, downloads every post of a channel or chat and
//! renders a word cloud with English, Ukrainian and Russian stopwords removed.

mod backend;
mod config;
mod frontend;
mod history;
mod link;
mod render;
mod session;
mod stopwords;
mod types;
mod utils;

use anyhow::Result;
use clap::Parser;
use history::CancelFlag;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tg-wordcloud")]
#[command(about = "Generate a word cloud from the posts of a Telegram channel or chat")]
#[command(version)]
struct Args {
    /// Channel or chat link (e.g. https://t.me/channelname or https://t.me/c/123456789/1)
    link: Option<String>,

    /// Path to config file
    #[arg(short = 'c', long, default_value = "wordcloud.yaml")]
    config: PathBuf,

    /// Telegram API ID
    #[arg(long, env = "TG_API_ID")]
    api_id: Option<String>,

    /// Telegram API hash
    #[arg(long, env = "TG_API_HASH", hide_env_values = true)]
    api_hash: Option<String>,

    /// Phone number with country code (e.g. +441234567890)
    #[arg(long, env = "TG_PHONE")]
    phone: Option<String>,

    /// Output SVG file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Delete stored sessions before doing anything else
    #[arg(long)]
    reset: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    init_logging(args.debug);

    info!("Starting tg-wordcloud, reading config {:?}", args.config);

    let mut config = config::Config::from_file(&args.config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config.apply_overrides(args.api_id, args.api_hash, args.phone, args.output);

    if args.reset {
        let removed = session::remove_session_files(&config.session_dir())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to reset session: {}", e))?;
        info!("Session reset successfully ({} removed)", removed);
    }

    let Some(link) = args.link else {
        if args.reset {
            return Ok(ExitCode::SUCCESS);
        }
        eprintln!("❌ Please enter a channel or chat link.");
        return Ok(ExitCode::FAILURE);
    };

    match run(&config, &link).await {
        Ok(path) => {
            eprintln!("Wordcloud generated: {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ types::Error::EmptyCorpus) => {
            warn!("Nothing to render for {}", link);
            eprintln!("{}", frontend::user_message(&e));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Failed to generate wordcloud: {}", e);
            eprintln!("{}", frontend::user_message(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Sign in, fetch `link` and render it; the session is released on return
async fn run(config: &config::Config, link: &str) -> types::Result<PathBuf> {
    let credentials = config.credentials()?;
    let channel =
        link::resolve(link).ok_or_else(|| types::Error::LinkNotRecognized(link.to_string()))?;

    config.ensure_dirs_exist().await?;

    let wc = &config.wordcloud;
    let stopwords =
        stopwords::build_stopwords(&wc.languages, &wc.extra_stopwords, &wc.stopword_files)
            .await?;

    let session_file = config
        .session_dir()
        .join(session::session_file_name(&credentials.phone));
    let session = session::ClientSession::new(
        &session_file,
        credentials.api_id,
        &credentials.api_hash,
        config.parse_proxy(),
    )?;

    let mut guard = session.connect();
    info!("Signing in to Telegram...");
    guard
        .sign_in(&credentials.phone, &frontend::TerminalPrompter)
        .await?;

    let output = wc
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("wordcloud_{}.svg", channel.label())));
    let renderer = render::WordCloudRenderer::new(wc.clone(), output);

    let cancel = CancelFlag::new();
    let ctrl_c = spawn_cancel_on_ctrl_c(cancel.clone());

    let result =
        frontend::run_wordcloud(guard.client()?, &channel, &stopwords, &renderer, &cancel).await;
    ctrl_c.abort();
    result
}

/// First Ctrl+C stops the download at the next message, a second one exits
fn spawn_cancel_on_ctrl_c(cancel: CancelFlag) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current message");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    })
}

fn init_logging(debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    // Set app logs to info/debug, but suppress verbose third-party logs
    let default_filter = "grammers_mtsender=warn,grammers_mtproto=warn,grammers_client=warn,grammers_session=warn,tantivy=warn";
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(format!("info,{}", default_filter))
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
}
