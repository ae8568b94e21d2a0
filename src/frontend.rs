//! Terminal frontend
//!
//! Prompts for login secrets, shows download progress and runs the
//! history → word cloud workflow.

/// Print a progress line at least this often (in messages) when the total is unknown
const PROGRESS_PRINT_INTERVAL: usize = 50;

use crate::history::{CancelFlag, HistoryProvider, fetch_history};
use crate::render::RenderSink;
use crate::session::Prompter;
use crate::types::{ChannelRef, Error, FetchProgress, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Reads the login code from stdin and the password without echo
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn code(&self, phone: &str) -> Result<Option<String>> {
        eprint!("Enter the verification code sent to {}: ", phone);
        std::io::stderr().flush()?;

        let mut code = String::new();
        std::io::stdin().read_line(&mut code)?;
        let code = code.trim();
        Ok((!code.is_empty()).then(|| code.to_string()))
    }

    async fn password(&self, hint: Option<&str>) -> Result<Option<String>> {
        let password = rpassword::prompt_password(format!(
            "Enter your 2FA password (hint: {}): ",
            hint.unwrap_or("None")
        ))?;
        let password = password.trim_end_matches(['\r', '\n']);
        Ok((!password.is_empty()).then(|| password.to_string()))
    }
}

/// Human-readable text for an error shown to the user
pub fn user_message(e: &Error) -> String {
    match e {
        Error::EmptyCorpus => "⚠️ No posts found or an error occurred during download.".to_string(),
        Error::TwoFactorRequired => {
            "❌ Two-factor authentication is enabled. Please enter your password.".to_string()
        }
        Error::CredentialsMissing
        | Error::InvalidNumericId(_)
        | Error::AuthFailed(_)
        | Error::LinkNotRecognized(_)
        | Error::ResolutionFailed(_)
        | Error::Interrupted(_)
        | Error::Config(_) => format!("❌ {}", e),
        _ => format!("❌ Error: {}", e),
    }
}

/// One progress line
pub fn format_progress(progress: &FetchProgress) -> String {
    match progress.percent {
        Some(percent) => format!(
            "Downloaded {} posts out of {} ({}%)",
            progress.seen, progress.estimated_total, percent
        ),
        None => format!("Downloaded {} posts", progress.seen),
    }
}

/// Spawn a task that prints progress updates received on the returned sender
///
/// A line is printed whenever the percentage changes, or every
/// [`PROGRESS_PRINT_INTERVAL`] messages when the total is unknown.
pub fn spawn_progress_printer() -> (mpsc::UnboundedSender<FetchProgress>, JoinHandle<()>) {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<FetchProgress>();

    let task = tokio::spawn(async move {
        let mut last_percent: Option<u8> = None;
        let mut last: Option<FetchProgress> = None;
        while let Some(progress) = progress_rx.recv().await {
            let print = match progress.percent {
                Some(percent) => last_percent != Some(percent),
                None => progress.seen.is_multiple_of(PROGRESS_PRINT_INTERVAL),
            };
            if print {
                eprint!("\r{}", format_progress(&progress));
                let _ = std::io::stderr().flush();
                last_percent = progress.percent;
            }
            last = Some(progress);
        }
        if let Some(progress) = last {
            eprintln!("\r{}", format_progress(&progress));
        }
    });

    (progress_tx, task)
}

/// Download the history of `channel` and render the corpus
///
/// Returns the path of the rendered artifact. [`Error::EmptyCorpus`] means
/// there was nothing to render; callers treat it as a warning.
pub async fn run_wordcloud<P, R>(
    provider: &P,
    channel: &ChannelRef,
    stopwords: &HashSet<String>,
    renderer: &R,
    cancel: &CancelFlag,
) -> Result<PathBuf>
where
    P: HistoryProvider,
    R: RenderSink + ?Sized,
{
    info!("Processing channel {} ({})", channel, channel.canonical_link());

    let (progress_tx, printer) = spawn_progress_printer();
    let progress_callback = move |progress: FetchProgress| {
        let _ = progress_tx.send(progress);
    };

    let result = fetch_history(provider, channel, Some(progress_callback), cancel).await;
    // The callback (and with it the sender) is gone, so the printer drains and exits
    printer.await?;
    let outcome = result?;

    if outcome.corpus.is_empty() {
        warn!("No text messages in {}", channel);
        return Err(Error::EmptyCorpus);
    }

    info!(
        "Collected {} text messages out of {}",
        outcome.corpus.len(),
        outcome.progress.seen
    );
    renderer.render(&outcome.corpus.joined(), stopwords).await
}
