//! Telegram session management
//!
//! This module provides session storage, the login state machine and a
//! scoped guard that releases the connection on every exit path.

use crate::backend::TelegramClient;
use crate::config::ProxyConfig;
use crate::types::{Error, Result};
use async_trait::async_trait;
use grammers_client::Client;
use grammers_mtsender::{ConnectionParams, SenderPool};
use grammers_session::storages::SqliteSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Outcome of submitting a login code
#[derive(Debug)]
pub enum CodeOutcome<W> {
    SignedIn,
    PasswordRequired { token: W, hint: Option<String> },
}

/// Sign-in operations of the messaging provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    type LoginToken: Send + Sync;
    type PasswordToken: Send + Sync;

    async fn is_authorized(&self) -> Result<bool>;

    /// Ask the provider to send a login code to `phone`
    async fn request_code(&self, phone: &str) -> Result<Self::LoginToken>;

    async fn submit_code(
        &self,
        token: &Self::LoginToken,
        code: &str,
    ) -> Result<CodeOutcome<Self::PasswordToken>>;

    async fn submit_password(&self, token: Self::PasswordToken, password: &str) -> Result<()>;
}

/// Source of the secrets typed in by the user during login
///
/// `None` means the user gave nothing.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn code(&self, phone: &str) -> Result<Option<String>>;

    async fn password(&self, hint: Option<&str>) -> Result<Option<String>>;
}

/// Login progress. Transitions only move forward.
#[derive(Debug)]
pub enum LoginState<L, W> {
    Unauthenticated,
    CodeAwaited(L),
    PasswordAwaited { token: W, hint: Option<String> },
    Authenticated,
}

impl<L, W> LoginState<L, W> {
    pub fn name(&self) -> &'static str {
        match self {
            LoginState::Unauthenticated => "unauthenticated",
            LoginState::CodeAwaited(_) => "code awaited",
            LoginState::PasswordAwaited { .. } => "password awaited",
            LoginState::Authenticated => "authenticated",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginState::Authenticated)
    }
}

/// Type of the login state for a given provider
pub type ProviderLoginState<A> =
    LoginState<<A as AuthProvider>::LoginToken, <A as AuthProvider>::PasswordToken>;

/// Perform a single login transition
pub async fn advance<A, P>(
    provider: &A,
    prompter: &P,
    phone: &str,
    state: ProviderLoginState<A>,
) -> Result<ProviderLoginState<A>>
where
    A: AuthProvider,
    P: Prompter + ?Sized,
{
    match state {
        LoginState::Unauthenticated => {
            if provider.is_authorized().await? {
                info!("Session is already authorized");
                return Ok(LoginState::Authenticated);
            }
            let token = provider.request_code(phone).await?;
            info!("An authentication code has been sent to {}", phone);
            Ok(LoginState::CodeAwaited(token))
        }
        LoginState::CodeAwaited(token) => {
            let code = prompter
                .code(phone)
                .await?
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| Error::AuthFailed("no authentication code entered".to_string()))?;
            match provider.submit_code(&token, code.trim()).await? {
                CodeOutcome::SignedIn => Ok(LoginState::Authenticated),
                CodeOutcome::PasswordRequired { token, hint } => {
                    info!("Two-factor authentication is enabled");
                    Ok(LoginState::PasswordAwaited { token, hint })
                }
            }
        }
        LoginState::PasswordAwaited { token, hint } => {
            let password = prompter
                .password(hint.as_deref())
                .await?
                .filter(|p| !p.is_empty())
                .ok_or(Error::TwoFactorRequired)?;
            provider.submit_password(token, &password).await?;
            Ok(LoginState::Authenticated)
        }
        LoginState::Authenticated => Ok(LoginState::Authenticated),
    }
}

/// Drive the login state machine until the session is authenticated
pub async fn login<A, P>(provider: &A, prompter: &P, phone: &str) -> Result<()>
where
    A: AuthProvider,
    P: Prompter + ?Sized,
{
    let mut state: ProviderLoginState<A> = LoginState::Unauthenticated;
    while !state.is_authenticated() {
        debug!("Login state: {}", state.name());
        state = advance(provider, prompter, phone, state).await?;
    }
    info!("Signed in successfully");
    Ok(())
}

/// Telegram session configuration
pub struct ClientSession {
    /// Session file on disk
    session_file: PathBuf,

    /// SQLite session storage
    session_storage: Arc<SqliteSession>,

    /// API ID
    api_id: i32,

    /// API hash
    api_hash: String,

    /// Proxy URL
    proxy: Option<String>,

    /// The session file did not exist before this run
    created: bool,
}

impl ClientSession {
    /// Open (or create) the session stored in `session_file`
    pub fn new(
        session_file: &Path,
        api_id: i32,
        api_hash: &str,
        proxy: Option<ProxyConfig>,
    ) -> Result<Self> {
        info!("Opening session {:?}", session_file);

        let created = !session_file.exists();
        let session_storage = Arc::new(
            SqliteSession::open(session_file)
                .map_err(|e| Error::Config(format!("Failed to open session: {}", e)))?,
        );

        let proxy_url = match proxy {
            Some(p) => {
                let url = p.to_url()?;
                info!("Using proxy: {}://{}:{}", p.scheme, p.host, p.port);
                Some(url)
            }
            None => None,
        };

        Ok(Self {
            session_file: session_file.to_path_buf(),
            session_storage,
            api_id,
            api_hash: api_hash.to_string(),
            proxy: proxy_url,
            created,
        })
    }

    /// Connect and return a guard owning the client
    pub fn connect(&self) -> SessionGuard {
        let pool = if let Some(ref proxy_url) = self.proxy {
            let params = ConnectionParams {
                proxy_url: Some(proxy_url.clone()),
                ..Default::default()
            };
            SenderPool::with_configuration(Arc::clone(&self.session_storage), self.api_id, params)
        } else {
            SenderPool::new(Arc::clone(&self.session_storage), self.api_id)
        };
        let client = Client::new(&pool);
        let SenderPool { runner, .. } = pool;

        let runner = tokio::spawn(runner.run()).abort_handle();
        debug!("Sender pool runner started");

        SessionGuard {
            client: TelegramClient::new(client, self.api_hash.clone()),
            runner,
            session_file: self.session_file.clone(),
            created: self.created,
            authenticated: false,
        }
    }
}

/// A live connection. Dropping it stops the sender pool and, if this run
/// created the session file but never completed the login, removes it.
/// Sessions stored by earlier runs are always kept.
pub struct SessionGuard {
    client: TelegramClient,
    runner: AbortHandle,
    session_file: PathBuf,
    created: bool,
    authenticated: bool,
}

impl SessionGuard {
    /// Sign in (asking the prompter for a code and password when needed)
    pub async fn sign_in<P: Prompter + ?Sized>(&mut self, phone: &str, prompter: &P) -> Result<()> {
        login(&self.client, prompter, phone).await?;
        self.authenticated = true;
        Ok(())
    }

    /// The signed-in client
    pub fn client(&self) -> Result<&TelegramClient> {
        if self.authenticated {
            Ok(&self.client)
        } else {
            Err(Error::AuthFailed("session is not signed in".to_string()))
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.runner.abort();
        debug!("Sender pool runner stopped");
        if self.created && !self.authenticated {
            match std::fs::remove_file(&self.session_file) {
                Ok(()) => info!("Removed unfinished session {:?}", self.session_file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove session {:?}: {}", self.session_file, e),
            }
        }
    }
}

/// Session file name for a phone number
pub fn session_file_name(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("session_{}.session", digits)
}

/// Delete every stored session in `dir`, returning how many were removed
pub async fn remove_session_files(dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("session_") && name.ends_with(".session") {
            tokio::fs::remove_file(entry.path()).await?;
            info!("Removed session {:?}", entry.path());
            removed += 1;
        }
    }
    Ok(removed)
}
