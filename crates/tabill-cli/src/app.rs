use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use tabill_core::api::{ApiClient, ApiError};
use tabill_core::auth::{CredentialStore, Session, SessionData};
use tabill_core::branch::{ActiveBranchResolver, BranchState};
use tabill_core::models::Actor;
use tabill_core::shell::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
use tabill_core::storage::FileLocalStorage;
use tabill_core::Config;

/// Shell bucket directory inside the cache directory
const SHELL_CACHE_DIR: &str = "shell";

pub struct App {
    pub config: Config,
    pub session: Session,
    pub api: ApiClient,
    cache_dir: PathBuf,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(supabase_url = %config.supabase_url, app_origin = %config.app_origin, "Config loaded");

        let cache_dir = config
            .cache_dir()
            .unwrap_or_else(|_| PathBuf::from("./cache"));

        let mut session = Session::new(cache_dir.clone());
        let load_result = session.load();
        debug!(?load_result, has_data = session.data.is_some(), "Session loaded");

        let mut api = ApiClient::new(&config)?;
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        Ok(Self {
            config,
            session,
            api,
            cache_dir,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        if email.is_empty() || password.is_empty() {
            anyhow::bail!("Email and password required");
        }

        let session_data = match self.api.sign_in(email, password).await {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "Login failed");
                let message = match e.downcast_ref::<ApiError>() {
                    Some(ApiError::InvalidCredentials) => "Invalid email or password".to_string(),
                    Some(ApiError::NetworkError(_)) => {
                        "Unable to connect to server. Check your internet connection.".to_string()
                    }
                    _ => format!("Login failed: {}", e),
                };
                return Err(anyhow::anyhow!(message));
            }
        };

        if let Err(e) = CredentialStore::store(email, password) {
            warn!(error = %e, "Failed to store credentials");
        }

        self.config.last_email = Some(email.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        self.adopt(session_data);
        info!("Login successful");
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        if let Some(ref email) = self.config.last_email {
            if let Err(e) = CredentialStore::delete(email) {
                debug!(error = %e, "No stored credentials to delete");
            }
        }
        self.session.clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Return a usable session, refreshing or re-authenticating from the
    /// keychain when the token is about to expire.
    pub async fn ensure_session(&mut self) -> Result<SessionData> {
        let data = self
            .session
            .data
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `tabill login` first."))?;

        if !data.needs_refresh() {
            return Ok(data);
        }

        debug!("Session needs refresh");
        match self.api.refresh_session(&data.refresh_token).await {
            Ok(fresh) => {
                self.adopt(fresh.clone());
                return Ok(fresh);
            }
            Err(e) => warn!(error = %e, "Session refresh failed"),
        }

        let email = data
            .email
            .clone()
            .or_else(|| self.config.last_email.clone())
            .context("Session expired. Run `tabill login` again.")?;
        let password = CredentialStore::get_password(&email)
            .context("Session expired. Run `tabill login` again.")?;
        self.login(&email, &password).await?;
        self.session
            .data
            .clone()
            .context("Session missing after login")
    }

    fn adopt(&mut self, data: SessionData) {
        self.api.set_token(data.access_token.clone());
        self.session.update(data);
        if let Err(e) = self.session.save() {
            warn!(error = %e, "Failed to save session");
        }
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Resolve the active branch for the signed-in actor.
    pub async fn resolve_branches(
        &mut self,
    ) -> Result<(
        Option<Actor>,
        ActiveBranchResolver<ApiClient, FileLocalStorage>,
        BranchState,
    )> {
        let session = self.ensure_session().await?;
        let actor = session.actor();
        let storage = FileLocalStorage::open(&self.config.data_dir()?)?;
        let resolver = ActiveBranchResolver::new(self.api.clone(), storage);
        resolver.set_actor(actor.clone()).await;
        let state = resolver.snapshot().await;
        Ok((actor, resolver, state))
    }

    // =========================================================================
    // Shell cache
    // =========================================================================

    pub fn shell_storage(&self) -> Result<Arc<dyn CacheStorage>> {
        if self.config.shell_cache {
            let root = self.cache_dir.join(SHELL_CACHE_DIR);
            Ok(Arc::new(DiskCacheStorage::new(root)?))
        } else {
            Ok(Arc::new(MemoryCacheStorage::new()))
        }
    }
}
