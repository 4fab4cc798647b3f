use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Actor, Identity};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Buffer before expiry at which the session should be refreshed
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub email: Option<String>,
    pub identity: Identity,
    /// Token lifetime in seconds as issued by the auth service
    pub expires_in: i64,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.expires_in)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        Utc::now() > self.expires_at() - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES)
    }

    pub fn actor(&self) -> Option<Actor> {
        self.identity.actor()
    }
}

pub struct Session {
    cache_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: None,
        }
    }

    /// Load session from disk. Returns false when there is no usable session.
    ///
    /// Expired sessions are still loaded when they carry a refresh token, so
    /// callers can exchange it; `is_valid` tells the two apart.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
            let data: SessionData =
                serde_json::from_str(&contents).context("Failed to parse session file")?;

            if !data.is_expired() || !data.refresh_token.is_empty() {
                self.data = Some(data);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Update session with new data
    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Get the bearer token if session is valid
    pub fn token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .filter(|d| !d.is_expired())
            .map(|d| d.access_token.as_str())
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_expired()).unwrap_or(false)
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppUser;

    fn session_data(created_at: DateTime<Utc>, refresh_token: &str) -> SessionData {
        SessionData {
            access_token: "jwt".to_string(),
            refresh_token: refresh_token.to_string(),
            user_id: "owner-1".to_string(),
            email: Some("owner@tabill.in".to_string()),
            identity: Identity {
                app_user: Some(AppUser {
                    uid: "owner-1".to_string(),
                    name: Some("Asha".to_string()),
                    email: None,
                    phone: None,
                }),
                staff_member: None,
            },
            expires_in: 3600,
            created_at,
        }
    }

    #[test]
    fn test_expiry_and_refresh_window() {
        let fresh = session_data(Utc::now(), "r1");
        assert!(!fresh.is_expired());
        assert!(!fresh.needs_refresh());

        let nearly = session_data(Utc::now() - Duration::minutes(57), "r1");
        assert!(!nearly.is_expired());
        assert!(nearly.needs_refresh());

        let old = session_data(Utc::now() - Duration::hours(2), "r1");
        assert!(old.is_expired());
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(session_data(Utc::now(), "r1"));
        session.save().expect("save");

        let mut loaded = Session::new(dir.path().to_path_buf());
        assert!(loaded.load().expect("load"));
        assert!(loaded.is_valid());
        assert_eq!(loaded.token(), Some("jwt"));
        assert_eq!(
            loaded.data.as_ref().and_then(|d| d.actor()),
            Some(Actor::Owner {
                owner_id: "owner-1".to_string()
            })
        );

        loaded.clear().expect("clear");
        let mut cleared = Session::new(dir.path().to_path_buf());
        assert!(!cleared.load().expect("load"));
    }

    #[test]
    fn test_expired_session_without_refresh_token_is_not_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(session_data(Utc::now() - Duration::hours(2), ""));
        session.save().expect("save");

        let mut loaded = Session::new(dir.path().to_path_buf());
        assert!(!loaded.load().expect("load"));
        assert_eq!(loaded.token(), None);
    }

    #[test]
    fn test_expired_session_with_refresh_token_loads_without_bearer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(session_data(Utc::now() - Duration::hours(2), "r1"));
        session.save().expect("save");

        let mut loaded = Session::new(dir.path().to_path_buf());
        assert!(loaded.load().expect("load"));
        assert!(!loaded.is_valid());
        assert_eq!(loaded.token(), None);
        assert_eq!(
            loaded.data.as_ref().map(|d| d.refresh_token.as_str()),
            Some("r1")
        );
    }
}
