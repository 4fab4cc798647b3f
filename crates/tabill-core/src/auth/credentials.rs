use anyhow::{Context, Result};
use keyring::Entry;

/// Keychain service the sign-in password is filed under, keyed by email
const SERVICE_NAME: &str = "tabill";

/// Sign-in passwords kept in the OS keychain so an expired session can be
/// re-established without prompting.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(email: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, email)
            .with_context(|| format!("Failed to open keychain entry for {}", email))
    }

    pub fn store(email: &str, password: &str) -> Result<()> {
        Self::entry(email)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    pub fn get_password(email: &str) -> Result<String> {
        Self::entry(email)?
            .get_password()
            .context("No stored password in keychain")
    }

    pub fn delete(email: &str) -> Result<()> {
        Self::entry(email)?
            .delete_credential()
            .context("Failed to delete password from keychain")
    }
}
