//! CropManage credential lookup
//!
//! Environment variables win. Otherwise the account name comes from the
//! settings file and the password from the system keychain.

use crate::config::Settings;
use keyring::Entry;
use std::sync::atomic::{AtomicBool, Ordering};

const KEYRING_SERVICE: &str = "cropmanage-agent";

static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    matches!(
        std::env::var("CROPMANAGE_DISABLE_KEYRING")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    )
}

fn keyring_entry(username: &str) -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, username)
}

/// Warn about keychain errors only once per session
fn warn_keychain_error_once(err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!("Couldn't access system keychain: {}", err);
    tracing::warn!("Set CROP_USERNAME and CROP_PASSWORD to bypass the keychain.");
}

/// Read the stored password for `username`.
pub fn get_password(username: &str) -> Result<Option<String>, String> {
    if keyring_disabled() {
        return Ok(None);
    }
    let entry = keyring_entry(username).map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err.to_string()),
    }
}

/// Store the password for `username`.
pub fn set_password(username: &str, password: &str) -> Result<(), String> {
    if keyring_disabled() {
        return Err("Keychain access is disabled (CROPMANAGE_DISABLE_KEYRING)".to_string());
    }
    let entry = keyring_entry(username).map_err(|e| e.to_string())?;
    entry.set_password(password).map_err(|e| e.to_string())
}

/// Work out which account to log in with, if any.
pub fn resolve_credentials(settings: &Settings) -> Option<Credentials> {
    resolve_with(settings, |key| std::env::var(key).ok(), get_password)
}

fn resolve_with(
    settings: &Settings,
    env: impl Fn(&str) -> Option<String>,
    stored: impl Fn(&str) -> Result<Option<String>, String>,
) -> Option<Credentials> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let username = non_empty(env("CROP_USERNAME")).or_else(|| settings.username.clone())?;
    let password = match non_empty(env("CROP_PASSWORD")) {
        Some(password) => password,
        None => match stored(&username) {
            Ok(Some(password)) => password,
            Ok(None) => return None,
            Err(err) => {
                warn_keychain_error_once(&err);
                return None;
            }
        },
    };

    Some(Credentials { username, password })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_credentials_win() {
        let settings = Settings {
            username: Some("from-settings".into()),
            ..Default::default()
        };
        let creds = resolve_with(
            &settings,
            |k| match k {
                "CROP_USERNAME" => Some("grower".into()),
                "CROP_PASSWORD" => Some("secret".into()),
                _ => None,
            },
            |_| panic!("keychain must not be consulted"),
        )
        .unwrap();
        assert_eq!(creds.username, "grower");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_settings_username_with_keychain_password() {
        let settings = Settings {
            username: Some("grower".into()),
            ..Default::default()
        };
        let creds = resolve_with(&settings, |_| None, |user| {
            assert_eq!(user, "grower");
            Ok(Some("stored".into()))
        })
        .unwrap();
        assert_eq!(creds.password, "stored");
    }

    #[test]
    fn test_missing_password_yields_none() {
        let settings = Settings {
            username: Some("grower".into()),
            ..Default::default()
        };
        assert!(resolve_with(&settings, |_| None, |_| Ok(None)).is_none());
        assert!(resolve_with(&settings, |_| None, |_| Err("locked".into())).is_none());
        assert!(resolve_with(&Settings::default(), |_| None, |_| Ok(None)).is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials {
            username: "grower".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("grower"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_keyring_disabled_in_tests() {
        assert_eq!(get_password("anyone"), Ok(None));
        assert!(set_password("anyone", "pw").is_err());
    }
}
