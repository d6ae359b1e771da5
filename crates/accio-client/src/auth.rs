//! Access token persistence and the `/auth` endpoint.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::pending::Pending;
use crate::transport::{Client, Payload, RequestOptions};

/// Single file holding the access token. Read on every request so that a
/// login from another process is picked up immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<String> {
        let token = fs::read_to_string(&self.path).ok()?;
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    pub fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // `mode` only applies on creation.
            if self.path.exists() {
                fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
            }
        }
        let mut file = options.open(&self.path)?;
        file.write_all(token.as_bytes())?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default, rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Serialize)]
struct Login<'a> {
    password: &'a str,
}

impl Client {
    /// Whether the gateway accepts the current token.
    pub fn check_authenticated(&self) -> Pending<bool> {
        self.get_json::<AuthResponse>("/auth")
            .then(|resp| resp.authenticated)
    }

    /// Logs in with `password`; a returned access token is persisted.
    pub fn authenticate(&self, password: &str) -> Pending<bool> {
        let options = match RequestOptions::method(Method::POST).json(&Login { password }) {
            Ok(options) => options,
            Err(e) => return Pending::ready(Err(e)),
        };
        let tokens = self.tokens().clone();
        self.xhr("/auth", options)
            .then_try(Payload::decode::<AuthResponse>)
            .then_try(move |resp| {
                if resp.authenticated {
                    if let Some(token) = resp.access_token {
                        tokens.save(&token)?;
                        info!(path = %tokens.path().display(), "access token stored");
                    }
                }
                Ok(resp.authenticated)
            })
    }

    pub fn logout(&self) -> Result<()> {
        self.tokens().clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_token_store_cycle() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("sub").join("token"));
        assert_eq!(store.load(), None);
        store.save("abc").unwrap();
        assert_eq!(store.load().as_deref(), Some("abc"));
        store.clear().unwrap();
        assert_eq!(store.load(), None);
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("token");
        let store = TokenStore::new(&path);
        store.save("secret").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        store.save("rotated").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
        assert_eq!(store.load().as_deref(), Some("rotated"));
    }

    #[test]
    fn test_blank_token_is_absent() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("token"));
        store.save("  \n").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_auth_response_defaults() {
        let resp: AuthResponse = serde_json::from_str("{}").unwrap();
        assert!(!resp.authenticated);
        assert!(resp.access_token.is_none());
    }
}
