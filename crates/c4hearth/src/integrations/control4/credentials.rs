//! Director credentials.
//!
//! The director bearer token expires and is refreshed outside this crate.
//! Handles ask a [`TokenProvider`] for the token every time they are built, so
//! a refreshed token is picked up without re-creating any entity.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to read token file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Token file {0} is empty")]
    Empty(PathBuf),
}

/// Source of the current director bearer token
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String, CredentialError>;
}

/// A token fixed at startup
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}

/// A token read from disk on every request, for setups where another
/// process keeps the file fresh.
#[derive(Debug, Clone)]
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenProvider for FileToken {
    fn bearer_token(&self) -> Result<String, CredentialError> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| CredentialError::Io(self.path.clone(), e))?;
        let token = contents.trim();
        if token.is_empty() {
            return Err(CredentialError::Empty(self.path.clone()));
        }
        Ok(token.to_string())
    }
}

/// An in-memory token that another task can replace at any time.
#[derive(Debug, Clone)]
pub struct SharedToken {
    token: Arc<ArcSwap<String>>,
}

impl SharedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(ArcSwap::from_pointee(token.into())),
        }
    }

    /// Replace the token; handles built afterwards use the new one.
    pub fn update(&self, token: impl Into<String>) {
        self.token.store(Arc::new(token.into()));
    }
}

impl TokenProvider for SharedToken {
    fn bearer_token(&self) -> Result<String, CredentialError> {
        Ok(String::clone(&self.token.load()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.bearer_token().unwrap(), "abc");
    }

    #[test]
    fn test_file_token_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "first\n").unwrap();

        let provider = FileToken::new(&path);
        assert_eq!(provider.bearer_token().unwrap(), "first");

        std::fs::write(&path, "second").unwrap();
        assert_eq!(provider.bearer_token().unwrap(), "second");
    }

    #[test]
    fn test_file_token_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = FileToken::new(dir.path().join("missing"));
        assert!(matches!(
            missing.bearer_token(),
            Err(CredentialError::Io(_, _))
        ));

        let path = dir.path().join("empty");
        std::fs::write(&path, "  \n").unwrap();
        let empty = FileToken::new(&path);
        assert!(matches!(empty.bearer_token(), Err(CredentialError::Empty(_))));
    }

    #[test]
    fn test_shared_token_update_is_visible_to_clones() {
        let provider = SharedToken::new("old");
        let clone = provider.clone();

        provider.update("new");
        assert_eq!(clone.bearer_token().unwrap(), "new");
    }
}
