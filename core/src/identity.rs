//! Per-user identity sent in the `X-User-ID` header.
//!
//! # Design
//! The client never reads ambient state directly. An `IdentityProvider` is
//! injected at construction and asked for the identity on every call, so
//! whoever owns the identity (a key file, the environment, a test) can change
//! it between calls. When the provider has nothing, a timestamp fallback is
//! generated for that call only and is not stored anywhere.
//!
//! Two fallbacks generated within the same millisecond are identical.

use std::path::PathBuf;

use chrono::Utc;

/// Read-only access to a stored identity.
pub trait IdentityProvider: Send + Sync {
    /// The stored identity, or `None` if nothing has been stored yet.
    fn read_identity(&self) -> Option<String>;
}

/// A fixed identity.
#[derive(Debug, Clone)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl IdentityProvider for StaticIdentity {
    fn read_identity(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Provider that never has an identity; every call uses the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentityProvider for NoIdentity {
    fn read_identity(&self) -> Option<String> {
        None
    }
}

/// Reads the identity from an environment variable at call time.
#[derive(Debug, Clone)]
pub struct EnvIdentity {
    var: String,
}

impl EnvIdentity {
    pub const DEFAULT_VAR: &'static str = "EDTECH_USER_ID";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvIdentity {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl IdentityProvider for EnvIdentity {
    fn read_identity(&self) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}

/// Reads the identity from a file maintained by an external store.
///
/// Surrounding whitespace is trimmed. A missing or unreadable file counts as
/// "no identity".
#[derive(Debug, Clone)]
pub struct FileIdentity {
    path: PathBuf,
}

impl FileIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IdentityProvider for FileIdentity {
    fn read_identity(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents.trim().to_string()),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "identity file not readable");
                None
            }
        }
    }
}

/// `"user_" + <unix time in milliseconds>`.
pub fn fallback_identity() -> String {
    format!("user_{}", Utc::now().timestamp_millis())
}

/// The provider's identity with surrounding whitespace removed, or a fresh
/// fallback when nothing is left.
///
/// Trimming here keeps the header and any body field identical: header
/// values lose surrounding whitespace on the wire.
pub fn resolve_identity(provider: &dyn IdentityProvider) -> String {
    let stored = provider.read_identity();
    match stored.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = fallback_identity();
            tracing::debug!(identity = %id, "no stored identity, using fallback");
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_identity_is_used_as_is() {
        let id = resolve_identity(&StaticIdentity::new("user_42"));
        assert_eq!(id, "user_42");
    }

    #[test]
    fn missing_identity_falls_back_to_timestamp() {
        let id = resolve_identity(&NoIdentity);
        let millis = id.strip_prefix("user_").expect("fallback prefix");
        assert!(millis.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn empty_identity_falls_back() {
        let id = resolve_identity(&StaticIdentity::new(""));
        assert!(id.starts_with("user_"));
        assert!(id.len() > "user_".len());
    }

    #[test]
    fn whitespace_identity_falls_back() {
        let id = resolve_identity(&StaticIdentity::new("  \t "));
        assert!(id.starts_with("user_"));
        assert!(id["user_".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn padded_identity_is_trimmed() {
        assert_eq!(resolve_identity(&StaticIdentity::new(" user_9\n")), "user_9");
    }

    #[test]
    fn non_ascii_identity_is_kept() {
        assert_eq!(resolve_identity(&StaticIdentity::new("usuário_7")), "usuário_7");
    }

    #[test]
    fn fallbacks_are_not_guaranteed_unique() {
        // Same-millisecond fallbacks collide; only the shape is stable.
        let a = fallback_identity();
        let b = fallback_identity();
        assert!(a.starts_with("user_") && b.starts_with("user_"));
        assert!(a["user_".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn file_identity_reads_trimmed_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_id");
        std::fs::write(&path, "user_file_7\n").unwrap();
        assert_eq!(
            FileIdentity::new(&path).read_identity().as_deref(),
            Some("user_file_7")
        );
    }

    #[test]
    fn file_identity_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileIdentity::new(dir.path().join("nope"));
        assert!(provider.read_identity().is_none());
    }

    #[test]
    fn env_identity_reads_variable_at_call_time() {
        let var = "EDTECH_TEST_IDENTITY_VAR";
        let provider = EnvIdentity::new(var);
        std::env::remove_var(var);
        assert!(provider.read_identity().is_none());
        std::env::set_var(var, "user_env");
        assert_eq!(provider.read_identity().as_deref(), Some("user_env"));
        std::env::set_var(var, "  ");
        assert!(resolve_identity(&provider).starts_with("user_"));
        std::env::remove_var(var);
    }
}
