//! Remote content store abstraction.
//!
//! The deploy stages only need two operations: create a directory and write
//! a file. [`webdav::WebDavStore`] implements them over WebDAV; tests use an
//! in-memory store.

pub mod digest;
pub mod webdav;

use crate::error::Result;

pub use webdav::WebDavStore;

/// Result of a successful `mkdir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MkdirOutcome {
    Created,
    AlreadyExists,
}

/// Account used to authenticate against the remote store.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Operations the deploy pipeline performs against the content host.
///
/// `mkdir` reports an existing directory as [`MkdirOutcome::AlreadyExists`]
/// rather than an error. `write_file` overwrites.
pub trait RemoteStore: Send + Sync {
    fn mkdir(&self, path: &str) -> Result<MkdirOutcome>;
    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()>;
}

/// Create `paths` in order. An existing directory counts as success; any
/// other failure stops at that path.
pub fn ensure_dirs(store: &dyn RemoteStore, paths: &[String]) -> Result<Vec<MkdirOutcome>> {
    let mut outcomes = Vec::with_capacity(paths.len());
    for path in paths {
        let outcome = store.mkdir(path)?;
        crate::log_status!("remote", "mkdir {} ({:?})", path, outcome);
        outcomes.push(outcome);
    }
    Ok(outcomes)
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn ensure_dirs_treats_existing_as_success() {
        let store = MemoryStore::new().with_dir("/content/b2b-portal");
        let paths = vec![
            "/content/b2b-portal".to_string(),
            "/content/b2b-portal/v1".to_string(),
        ];

        let outcomes = ensure_dirs(&store, &paths).unwrap();
        assert_eq!(outcomes, vec![MkdirOutcome::AlreadyExists, MkdirOutcome::Created]);
    }

    #[test]
    fn ensure_dirs_stops_on_other_failures() {
        let store = MemoryStore::new();
        store.fail_mkdir("/content/b2b-portal/v1");
        let paths = vec![
            "/content/b2b-portal/v1".to_string(),
            "/content/b2b-portal/v1/assets".to_string(),
        ];

        let err = ensure_dirs(&store, &paths).unwrap_err();
        assert_eq!(err.code, ErrorCode::RemoteMkdirFailed);
        assert_eq!(store.mkdir_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials {
            username: "deploy@example.com".to_string(),
            secret: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
