//! Scoped rewrite of the storefront `.env` for the duration of a build.
//!
//! `acquire` snapshots the file, rewrites the placeholder lines and returns an
//! [`EnvGuard`]. The snapshot is restored exactly once, by whichever comes
//! first: an explicit [`EnvGuard::release`], the drop of the last guard
//! handle, or [`restore_all`] from the interrupt handler.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use crate::error::{Error, Result};
use crate::local_files::{local, FileSystem};

/// Captured bytes of the file at acquisition time.
struct EnvSnapshot {
    original: Vec<u8>,
}

struct PatchState {
    path: PathBuf,
    snapshot: Mutex<Option<EnvSnapshot>>,
}

impl PatchState {
    fn is_active(&self) -> bool {
        lock(&self.snapshot).is_some()
    }

    fn release(&self) -> Result<bool> {
        let mut slot = lock(&self.snapshot);
        let Some(snapshot) = slot.take() else {
            return Ok(false);
        };

        if let Err(err) = local().write(&self.path, &snapshot.original) {
            // Keep the snapshot so a later release path can retry.
            *slot = Some(snapshot);
            return Err(err);
        }

        eprintln!("[env] Restored {}", self.path.display());
        Ok(true)
    }
}

impl Drop for PatchState {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            eprintln!(
                "[env] Failed to restore {}: {}",
                self.path.display(),
                err.message
            );
        }
    }
}

/// Handle to an active patch. Clones share the same snapshot.
#[derive(Clone)]
pub struct EnvGuard {
    state: Arc<PatchState>,
    unmatched: Vec<String>,
}

impl std::fmt::Debug for EnvGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvGuard")
            .field("path", &self.state.path)
            .field("active", &self.is_active())
            .finish()
    }
}

impl EnvGuard {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Placeholder keys that had no line in the file.
    pub fn unmatched_keys(&self) -> &[String] {
        &self.unmatched
    }

    /// Write the original bytes back. Returns `false` if already released.
    pub fn release(&self) -> Result<bool> {
        self.state.release()
    }
}

/// Tracks active patches so an interrupt can restore them.
pub struct PatchRegistry {
    active: Mutex<Vec<Weak<PatchState>>>,
}

impl Default for PatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(&self, path: &Path, replacements: &[(String, String)]) -> Result<EnvGuard> {
        let mut active = lock(&self.active);
        active.retain(|weak| weak.strong_count() > 0);

        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let already_patched = active
            .iter()
            .filter_map(Weak::upgrade)
            .any(|state| state.path == path && state.is_active());
        if already_patched {
            return Err(Error::env_patch_active(path.display().to_string()));
        }

        let original = std::fs::read(&path)
            .map_err(|e| Error::config_read(path.display().to_string(), e.to_string()))?;
        let text = std::str::from_utf8(&original).map_err(|e| {
            Error::config_read(path.display().to_string(), format!("not valid UTF-8: {}", e))
        })?;

        let (patched, unmatched) = patch_content(text, replacements);
        local().write(&path, patched.as_bytes())?;

        for key in &unmatched {
            eprintln!("[env] Warning: {} not found in {}", key, path.display());
        }

        let state = Arc::new(PatchState {
            path,
            snapshot: Mutex::new(Some(EnvSnapshot { original })),
        });
        active.push(Arc::downgrade(&state));

        Ok(EnvGuard { state, unmatched })
    }

    /// Release every active patch. Returns how many files were restored.
    pub fn restore_all(&self) -> usize {
        let active = lock(&self.active);
        let mut restored = 0;
        for state in active.iter().filter_map(Weak::upgrade) {
            match state.release() {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(err) => eprintln!(
                    "[env] Failed to restore {}: {}",
                    state.path.display(),
                    err.message
                ),
            }
        }
        restored
    }
}

fn global() -> &'static PatchRegistry {
    static REGISTRY: OnceLock<PatchRegistry> = OnceLock::new();
    REGISTRY.get_or_init(PatchRegistry::new)
}

/// Patch `path` through the process-wide registry.
pub fn acquire(path: &Path, replacements: &[(String, String)]) -> Result<EnvGuard> {
    global().acquire(path, replacements)
}

/// Restore every file patched through [`acquire`].
pub fn restore_all() -> usize {
    global().restore_all()
}

/// Replace the value of every `KEY=...` line whose key is in `replacements`.
/// Other lines, and every line terminator, are kept byte for byte.
/// Returns the patched text and the keys that matched no line.
pub fn patch_content(text: &str, replacements: &[(String, String)]) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut matched = vec![false; replacements.len()];

    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let ending = &line[body.len()..];

        let replacement = body.split_once('=').and_then(|(raw_key, _)| {
            replacements
                .iter()
                .position(|(key, _)| key == raw_key.trim())
                .map(|idx| (raw_key, idx))
        });

        match replacement {
            Some((raw_key, idx)) => {
                matched[idx] = true;
                out.push_str(raw_key);
                out.push('=');
                out.push_str(&replacements[idx].1);
                out.push_str(ending);
            }
            None => out.push_str(line),
        }
    }

    let unmatched = replacements
        .iter()
        .zip(matched)
        .filter(|(_, hit)| !hit)
        .map(|((key, _), _)| key.clone())
        .collect();

    (out, unmatched)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::tempdir;

    const ORIGINAL: &str = "# storefront\r\nVITE_B2B_URL=https://api-b2b.bigcommerce.com\r\nVITE_ENVIRONMENT=local\nVITE_ASSETS_ABSOLUTE_PATH=\nVITE_LOCAL_DEBUG=true";

    fn replacements() -> Vec<(String, String)> {
        vec![
            ("VITE_ENVIRONMENT".to_string(), "sandbox".to_string()),
            (
                "VITE_ASSETS_ABSOLUTE_PATH".to_string(),
                "\"https://cdn.example.com/v1/assets/\"".to_string(),
            ),
        ]
    }

    #[test]
    fn patch_content_rewrites_only_placeholder_lines() {
        let (patched, unmatched) = patch_content(ORIGINAL, &replacements());
        assert_eq!(
            patched,
            "# storefront\r\nVITE_B2B_URL=https://api-b2b.bigcommerce.com\r\nVITE_ENVIRONMENT=sandbox\nVITE_ASSETS_ABSOLUTE_PATH=\"https://cdn.example.com/v1/assets/\"\nVITE_LOCAL_DEBUG=true"
        );
        assert!(unmatched.is_empty());
    }

    #[test]
    fn patch_content_keeps_crlf_terminator() {
        let (patched, _) = patch_content("VITE_ENVIRONMENT=local\r\n", &replacements());
        assert_eq!(patched, "VITE_ENVIRONMENT=sandbox\r\n");
    }

    #[test]
    fn patch_content_ignores_commented_keys() {
        let text = "#VITE_ENVIRONMENT=local\n";
        let (patched, unmatched) = patch_content(text, &replacements());
        assert_eq!(patched, text);
        assert_eq!(unmatched, vec!["VITE_ENVIRONMENT", "VITE_ASSETS_ABSOLUTE_PATH"]);
    }

    #[test]
    fn acquire_then_release_restores_exact_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, ORIGINAL).unwrap();
        let registry = PatchRegistry::new();

        let guard = registry.acquire(&path, &replacements()).unwrap();
        assert!(guard.is_active());
        let during = std::fs::read_to_string(&path).unwrap();
        assert!(during.contains("VITE_ENVIRONMENT=sandbox"));

        assert!(guard.release().unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), ORIGINAL.as_bytes());
        assert!(!guard.is_active());
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, ORIGINAL).unwrap();
        let registry = PatchRegistry::new();

        let guard = registry.acquire(&path, &replacements()).unwrap();
        assert!(guard.release().unwrap());

        // An edit after release must survive further release calls.
        std::fs::write(&path, "EDITED=1\n").unwrap();
        assert!(!guard.release().unwrap());
        assert!(!guard.clone().release().unwrap());
        drop(guard);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "EDITED=1\n");
    }

    #[test]
    fn dropping_last_guard_restores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, ORIGINAL).unwrap();
        let registry = PatchRegistry::new();

        let guard = registry.acquire(&path, &replacements()).unwrap();
        let clone = guard.clone();
        drop(guard);
        assert_ne!(std::fs::read(&path).unwrap(), ORIGINAL.as_bytes());

        drop(clone);
        assert_eq!(std::fs::read(&path).unwrap(), ORIGINAL.as_bytes());
    }

    #[test]
    fn second_acquire_on_same_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, ORIGINAL).unwrap();
        let registry = PatchRegistry::new();

        let guard = registry.acquire(&path, &replacements()).unwrap();
        let err = registry.acquire(&path, &replacements()).unwrap_err();
        assert_eq!(err.code, ErrorCode::EnvPatchActive);

        guard.release().unwrap();
        let again = registry.acquire(&path, &replacements()).unwrap();
        assert!(again.is_active());
    }

    #[test]
    fn restore_all_releases_active_patches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, ORIGINAL).unwrap();
        let registry = PatchRegistry::new();

        let guard = registry.acquire(&path, &replacements()).unwrap();
        assert_eq!(registry.restore_all(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), ORIGINAL.as_bytes());
        assert!(!guard.is_active());
        assert_eq!(registry.restore_all(), 0);
    }

    #[test]
    fn acquire_missing_file_is_config_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        let registry = PatchRegistry::new();

        let err = registry.acquire(&path, &replacements()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigReadFailed);
        assert!(!path.exists());
    }

    #[test]
    fn acquire_reports_unmatched_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "VITE_ENVIRONMENT=local\n").unwrap();
        let registry = PatchRegistry::new();

        let guard = registry.acquire(&path, &replacements()).unwrap();
        assert_eq!(guard.unmatched_keys(), ["VITE_ASSETS_ABSOLUTE_PATH".to_string()]);
    }
}
