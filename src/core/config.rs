use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "deploy.json";

/// Root structure of deploy.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    /// WebDAV account shared by every target.
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,

    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    #[serde(default)]
    pub env_keys: EnvKeys,

    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    #[serde(default = "default_assets_subdir")]
    pub assets_subdir: String,

    #[serde(default = "default_build_command")]
    pub build_command: String,

    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    #[serde(default = "default_remote_root")]
    pub remote_root: String,

    #[serde(default = "default_dav_url")]
    pub dav_url: String,

    #[serde(default = "default_cdn_url")]
    pub cdn_url: String,

    #[serde(default = "default_script_manager_url")]
    pub script_manager_url: String,

    #[serde(default = "default_b2b_url")]
    pub b2b_url: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

/// Per-store settings. The secret may reference environment variables
/// (`$SANDBOX_DAV_PASSWORD`), expanded when the target is selected.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub store_hash: String,
    pub credential_secret: String,
    pub client_id: String,
    pub captcha_key: String,
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("store_hash", &self.store_hash)
            .field("credential_secret", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("captcha_key", &self.captcha_key)
            .finish()
    }
}

/// Placeholder keys rewritten in the storefront .env during the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvKeys {
    #[serde(default = "default_environment_key")]
    pub environment: String,

    #[serde(default = "default_assets_path_key")]
    pub assets_path: String,
}

impl Default for EnvKeys {
    fn default() -> Self {
        Self {
            environment: default_environment_key(),
            assets_path: default_assets_path_key(),
        }
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_env_file() -> PathBuf {
    PathBuf::from("apps/storefront/.env")
}

fn default_environment_key() -> String {
    "VITE_ENVIRONMENT".to_string()
}

fn default_assets_path_key() -> String {
    "VITE_ASSETS_ABSOLUTE_PATH".to_string()
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("apps/storefront/dist")
}

fn default_assets_subdir() -> String {
    "assets".to_string()
}

fn default_build_command() -> String {
    "yarn run build".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote_root() -> String {
    "/content/b2b-portal".to_string()
}

fn default_dav_url() -> String {
    "https://store-{storeHash}.mybigcommerce.com/dav".to_string()
}

fn default_cdn_url() -> String {
    "https://cdn11.bigcommerce.com/s-{storeHash}".to_string()
}

fn default_script_manager_url() -> String {
    "https://store-{storeHash}.mybigcommerce.com/manage/channel/1/script-manager".to_string()
}

fn default_b2b_url() -> String {
    "https://api-b2b.bigcommerce.com".to_string()
}

fn default_batch_size() -> usize {
    crate::upload::DEFAULT_BATCH_SIZE
}

fn default_settle_delay_ms() -> u64 {
    3000
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load deploy.json, resolving relative paths against its directory.
pub fn load(path: &Path) -> Result<DeployConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::config_read(path.display().to_string(), e.to_string()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse(&content, &path.display().to_string(), base)
}

/// Parse config content. `source` names the file in error messages.
pub fn parse(content: &str, source: &str, base: &Path) -> Result<DeployConfig> {
    let mut config: DeployConfig =
        serde_json::from_str(content).map_err(|e| Error::config_invalid_json(source, e))?;

    config.validate(source)?;
    config.resolve_paths(base);
    Ok(config)
}

impl DeployConfig {
    fn validate(&self, source: &str) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::config_missing_key("username", Some(source.to_string())));
        }

        if self.batch_size == 0 {
            return Err(Error::config_invalid_value(
                "batchSize",
                Some("0".to_string()),
                "must be at least 1",
            ));
        }

        for (name, target) in &self.targets {
            if target.store_hash.trim().is_empty() {
                return Err(Error::config_missing_key(
                    format!("targets.{}.storeHash", name),
                    Some(source.to_string()),
                ));
            }
        }

        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.env_file = resolve_path(base, &self.env_file);
        self.dist_dir = resolve_path(base, &self.dist_dir);
        self.build_dir = resolve_path(base, &self.build_dir);
    }

    /// Names of all configured targets, sorted.
    pub fn target_names(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.dist_dir.join(&self.assets_subdir)
    }
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Substitute `{storeHash}` in a URL template.
pub fn render_store_url(template: &str, store_hash: &str) -> String {
    template.replace("{storeHash}", store_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "username": "deploy@example.com",
        "targets": {
            "sandbox": {
                "storeHash": "abc123",
                "credentialSecret": "secret",
                "clientId": "client",
                "captchaKey": "captcha"
            }
        }
    }"#;

    #[test]
    fn parse_applies_defaults() {
        let config = parse(MINIMAL, "deploy.json", Path::new("/repo")).unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.settle_delay_ms, 3000);
        assert_eq!(config.remote_root, "/content/b2b-portal");
        assert_eq!(config.build_command, "yarn run build");
        assert_eq!(config.env_keys.environment, "VITE_ENVIRONMENT");
        assert_eq!(config.env_keys.assets_path, "VITE_ASSETS_ABSOLUTE_PATH");
    }

    #[test]
    fn parse_resolves_relative_paths_against_base() {
        let config = parse(MINIMAL, "deploy.json", Path::new("/repo")).unwrap();
        assert_eq!(config.env_file, PathBuf::from("/repo/apps/storefront/.env"));
        assert_eq!(config.dist_dir, PathBuf::from("/repo/apps/storefront/dist"));
        assert_eq!(config.assets_dir(), PathBuf::from("/repo/apps/storefront/dist/assets"));
    }

    #[test]
    fn parse_rejects_missing_username() {
        let err = parse(r#"{"targets": {}}"#, "deploy.json", Path::new(".")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ConfigMissingKey);
        assert_eq!(err.details["key"], "username");
    }

    #[test]
    fn parse_rejects_zero_batch_size() {
        let content = r#"{"username": "u", "batchSize": 0}"#;
        let err = parse(content, "deploy.json", Path::new(".")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn parse_reports_invalid_json() {
        let err = parse("{ not json", "deploy.json", Path::new(".")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ConfigInvalidJson);
    }

    #[test]
    fn load_reports_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ConfigReadFailed);
    }

    #[test]
    fn render_store_url_substitutes_hash() {
        assert_eq!(
            render_store_url(&default_dav_url(), "sq95sgetne"),
            "https://store-sq95sgetne.mybigcommerce.com/dav"
        );
    }

    #[test]
    fn target_debug_redacts_secret() {
        let config = parse(MINIMAL, "deploy.json", Path::new(".")).unwrap();
        let rendered = format!("{:?}", config.targets["sandbox"]);
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
