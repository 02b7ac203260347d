use crate::config::{render_store_url, DeployConfig};
use crate::error::{Error, Result};

/// A fully resolved deploy destination. Built once from validated input and
/// passed explicitly to every stage that needs it.
#[derive(Clone)]
pub struct DeployTarget {
    pub name: String,
    /// Store hash identifying the remote store and its CDN bucket.
    pub remote_store_id: String,
    pub username: String,
    pub credential_secret: String,
    pub client_id: String,
    pub captcha_key: String,
}

impl std::fmt::Debug for DeployTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployTarget")
            .field("name", &self.name)
            .field("remote_store_id", &self.remote_store_id)
            .field("username", &self.username)
            .field("credential_secret", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("captcha_key", &self.captcha_key)
            .finish()
    }
}

impl DeployTarget {
    /// Look up `name` in the config and expand its credential.
    pub fn select(config: &DeployConfig, name: &str) -> Result<Self> {
        let target = config
            .targets
            .get(name)
            .ok_or_else(|| Error::target_not_found(name, config.target_names()))?;

        let credential_secret = shellexpand::full(&target.credential_secret)
            .map_err(|e| {
                Error::config_invalid_value(
                    format!("targets.{}.credentialSecret", name),
                    None,
                    format!("environment variable {} is not set", e.var_name),
                )
            })?
            .to_string();

        if credential_secret.is_empty() {
            return Err(Error::config_missing_key(
                format!("targets.{}.credentialSecret", name),
                None,
            ));
        }

        Ok(Self {
            name: name.to_string(),
            remote_store_id: target.store_hash.clone(),
            username: config.username.clone(),
            credential_secret,
            client_id: target.client_id.clone(),
            captcha_key: target.captcha_key.clone(),
        })
    }

    pub fn dav_url(&self, config: &DeployConfig) -> String {
        render_store_url(&config.dav_url, &self.remote_store_id)
    }

    pub fn cdn_url(&self, config: &DeployConfig) -> String {
        render_store_url(&config.cdn_url, &self.remote_store_id)
    }

    pub fn script_manager_url(&self, config: &DeployConfig) -> String {
        render_store_url(&config.script_manager_url, &self.remote_store_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::error::ErrorCode;
    use std::path::Path;

    fn config_with_secret(secret: &str) -> DeployConfig {
        let content = format!(
            r#"{{
                "username": "deploy@example.com",
                "targets": {{
                    "production": {{"storeHash": "prod1", "credentialSecret": "{}", "clientId": "pc", "captchaKey": "pk"}},
                    "sandbox": {{"storeHash": "sand1", "credentialSecret": "s3cret", "clientId": "sc", "captchaKey": "sk"}}
                }}
            }}"#,
            secret
        );
        config::parse(&content, "deploy.json", Path::new(".")).unwrap()
    }

    #[test]
    fn select_known_target() {
        let config = config_with_secret("p4ss");
        let target = DeployTarget::select(&config, "sandbox").unwrap();
        assert_eq!(target.name, "sandbox");
        assert_eq!(target.remote_store_id, "sand1");
        assert_eq!(target.credential_secret, "s3cret");
        assert_eq!(target.username, "deploy@example.com");
        assert_eq!(target.dav_url(&config), "https://store-sand1.mybigcommerce.com/dav");
        assert_eq!(target.cdn_url(&config), "https://cdn11.bigcommerce.com/s-sand1");
    }

    #[test]
    fn select_unknown_target_fails_fast() {
        let config = config_with_secret("p4ss");
        let err = DeployTarget::select(&config, "staging").unwrap_err();
        assert_eq!(err.code, ErrorCode::TargetNotFound);
        assert_eq!(err.details["available"], serde_json::json!(["production", "sandbox"]));
    }

    #[test]
    fn select_expands_environment_secret() {
        std::env::set_var("PORTAL_DEPLOY_TEST_SECRET", "from-env");
        let config = config_with_secret("$PORTAL_DEPLOY_TEST_SECRET");
        let target = DeployTarget::select(&config, "production").unwrap();
        assert_eq!(target.credential_secret, "from-env");
    }

    #[test]
    fn select_rejects_unset_environment_secret() {
        let config = config_with_secret("${PORTAL_DEPLOY_TEST_UNSET_SECRET}");
        let err = DeployTarget::select(&config, "production").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
        assert!(err.message.contains("PORTAL_DEPLOY_TEST_UNSET_SECRET"));
    }

    #[test]
    fn debug_redacts_secret() {
        let config = config_with_secret("p4ss");
        let target = DeployTarget::select(&config, "production").unwrap();
        assert!(!format!("{:?}", target).contains("p4ss"));
    }
}
