//! Activation snippet for the store's script manager.

use serde::Serialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::local_files;
use crate::target::DeployTarget;

/// How the browser loads an entry script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Module,
    NoModule,
}

/// Entry scripts the snippet must reference, in output order.
pub const REQUIRED_ARTIFACTS: &[(&str, ScriptKind)] = &[
    ("index.", ScriptKind::Module),
    ("polyfills-legacy.", ScriptKind::NoModule),
    ("index-legacy.", ScriptKind::NoModule),
];

const CHANNEL_ID: u32 = 1;
const PLATFORM: &str = "bigcommerce";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashedArtifact {
    pub prefix: String,
    pub hash: String,
    pub file_name: String,
    pub kind: ScriptKind,
}

/// Locate every required artifact in a directory listing.
///
/// The first name (in sorted order) of the form `<prefix><hash>.<ext>` wins.
/// `index.html` does not count for `index.` because its hash would be empty.
pub fn find_artifacts(names: &[String], dir: &str) -> Result<Vec<HashedArtifact>> {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort();

    REQUIRED_ARTIFACTS
        .iter()
        .map(|(prefix, kind)| {
            sorted
                .iter()
                .find_map(|name| {
                    let rest = name.strip_prefix(prefix)?;
                    let (hash, ext) = rest.split_once('.')?;
                    if hash.is_empty() || ext != "js" {
                        return None;
                    }
                    Some(HashedArtifact {
                        prefix: prefix.to_string(),
                        hash: hash.to_string(),
                        file_name: (*name).clone(),
                        kind: *kind,
                    })
                })
                .ok_or_else(|| Error::artifact_missing(*prefix, dir))
        })
        .collect()
}

pub struct ReleaseNoteGenerator {
    b2b_url: String,
}

impl ReleaseNoteGenerator {
    pub fn new(b2b_url: impl Into<String>) -> Self {
        Self {
            b2b_url: b2b_url.into(),
        }
    }

    /// Scan `output_dir` and render the snippet for `target`.
    pub fn generate(
        &self,
        output_dir: &Path,
        target: &DeployTarget,
        absolute_path: &str,
    ) -> Result<String> {
        let names = local_files::list_names(output_dir)?;
        let artifacts = find_artifacts(&names, &output_dir.to_string_lossy())?;
        Ok(self.render(target, absolute_path, &artifacts))
    }

    pub fn render(
        &self,
        target: &DeployTarget,
        absolute_path: &str,
        artifacts: &[HashedArtifact],
    ) -> String {
        let base = absolute_path.trim_end_matches('/');
        let mut out = String::new();

        out.push_str("<script>\n");
        out.push_str("  window.customerId = \"{{customer.id}}\";\n");
        out.push_str("  window.b3CheckoutConfig = {\n");
        out.push_str("    routes: {\n");
        out.push_str("      dashboard: '/account.php?action=order_status',\n");
        out.push_str("    },\n");
        out.push_str("  }\n");
        out.push_str("  window.B3 = {\n");
        out.push_str("    setting: {\n");
        out.push_str(&format!("      store_hash: '{}',\n", target.remote_store_id));
        out.push_str(&format!("      channel_id: {},\n", CHANNEL_ID));
        out.push_str(&format!("      platform: '{}',\n", PLATFORM));
        out.push_str(&format!("      b2b_url: '{}',\n", self.b2b_url));
        out.push_str(&format!("      b2b_client_id: '{}',\n", target.client_id));
        out.push_str(&format!("      captcha_setkey: '{}',\n", target.captcha_key));
        out.push_str("    },\n");
        out.push_str("    'dom.checkoutRegisterParentElement': '#checkout-app',\n");
        out.push_str("    'dom.registerElement':\n");
        out.push_str("      '[href^=\"/login.php\"], #checkout-customer-login, [href=\"/login.php\"] .navUser-item-loginLabel, #checkout-customer-returning .form-legend-container [href=\"#\"]',\n");
        out.push_str("    'dom.openB3Checkout': 'checkout-customer-continue',\n");
        out.push_str("    before_login_goto_page: '/account.php?action=order_status',\n");
        out.push_str("    checkout_super_clear_session: 'true',\n");
        out.push_str("    'dom.navUserLoginElement': '.navUser-item.navUser-item--account',\n");
        out.push_str("  }\n");
        out.push_str("</script>");

        for artifact in artifacts {
            let loader = match artifact.kind {
                ScriptKind::Module => "type=\"module\"",
                ScriptKind::NoModule => "nomodule=\"\"",
            };
            out.push_str(&format!(
                "\n<script\n  {}\n  crossorigin=\"\"\n  src=\"{}/{}\"\n></script>",
                loader, base, artifact.file_name
            ));
        }

        out
    }
}

/// Operator instructions wrapping the snippet.
pub fn instructions(script_manager_url: &str, snippet: &str) -> String {
    format!(
        "---------------------------------------\n\
         Manual Step Required\n\
         ---------------------------------------\n\
         A final step is required to switch the storefront to the newly deployed build.\n\
         \n\
         1. Go to {}\n\
         2. Replace the existing script tags with the following:\n\
         {}\n\
         3. Click Save\n",
        script_manager_url, snippet
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::fs;

    fn target() -> DeployTarget {
        DeployTarget {
            name: "sandbox".to_string(),
            remote_store_id: "abc123".to_string(),
            username: "deploy@example.com".to_string(),
            credential_secret: "secret".to_string(),
            client_id: "client-xyz".to_string(),
            captcha_key: "captcha-key".to_string(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_all_required_artifacts() {
        let listing = names(&[
            "index.html",
            "index-legacy.ghi789.js",
            "polyfills-legacy.def456.js",
            "index.abc123.js",
            "assets",
        ]);
        let artifacts = find_artifacts(&listing, "dist").unwrap();

        let hashes: Vec<&str> = artifacts.iter().map(|a| a.hash.as_str()).collect();
        assert_eq!(hashes, vec!["abc123", "def456", "ghi789"]);
        assert_eq!(artifacts[0].file_name, "index.abc123.js");
        assert_eq!(artifacts[0].kind, ScriptKind::Module);
        assert_eq!(artifacts[2].kind, ScriptKind::NoModule);
    }

    #[test]
    fn missing_prefix_is_named() {
        let listing = names(&["index.abc123.js", "index-legacy.ghi789.js", "index.html"]);
        let err = find_artifacts(&listing, "dist").unwrap_err();
        assert_eq!(err.code, ErrorCode::ArtifactMissing);
        assert_eq!(err.details["prefix"], "polyfills-legacy.");
    }

    #[test]
    fn index_html_alone_does_not_satisfy_entry() {
        let listing = names(&[
            "index.html",
            "polyfills-legacy.def456.js",
            "index-legacy.ghi789.js",
        ]);
        let err = find_artifacts(&listing, "dist").unwrap_err();
        assert_eq!(err.details["prefix"], "index.");
    }

    #[test]
    fn render_embeds_target_and_urls() {
        let listing = names(&[
            "index.abc123.js",
            "polyfills-legacy.def456.js",
            "index-legacy.ghi789.js",
        ]);
        let artifacts = find_artifacts(&listing, "dist").unwrap();
        let generator = ReleaseNoteGenerator::new("https://api-b2b.bigcommerce.com");
        let snippet = generator.render(
            &target(),
            "https://cdn.example.com/s-abc123/content/b2b-portal/2024-05-0112_30_45/",
            &artifacts,
        );

        assert!(snippet.contains("store_hash: 'abc123'"));
        assert!(snippet.contains("channel_id: 1"));
        assert!(snippet.contains("b2b_client_id: 'client-xyz'"));
        assert!(snippet.contains("captcha_setkey: 'captcha-key'"));
        assert!(snippet.contains(
            "src=\"https://cdn.example.com/s-abc123/content/b2b-portal/2024-05-0112_30_45/index.abc123.js\""
        ));
        assert_eq!(snippet.matches("type=\"module\"").count(), 1);
        assert_eq!(snippet.matches("nomodule=\"\"").count(), 2);
        assert!(!snippet.contains("credential"));
        assert!(!snippet.contains("secret"));
    }

    #[test]
    fn generate_reads_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["index.abc123.js", "polyfills-legacy.def456.js", "index-legacy.ghi789.js"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("assets")).unwrap();

        let generator = ReleaseNoteGenerator::new("https://api-b2b.bigcommerce.com");
        let snippet = generator
            .generate(dir.path(), &target(), "https://cdn.example.com/v1")
            .unwrap();
        assert!(snippet.contains("https://cdn.example.com/v1/index-legacy.ghi789.js"));
    }

    #[test]
    fn instructions_include_script_manager_url() {
        let text = instructions("https://store-abc123.example.com/manage", "<script></script>");
        assert!(text.contains("1. Go to https://store-abc123.example.com/manage"));
        assert!(text.contains("<script></script>"));
        assert!(text.contains("3. Click Save"));
    }
}
