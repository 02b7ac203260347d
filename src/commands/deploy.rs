use clap::Args;
use std::path::PathBuf;

use portal_deploy::build::CommandBundler;
use portal_deploy::config::{self, CONFIG_FILE_NAME};
use portal_deploy::deploy::{self, DeployOptions, DeployOutcome};
use portal_deploy::remote::{Credentials, RemoteStore, WebDavStore};
use portal_deploy::target::DeployTarget;
use portal_deploy::{interrupt, Error};

use super::CmdResult;

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Target store to deploy to, as named in deploy.json
    #[arg(long, value_name = "NAME", conflicts_with_all = ["sandbox", "production"])]
    pub target: Option<String>,

    /// Shorthand for --target sandbox
    #[arg(long, conflicts_with = "production")]
    pub sandbox: bool,

    /// Shorthand for --target production
    #[arg(long)]
    pub production: bool,

    /// Build only (dry run, no upload)
    #[arg(long)]
    pub dev: bool,

    /// Path to the deploy configuration
    #[arg(long, value_name = "PATH", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Print a JSON envelope on stdout instead of text
    #[arg(long)]
    pub json: bool,
}

impl DeployArgs {
    /// Requested target name, from `--target` or one of its shorthands.
    pub fn target_name(&self) -> Option<String> {
        if let Some(target) = &self.target {
            return Some(target.clone());
        }
        if self.sandbox {
            return Some("sandbox".to_string());
        }
        if self.production {
            return Some("production".to_string());
        }
        None
    }
}

pub fn run(args: &DeployArgs) -> CmdResult<DeployOutcome> {
    let target_name = args
        .target_name()
        .ok_or_else(|| Error::validation_missing_argument(vec!["--target".to_string()]))?;

    let config = config::load(&args.config)?;
    let target = DeployTarget::select(&config, &target_name)?;

    interrupt::install()?;

    let store = if args.dev {
        None
    } else {
        Some(WebDavStore::connect(
            &target.dav_url(&config),
            Credentials {
                username: target.username.clone(),
                secret: target.credential_secret.clone(),
            },
        )?)
    };

    let bundler = CommandBundler::new(&config.build_command, config.build_dir.clone());
    let outcome = deploy::run(
        &config,
        &target,
        store.as_ref().map(|s| s as &dyn RemoteStore),
        &bundler,
        DeployOptions::new(args.dev),
    )?;

    Ok((outcome, 0))
}
