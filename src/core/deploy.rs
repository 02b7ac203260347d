//! The deploy pipeline: setup, build, restore `.env`, upload.
//!
//! Setup names the versioned directory, patches the storefront `.env` and
//! then provisions the remote directories. The `.env` restore is a cleanup
//! stage, so it runs even when the build fails; the patch guard held in the
//! context restores the file on any other exit path. Upload is skipped in
//! dry-run mode. After a successful upload the activation snippet is
//! rendered from the build output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::build::{BuildOutput, Bundler};
use crate::config::DeployConfig;
use crate::env_patch::{self, EnvGuard};
use crate::error::{Error, Result};
use crate::local_files;
use crate::pipeline::{self, PipelineRunResult, Stage, StageOutput};
use crate::release_note::{self, ReleaseNoteGenerator};
use crate::remote::{self, MkdirOutcome, RemoteStore};
use crate::target::DeployTarget;
use crate::upload::{self, BatchUploader, UploadReport};
use crate::utils::command::tail;
use crate::version_path;

pub const SETUP_STAGE: &str = "Pre-Deploy Setup";
pub const BUILD_STAGE: &str = "Build B2B Portal";
pub const RESTORE_ENV_STAGE: &str = "Restore .env";
pub const UPLOAD_STAGE: &str = "Deploy B2B Portal";
pub const RELEASE_NOTES_STAGE: &str = "Release Notes";

const BUILD_LOG_TAIL_LINES: usize = 10;

/// State shared across stages. Each field is written by one stage only.
#[derive(Debug, Default)]
pub struct DeployContext {
    pub dry_run: bool,
    pub now: DateTime<Utc>,
    // Setup
    pub timestamp: String,
    pub dest_folder: String,
    pub absolute_path: String,
    pub env_guard: Option<EnvGuard>,
    // Build
    pub build: Option<BuildOutput>,
    // Restore .env
    pub env_restores: usize,
    // Upload
    pub dist_folder: PathBuf,
    pub dist_files: Vec<String>,
    pub dist_asset_files: Vec<String>,
    pub file_count: usize,
    pub upload: Option<UploadReport>,
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub dry_run: bool,
    pub now: DateTime<Utc>,
}

impl DeployOptions {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            now: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub target: String,
    pub dry_run: bool,
    pub dest_folder: String,
    pub absolute_path: String,
    pub file_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadReport>,
    pub pipeline: PipelineRunResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

struct SetupStage<'a> {
    config: &'a DeployConfig,
    target: &'a DeployTarget,
    store: Option<&'a dyn RemoteStore>,
}

impl Stage<DeployContext> for SetupStage<'_> {
    fn title(&self) -> &str {
        SETUP_STAGE
    }

    fn run(&self, ctx: &mut DeployContext, out: &StageOutput) -> Result<()> {
        out.line("Creating a new versioned folder...");
        ctx.timestamp = version_path::name(ctx.now);
        ctx.dest_folder = version_path::dest_folder(&self.config.remote_root, &ctx.timestamp);
        ctx.absolute_path =
            version_path::absolute_path(&self.target.cdn_url(self.config), &ctx.dest_folder);

        // The .env must be readable before anything is created remotely.
        let replacements = vec![
            (
                self.config.env_keys.environment.clone(),
                self.target.name.clone(),
            ),
            (
                self.config.env_keys.assets_path.clone(),
                format!(
                    "\"{}/{}/\"",
                    ctx.absolute_path, self.config.assets_subdir
                ),
            ),
        ];
        ctx.env_guard = Some(env_patch::acquire(&self.config.env_file, &replacements)?);

        if ctx.dry_run {
            out.line("Dry run, remote directories not created");
            return Ok(());
        }

        let store = self
            .store
            .ok_or_else(|| Error::internal_unexpected("no remote store for a live deploy"))?;
        let dirs = vec![
            self.config.remote_root.clone(),
            ctx.dest_folder.clone(),
            assets_folder(&ctx.dest_folder, &self.config.assets_subdir),
        ];
        let outcomes = remote::ensure_dirs(store, &dirs)?;
        if outcomes.get(1) == Some(&MkdirOutcome::AlreadyExists) {
            eprintln!(
                "[deploy] Warning: {} already exists; files from this deploy will overwrite it",
                ctx.dest_folder
            );
        }

        out.line(format!("Created {}", ctx.dest_folder));
        Ok(())
    }
}

struct BuildStage<'a> {
    bundler: &'a dyn Bundler,
}

impl Stage<DeployContext> for BuildStage<'_> {
    fn title(&self) -> &str {
        BUILD_STAGE
    }

    fn run(&self, ctx: &mut DeployContext, out: &StageOutput) -> Result<()> {
        out.line("Building...");
        let build = self.bundler.build()?;
        for line in tail(&build.output.stdout, BUILD_LOG_TAIL_LINES).lines() {
            out.line(line);
        }
        ctx.build = Some(build);
        Ok(())
    }
}

struct RestoreEnvStage;

impl Stage<DeployContext> for RestoreEnvStage {
    fn title(&self) -> &str {
        RESTORE_ENV_STAGE
    }

    fn is_cleanup(&self) -> bool {
        true
    }

    fn run(&self, ctx: &mut DeployContext, _out: &StageOutput) -> Result<()> {
        let Some(guard) = ctx.env_guard.take() else {
            return Ok(());
        };
        if guard.release()? {
            ctx.env_restores += 1;
        }
        Ok(())
    }
}

struct UploadStage<'a> {
    config: &'a DeployConfig,
    store: Option<&'a dyn RemoteStore>,
}

impl Stage<DeployContext> for UploadStage<'_> {
    fn title(&self) -> &str {
        UPLOAD_STAGE
    }

    fn skip(&self, ctx: &DeployContext) -> Option<String> {
        ctx.dry_run.then(|| "Dry run, skipping upload".to_string())
    }

    fn run(&self, ctx: &mut DeployContext, out: &StageOutput) -> Result<()> {
        let store = self
            .store
            .ok_or_else(|| Error::internal_unexpected("no remote store for a live deploy"))?;

        if self.config.settle_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.settle_delay_ms));
        }

        out.line("Getting a list of files and folders to upload...");
        let assets_dir = self.config.assets_dir();
        ctx.dist_folder = self.config.dist_dir.clone();
        ctx.dist_files = local_files::list_names(&ctx.dist_folder)?;
        ctx.dist_asset_files = local_files::list_names(&assets_dir)?;
        ctx.file_count = upload::uploadable(&ctx.dist_files).len()
            + upload::uploadable(&ctx.dist_asset_files).len();

        out.line(format!("Uploading {} files...", ctx.file_count));
        let uploader = BatchUploader::new(store, self.config.batch_size)?;
        let mut report = uploader.upload(&ctx.dist_folder, &ctx.dest_folder, &ctx.dist_files)?;
        report.merge(uploader.upload(
            &assets_dir,
            &assets_folder(&ctx.dest_folder, &self.config.assets_subdir),
            &ctx.dist_asset_files,
        )?);

        ctx.upload = Some(report);
        Ok(())
    }
}

fn assets_folder(dest_folder: &str, assets_subdir: &str) -> String {
    format!("{}/{}", dest_folder, assets_subdir)
}

/// Run the whole deploy for `target`.
///
/// `store` may be `None` only in dry-run mode.
pub fn run(
    config: &DeployConfig,
    target: &DeployTarget,
    store: Option<&dyn RemoteStore>,
    bundler: &dyn Bundler,
    options: DeployOptions,
) -> Result<DeployOutcome> {
    if !options.dry_run && store.is_none() {
        return Err(Error::internal_unexpected("no remote store for a live deploy"));
    }

    eprintln!(
        "[deploy] Target: {} ({})",
        target.name, target.remote_store_id
    );
    if options.dry_run {
        eprintln!("[deploy] Mode: DRY RUN (build only, no upload)");
    }

    let setup = SetupStage {
        config,
        target,
        store,
    };
    let build = BuildStage { bundler };
    let restore = RestoreEnvStage;
    let upload = UploadStage { config, store };
    let stages: [&dyn Stage<DeployContext>; 4] = [&setup, &build, &restore, &upload];

    let mut ctx = DeployContext {
        dry_run: options.dry_run,
        now: options.now,
        ..DeployContext::default()
    };
    let result = pipeline::run(&stages, &mut ctx).into_result()?;

    let (snippet, instructions) = if ctx.dry_run {
        (None, None)
    } else {
        let snippet = ReleaseNoteGenerator::new(&config.b2b_url)
            .generate(&config.dist_dir, target, &ctx.absolute_path)
            .map_err(|e| e.with_stage(RELEASE_NOTES_STAGE))?;
        let instructions =
            release_note::instructions(&target.script_manager_url(config), &snippet);
        (Some(snippet), Some(instructions))
    };

    Ok(DeployOutcome {
        target: target.name.clone(),
        dry_run: ctx.dry_run,
        dest_folder: ctx.dest_folder,
        absolute_path: ctx.absolute_path,
        file_count: ctx.file_count,
        build: ctx.build,
        upload: ctx.upload,
        pipeline: result,
        snippet,
        instructions,
    })
}
