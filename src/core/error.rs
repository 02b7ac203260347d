use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,
    ConfigReadFailed,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    TargetNotFound,

    EnvPatchActive,

    RemoteConnectFailed,
    RemoteMkdirFailed,
    RemoteWriteFailed,

    DeployBuildFailed,
    ArtifactMissing,

    Interrupted,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigReadFailed => "config.read_failed",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::TargetNotFound => "target.not_found",

            ErrorCode::EnvPatchActive => "env.patch_active",

            ErrorCode::RemoteConnectFailed => "remote.connect_failed",
            ErrorCode::RemoteMkdirFailed => "remote.mkdir_failed",
            ErrorCode::RemoteWriteFailed => "remote.write_failed",

            ErrorCode::DeployBuildFailed => "deploy.build_failed",
            ErrorCode::ArtifactMissing => "deploy.artifact_missing",

            ErrorCode::Interrupted => "internal.interrupted",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReadDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetNotFoundDetails {
    pub target: String,
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFailureDetails {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMissingDetails {
    pub prefix: String,
    pub dir: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
    /// Title of the pipeline stage that produced the error, once known.
    pub stage: Option<String>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "{}: {}", stage, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
            stage: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            details,
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let details = to_details(ConfigMissingKeyDetails {
            key: key.clone(),
            path,
        });

        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let path = path.into();
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.clone(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Invalid JSON in {}: {}", path, err),
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        let details = to_details(ConfigInvalidValueDetails {
            key: key.clone(),
            value,
            problem: problem.clone(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}': {}", key, problem),
            details,
        )
    }

    /// A local configuration file could not be read. Raised before any
    /// remote directory is created.
    pub fn config_read(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        let error = error.into();
        let details = to_details(ConfigReadDetails {
            path: path.clone(),
            error: error.clone(),
        });

        Self::new(
            ErrorCode::ConfigReadFailed,
            format!("Cannot read {}: {}", path, error),
            details,
        )
    }

    pub fn target_not_found(target: impl Into<String>, available: Vec<String>) -> Self {
        let target = target.into();
        let hint = if available.is_empty() {
            "No targets are configured; add one under \"targets\" in deploy.json".to_string()
        } else {
            format!("Configured targets: {}", available.join(", "))
        };
        let details = to_details(TargetNotFoundDetails {
            target: target.clone(),
            available,
        });

        Self::new(
            ErrorCode::TargetNotFound,
            format!("Unknown deploy target '{}'", target),
            details,
        )
        .with_hint(hint)
    }

    pub fn env_patch_active(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::EnvPatchActive,
            format!("{} is already patched by this process", path),
            serde_json::json!({ "path": path }),
        )
    }

    pub fn remote_connect(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self::remote(ErrorCode::RemoteConnectFailed, "Cannot reach remote store", path, None, error)
            .retryable()
    }

    pub fn remote_mkdir(path: impl Into<String>, status: Option<u16>, error: impl Into<String>) -> Self {
        Self::remote(ErrorCode::RemoteMkdirFailed, "Cannot create remote directory", path, status, error)
    }

    pub fn remote_write(path: impl Into<String>, status: Option<u16>, error: impl Into<String>) -> Self {
        Self::remote(ErrorCode::RemoteWriteFailed, "Cannot write remote file", path, status, error)
    }

    fn remote(
        code: ErrorCode,
        summary: &str,
        path: impl Into<String>,
        status: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let error = error.into();
        let message = format!("{} {}: {}", summary, path, error);
        Self::new(
            code,
            message,
            to_details(RemoteFailureDetails {
                path,
                status,
                error,
            }),
        )
    }

    pub fn build_failed(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        let command = command.into();
        let stderr = stderr.into();
        let message = format!("Build command '{}' failed (exit {})", command, exit_code);
        Self::new(
            ErrorCode::DeployBuildFailed,
            message,
            to_details(BuildFailedDetails {
                command,
                exit_code,
                stderr,
            }),
        )
    }

    pub fn artifact_missing(prefix: impl Into<String>, dir: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let dir = dir.into();
        let message = format!("No build artifact matching '{}*' in {}", prefix, dir);
        Self::new(
            ErrorCode::ArtifactMissing,
            message,
            to_details(ArtifactMissingDetails { prefix, dir }),
        )
        .with_hint("The upload finished but the activation snippet cannot be generated; check the bundler output")
    }

    pub fn interrupted() -> Self {
        Self::new(
            ErrorCode::Interrupted,
            "Interrupted by operator",
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("IO error ({}): {}", ctx, error),
            None => format!("IO error: {}", error),
        };
        Self::new(
            ErrorCode::InternalIoError,
            message,
            to_details(InternalIoErrorDetails { error, context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalJsonErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Attach the originating stage title. An already set stage is kept.
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage.into());
        }
        self
    }

    fn retryable(mut self) -> Self {
        self.retryable = Some(true);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_when_set() {
        let err = Error::build_failed("yarn run build", 1, "boom").with_stage("Build B2B Portal");
        assert_eq!(
            err.to_string(),
            "Build B2B Portal: Build command 'yarn run build' failed (exit 1)"
        );
    }

    #[test]
    fn with_stage_keeps_first_stage() {
        let err = Error::internal_unexpected("x").with_stage("first").with_stage("second");
        assert_eq!(err.stage.as_deref(), Some("first"));
    }

    #[test]
    fn target_not_found_lists_available_targets() {
        let err = Error::target_not_found("staging", vec!["production".into(), "sandbox".into()]);
        assert_eq!(err.code, ErrorCode::TargetNotFound);
        assert_eq!(err.details["target"], "staging");
        assert_eq!(err.hints[0].message, "Configured targets: production, sandbox");
    }

    #[test]
    fn artifact_missing_names_prefix() {
        let err = Error::artifact_missing("polyfills-legacy.", "dist");
        assert_eq!(err.code.as_str(), "deploy.artifact_missing");
        assert_eq!(err.details["prefix"], "polyfills-legacy.");
        assert!(err.message.contains("polyfills-legacy."));
    }

    #[test]
    fn remote_connect_is_retryable() {
        let err = Error::remote_connect("/dav", "connection refused");
        assert_eq!(err.retryable, Some(true));
        assert_eq!(err.code, ErrorCode::RemoteConnectFailed);
    }
}
