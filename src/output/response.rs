//! CLI response formatting and output.
//!
//! Provides the JSON envelope, the plain-text error report and exit code
//! mapping.

use portal_deploy::error::Hint;
use portal_deploy::{Error, ErrorCode, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: if err.hints.is_empty() {
                    None
                } else {
                    Some(err.hints.clone())
                },
                retryable: err.retryable,
                stage: err.stage.clone(),
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        ));
    }
    Ok(())
}

pub fn print_result<T: Serialize>(result: &Result<T>) -> Result<()> {
    match result {
        Ok(data) => print_response(&CliResponse::success(data)),
        Err(err) => print_response(&CliResponse::<()>::from_error(err)),
    }
}

/// Human-readable failure report on stderr.
pub fn print_error_text(err: &Error) {
    match &err.stage {
        Some(stage) => eprintln!("\n[deploy] Failed at '{}': {}", stage, err.message),
        None => eprintln!("\n[deploy] Error: {}", err.message),
    }
    if let Some(stderr) = err.details.get("stderr").and_then(|v| v.as_str()) {
        if !stderr.is_empty() {
            eprintln!("{}", stderr);
        }
    }
    for hint in &err.hints {
        eprintln!("  hint: {}", hint.message);
    }
}

pub fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigMissingKey
        | ErrorCode::ConfigInvalidJson
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ConfigReadFailed
        | ErrorCode::TargetNotFound
        | ErrorCode::ValidationMissingArgument
        | ErrorCode::ValidationInvalidArgument => 2,

        ErrorCode::RemoteConnectFailed
        | ErrorCode::RemoteMkdirFailed
        | ErrorCode::RemoteWriteFailed => 10,

        ErrorCode::DeployBuildFailed | ErrorCode::ArtifactMissing | ErrorCode::EnvPatchActive => 20,

        ErrorCode::Interrupted => portal_deploy::interrupt::INTERRUPTED_EXIT_CODE,

        ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_carries_stage() {
        let err = Error::build_failed("yarn run build", 1, "boom").with_stage("Build B2B Portal");
        let value = serde_json::to_value(CliResponse::<()>::from_error(&err)).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "deploy.build_failed");
        assert_eq!(value["error"]["stage"], "Build B2B Portal");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(exit_code_for_error(ErrorCode::TargetNotFound), 2);
        assert_eq!(exit_code_for_error(ErrorCode::ConfigReadFailed), 2);
        assert_eq!(exit_code_for_error(ErrorCode::RemoteWriteFailed), 10);
        assert_eq!(exit_code_for_error(ErrorCode::ArtifactMissing), 20);
        assert_eq!(exit_code_for_error(ErrorCode::Interrupted), 130);
        assert_eq!(exit_code_for_error(ErrorCode::InternalUnexpected), 1);
    }
}
