//! Local command execution.

use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;

static CHILDREN: ChildRegistry = ChildRegistry::new();

/// Result of a shell command run to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> String {
        if !self.stderr.trim().is_empty() {
            self.stderr.trim().to_string()
        } else {
            self.stdout.trim().to_string()
        }
    }
}

/// Process ids of shell commands that are still running.
///
/// On unix every command leads its own process group, so terminating it also
/// stops whatever the shell spawned.
pub struct ChildRegistry {
    pids: Mutex<Vec<u32>>,
}

impl ChildRegistry {
    pub const fn new() -> Self {
        Self {
            pids: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, pid: u32) {
        self.pids.lock().unwrap_or_else(|p| p.into_inner()).push(pid);
    }

    fn unregister(&self, pid: u32) {
        self.pids
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|&p| p != pid);
    }

    #[cfg(test)]
    fn running(&self) -> usize {
        self.pids.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Send a termination request to every running command. Returns how
    /// many were signalled.
    pub fn terminate_all(&self) -> usize {
        let pids = self.pids.lock().unwrap_or_else(|p| p.into_inner()).clone();
        pids.into_iter().filter(|&pid| terminate(pid)).count()
    }
}

impl Default for ChildRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    // Negative pid targets the whole process group.
    unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGTERM) == 0 }
}

#[cfg(windows)]
fn terminate(pid: u32) -> bool {
    Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Terminate every shell command started through this module that has not
/// finished yet.
pub fn terminate_children() -> usize {
    CHILDREN.terminate_all()
}

/// Run `command` through the platform shell, optionally in `current_dir`.
///
/// Spawn failures are reported as an unsuccessful output with exit code -1
/// and the OS error in `stderr`. While it runs, the child can be stopped with
/// [`terminate_children`].
pub fn execute_local_command_in_dir(
    command: &str,
    current_dir: Option<&Path>,
    env: Option<&[(&str, &str)]>,
) -> CommandOutput {
    execute_registered(&CHILDREN, command, current_dir, env)
}

fn execute_registered(
    registry: &ChildRegistry,
    command: &str,
    current_dir: Option<&Path>,
    env: Option<&[(&str, &str)]>,
) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    if let Some(env_pairs) = env {
        cmd.envs(env_pairs.iter().copied());
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd.spawn().and_then(|child| {
        let pid = child.id();
        registry.register(pid);
        let output = child.wait_with_output();
        registry.unregister(pid);
        output
    });

    match output {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput {
            stdout: String::new(),
            stderr: format!("Command error: {}", e),
            success: false,
            exit_code: -1,
        },
    }
}

/// Last `max_lines` lines of `text`, for error details.
pub fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Captured output from command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl CapturedOutput {
    pub fn new(stdout: String, stderr: String) -> Self {
        Self { stdout, stderr }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

impl From<CommandOutput> for CapturedOutput {
    fn from(output: CommandOutput) -> Self {
        Self::new(output.stdout, output.stderr)
    }
}
