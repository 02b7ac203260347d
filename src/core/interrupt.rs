use std::sync::OnceLock;

use crate::env_patch;
use crate::error::{Error, Result};
use crate::utils::command;

/// Exit status used when the operator interrupts a deploy.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Install the process-wide interrupt handler. Safe to call more than once;
/// only the first call registers anything.
///
/// On SIGINT/SIGTERM the running build command (with its process group) is
/// terminated and every patched file is restored before the process exits.
/// In-flight uploads are abandoned without notifying the remote store.
pub fn install() -> Result<()> {
    static INSTALLED: OnceLock<std::result::Result<(), String>> = OnceLock::new();

    let outcome = INSTALLED.get_or_init(|| {
        ctrlc::set_handler(|| {
            eprintln!("\n[deploy] {}", Error::interrupted().message);
            let stopped = command::terminate_children();
            if stopped > 0 {
                eprintln!("[deploy] Stopped {} running command(s)", stopped);
            }
            let restored = env_patch::restore_all();
            if restored > 0 {
                eprintln!("[deploy] Restored {} patched file(s)", restored);
            }
            std::process::exit(INTERRUPTED_EXIT_CODE);
        })
        .map_err(|e| e.to_string())
    });

    outcome
        .clone()
        .map_err(|e| Error::internal_unexpected(format!("Cannot install interrupt handler: {}", e)))
}
