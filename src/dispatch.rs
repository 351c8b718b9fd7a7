//! Routes parsed commands to the registry.
//!
//! Two names are built in: `set <name> <value>` writes a writable, and
//! `advertise` asks for the advertise frame. Everything else is looked up as
//! a user command. Nothing here can end the session: bad input, failing
//! commands and panicking commands all become error log entries.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::logbuf::LogBuffer;
use crate::registry::Registry;
use crate::tokenizer::CommandCall;

/// Built-in command that writes a writable.
pub const SET_COMMAND: &str = "set";

/// Built-in command that requests the advertise frame.
pub const ADVERTISE_COMMAND: &str = "advertise";

/// What to do with a command name nobody registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCommandPolicy {
    /// Drop it silently.
    #[default]
    Ignore,
    /// Report it as an error log entry.
    #[serde(alias = "log_error")]
    LogError,
}

/// Outcome of dispatching one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The command ran (successfully or not; failures are logged).
    Handled,
    /// The caller should send the advertise frame to the requester.
    Advertise,
    /// No command by that name.
    Ignored,
}

/// Execute `call` against `registry`, recording problems in `log`.
pub fn dispatch(
    registry: &mut Registry,
    call: &CommandCall,
    policy: UnknownCommandPolicy,
    log: &mut LogBuffer,
) -> Dispatch {
    match call.name.as_str() {
        SET_COMMAND => {
            handle_set(registry, &call.args, log);
            Dispatch::Handled
        }
        ADVERTISE_COMMAND => Dispatch::Advertise,
        name if registry.has_command(name) => {
            run_command(registry, name, &call.args, log);
            Dispatch::Handled
        }
        name => {
            log::debug!("[Bridge] Unknown command: {}", name);
            if policy == UnknownCommandPolicy::LogError {
                log.push_error(format!("Unknown command: {name}"));
            }
            Dispatch::Ignored
        }
    }
}

fn handle_set(registry: &mut Registry, args: &[String], log: &mut LogBuffer) {
    let [name, raw] = args else {
        log.push_error(format!(
            "Expected 2 arguments to set but got {}",
            args.len()
        ));
        return;
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| registry.set(name, raw)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log.push_error(e.to_string()),
        Err(payload) => log.push_error(format!(
            "Update for {name} panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn run_command(registry: &mut Registry, name: &str, args: &[String], log: &mut LogBuffer) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| registry.call_command(name, args)));
    match outcome {
        Ok(Some(Ok(()))) | Ok(None) => {}
        Ok(Some(Err(e))) => log.push_error(format!("Command {name} failed: {e:#}")),
        Err(payload) => log.push_error(format!(
            "Command {name} panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
