//! Control-socket protocol: one text command per line.
//!
//! `mediaq run` listens on a Unix socket in the XDG state dir; `mediaq cancel`
//! (or anything that can write a line to the socket) sends commands to it.

use std::path::PathBuf;

use thiserror::Error;

use crate::job::JobId;

/// A parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Cancel(JobId),
    CancelAll,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlParseError {
    #[error("empty command")]
    Empty,
    #[error("missing job id")]
    MissingId,
    #[error("unknown command {0:?}")]
    Unknown(String),
}

impl ControlCommand {
    /// Parse `cancel <id>` or `cancel-all`.
    pub fn parse(line: &str) -> Result<Self, ControlParseError> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().ok_or(ControlParseError::Empty)?;
        match cmd.to_ascii_lowercase().as_str() {
            "cancel" => {
                let id = parts.next().ok_or(ControlParseError::MissingId)?;
                Ok(ControlCommand::Cancel(JobId::new(id)))
            }
            "cancel-all" => Ok(ControlCommand::CancelAll),
            _ => Err(ControlParseError::Unknown(cmd.to_string())),
        }
    }

    /// Wire form, newline-terminated.
    pub fn to_line(&self) -> String {
        match self {
            ControlCommand::Cancel(id) => format!("cancel {}\n", id),
            ControlCommand::CancelAll => "cancel-all\n".to_string(),
        }
    }
}

/// Default path of the control socket (next to the log file).
pub fn default_control_socket_path() -> anyhow::Result<PathBuf> {
    Ok(crate::logging::state_dir()?.join("control.sock"))
}
