//! `mediaq cancel <id>`: ask the running queue to cancel one job.

use anyhow::Result;
use mediaq_core::control::{default_control_socket_path, ControlCommand};
use mediaq_core::JobId;

use crate::cli::control_socket;

pub async fn run_cancel(id: &str) -> Result<()> {
    let path = default_control_socket_path()?;
    control_socket::send_command(&path, &ControlCommand::Cancel(JobId::new(id))).await?;
    println!("Cancel requested for {id}");
    Ok(())
}
