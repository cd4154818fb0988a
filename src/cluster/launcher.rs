// src/cluster/launcher.rs

//! Replica process runner for [`LocalCluster`] execution units.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::cluster::LocalCluster;
use crate::model::{CompletionMode, ObjectKey, UnitDescriptor};

pub const COMPLETION_INDEX_ENV: &str = "JOB_COMPLETION_INDEX";
pub const PORT_ENV: &str = "RUNDAG_PORT";

/// Spawn one task per replica of the unit.
///
/// The returned handles abort the replica tasks; aborting drops the child
/// process, which kills it.
pub(crate) fn spawn_unit(
    cluster: LocalCluster,
    key: ObjectKey,
    descriptor: UnitDescriptor,
) -> Vec<AbortHandle> {
    (0..descriptor.parallelism)
        .map(|index| {
            let cluster = cluster.clone();
            let key = key.clone();
            let descriptor = descriptor.clone();
            tokio::spawn(async move {
                let success = match run_replica(&key, &descriptor, index).await {
                    Ok(success) => success,
                    Err(err) => {
                        error!(unit = %key, index, error = %err, "replica execution error");
                        false
                    }
                };
                cluster.record_replica_exit(&key, success).await;
            })
            .abort_handle()
        })
        .collect()
}

/// Program and argument list for a descriptor.
///
/// The first command item is the program; without a command the image
/// names the program.
pub fn command_line(descriptor: &UnitDescriptor) -> (String, Vec<String>) {
    let mut items = descriptor.command.iter();
    let program = items
        .next()
        .cloned()
        .unwrap_or_else(|| descriptor.image.clone());
    let args = items.chain(descriptor.args.iter()).cloned().collect();
    (program, args)
}

async fn run_replica(key: &ObjectKey, descriptor: &UnitDescriptor, index: u32) -> Result<bool> {
    let (program, args) = command_line(descriptor);
    info!(unit = %key, index, program = %program, "starting replica process");

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .envs(descriptor.envs.iter().map(|(k, v)| (k, v)))
        .env(PORT_ENV, descriptor.port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if descriptor.completion_mode == CompletionMode::Indexed {
        cmd.env(COMPLETION_INDEX_ENV, index.to_string());
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning replica {index} of unit '{key}'"))?;

    // Always consume output so pipe buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        let unit = key.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(unit = %unit, index, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let unit = key.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(unit = %unit, index, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for replica {index} of unit '{key}'"))?;

    info!(
        unit = %key,
        index,
        exit_code = status.code().unwrap_or(-1),
        success = status.success(),
        "replica process exited"
    );
    Ok(status.success())
}
