use std::{
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

/// Terminates every process started from the executable at `name`, except this one and its
/// children. Returns how many were stopped.
pub fn kill_previous_servers(name: &Path) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Couldn't get own pid: {e}"))?;
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            info!("Stopping {pid} ({name:?})");
            // This will forcefully terminate the process on Windows.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            killed += 1;
        }
    }
    Ok(killed)
}

/// Shuts down running daemons and starts a new one detached from this console.
pub fn restart_server(daemon: &Path, config: &Path) -> Result<()> {
    kill_previous_servers(daemon)?;
    let mut command = Command::new(daemon);
    command.arg("--force").arg("--config").arg(config);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    #[allow(clippy::zombie_processes)]
    let child = command
        .spawn()
        .map_err(|e| anyhow!("Couldn't start {daemon:?}: {e}"))?;
    info!("Spawned daemon with pid {}", child.id());
    Ok(())
}
