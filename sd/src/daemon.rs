//! Worker process management
//!
//! A running `sd worker` registers its PID (and version) in a PID file. The
//! other subcommands use that file to find the worker and control it with
//! OS signals.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::control::ControlSignal;

/// Crate version, written next to the PID file by the worker
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default PID file location
fn default_pid_path() -> PathBuf {
    debug!("default_pid_path: called");
    let path = dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("schedaemon")
        .join("worker.pid");
    debug!(?path, "default_pid_path: returning path");
    path
}

/// Worker process manager
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
    version_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    /// Create a manager with the default PID file location
    pub fn new() -> Self {
        debug!("DaemonManager::new: called");
        Self::with_pid_file(default_pid_path())
    }

    /// Create a manager with a custom PID file path
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        debug!(?pid_file, "DaemonManager::with_pid_file: called");
        let version_file = pid_file.with_extension("version");
        Self { pid_file, version_file }
    }

    /// Use the configured PID file, or the default location
    pub fn from_config(pid_file: Option<PathBuf>) -> Self {
        pid_file.map(Self::with_pid_file).unwrap_or_default()
    }

    /// Check if a worker is running
    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Get the running worker's PID
    pub fn running_pid(&self) -> Option<u32> {
        debug!("DaemonManager::running_pid: called");
        let result = self.read_pid().filter(|&pid| is_process_running(pid));
        debug!(?result, "DaemonManager::running_pid: returning");
        result
    }

    fn read_pid(&self) -> Option<u32> {
        debug!(?self.pid_file, "DaemonManager::read_pid: called");
        read_trimmed(&self.pid_file)?.parse().ok()
    }

    fn write_pid(&self, pid: u32) -> Result<()> {
        debug!(pid, ?self.pid_file, "DaemonManager::write_pid: called");
        write_file(&self.pid_file, &pid.to_string()).context("Failed to write PID file")
    }

    /// Version recorded by the running worker
    pub fn read_version(&self) -> Option<String> {
        debug!(?self.version_file, "DaemonManager::read_version: called");
        read_trimmed(&self.version_file)
    }

    /// Register the current process as the worker
    ///
    /// Fails if another live process already holds the PID file.
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        debug!(pid, version = VERSION, "DaemonManager::register_self: called");
        if let Some(existing) = self.running_pid().filter(|&p| p != pid) {
            return Err(eyre::eyre!(
                "Worker already running with PID {} ({})",
                existing,
                self.pid_file.display()
            ));
        }

        self.write_pid(pid)?;
        write_file(&self.version_file, VERSION).context("Failed to write version file")?;
        info!(pid, version = VERSION, pid_file = %self.pid_file.display(), "Worker registered");
        Ok(())
    }

    /// Remove the PID and version files
    pub fn unregister(&self) -> Result<()> {
        debug!(?self.pid_file, "DaemonManager::unregister: called");
        // The worker and `sd stop` may both get here
        for path in [&self.pid_file, &self.version_file] {
            match fs::remove_file(path) {
                Ok(()) => debug!(?path, "Removed file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).context(format!("Failed to remove {}", path.display())),
            }
        }
        Ok(())
    }

    /// Deliver the OS signal mapped to `signal` to the running worker
    pub fn send_signal(&self, signal: ControlSignal) -> Result<u32> {
        debug!(?signal, "DaemonManager::send_signal: called");
        let pid = self
            .running_pid()
            .ok_or_else(|| eyre::eyre!("Worker is not running"))?;
        deliver(pid, signal)?;
        info!(pid, ?signal, "Sent control signal to worker");
        Ok(pid)
    }

    pub fn pause(&self) -> Result<u32> {
        self.send_signal(ControlSignal::Pause)
    }

    pub fn resume(&self) -> Result<u32> {
        self.send_signal(ControlSignal::Resume)
    }

    /// Ask the worker to terminate and wait for it to exit
    ///
    /// The worker finishes its in-flight dispatch first. After `grace` the
    /// process is killed outright.
    pub fn stop(&self, grace: std::time::Duration) -> Result<u32> {
        debug!(?grace, "DaemonManager::stop: called");
        let pid = self.send_signal(ControlSignal::Terminate)?;

        let deadline = std::time::Instant::now() + grace;
        while is_process_running(pid) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        if is_process_running(pid) {
            warn!(pid, "Worker did not stop gracefully, sending SIGKILL");
            #[cfg(unix)]
            {
                use nix::sys::signal::{Signal, kill};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }

        self.unregister()?;
        info!(pid, "Worker stopped");
        Ok(pid)
    }

    /// Get the PID file path
    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    /// Get the worker status
    pub fn status(&self) -> DaemonStatus {
        debug!("DaemonManager::status: called");
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            version: pid.and(self.read_version()),
            pid_file: self.pid_file.clone(),
        }
    }
}

/// Worker status information
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    /// Version reported by the running worker
    pub version: Option<String>,
    pub pid_file: PathBuf,
}

fn read_trimmed(path: &Path) -> Option<String> {
    let mut contents = String::new();
    fs::File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    Some(contents.trim().to_string())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create directory")?;
    }
    let mut file = fs::File::create(path)?;
    write!(file, "{}", contents)?;
    Ok(())
}

#[cfg(unix)]
fn deliver(pid: u32, signal: ControlSignal) -> Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let os_signal = crate::signals::os_signal_for(signal);
    debug!(pid, ?os_signal, "deliver: sending");
    kill(Pid::from_raw(pid as i32), os_signal).context(format!("Failed to send {:?} to {}", os_signal, pid))
}

#[cfg(not(unix))]
fn deliver(pid: u32, signal: ControlSignal) -> Result<()> {
    Err(eyre::eyre!(
        "Sending {:?} to worker {} is only supported on unix",
        signal,
        pid
    ))
}

/// Check if a process with the given PID is running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        // Signal 0 only checks for existence
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}
