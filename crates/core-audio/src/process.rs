//! Lookup of the process that owns a session.

use std::path::PathBuf;

use audio_api::AudioError;

/// What the bridge needs to know about an owning process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Full path of the main executable.
    pub executable_path: PathBuf,
    /// Human readable description of the executable.
    pub description: String,
}

/// Resolves process information from a process id.
pub trait ProcessResolver: Send + Sync {
    /// Fails with [`AudioError::ProcessUnavailable`] if the process has exited
    /// or cannot be inspected.
    fn resolve(&self, pid: u32) -> Result<ProcessInfo, AudioError>;
}

/// Resolver backed by the operating system.
///
/// On Linux this reads `/proc/<pid>/exe` and `/proc/<pid>/comm`. Other
/// platforms report every process as unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessResolver;

#[cfg(target_os = "linux")]
impl ProcessResolver for SystemProcessResolver {
    fn resolve(&self, pid: u32) -> Result<ProcessInfo, AudioError> {
        let proc_dir = PathBuf::from("/proc").join(pid.to_string());
        let unavailable = |e: std::io::Error| AudioError::ProcessUnavailable {
            pid,
            reason: e.to_string(),
        };

        let executable_path = std::fs::read_link(proc_dir.join("exe")).map_err(unavailable)?;
        let description = match std::fs::read_to_string(proc_dir.join("comm")) {
            Ok(comm) => comm.trim().to_string(),
            Err(_) => executable_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        Ok(ProcessInfo {
            executable_path,
            description,
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl ProcessResolver for SystemProcessResolver {
    fn resolve(&self, pid: u32) -> Result<ProcessInfo, AudioError> {
        Err(AudioError::ProcessUnavailable {
            pid,
            reason: "process inspection is not supported on this platform".to_string(),
        })
    }
}
