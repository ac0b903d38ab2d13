/*!
 * Context Configuration
 *
 * Runtime configuration for contexts, their copy worker and the stream
 * transport
 */

use std::path::PathBuf;

/// Default kernel boot id location
pub const DEFAULT_BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// Default Yama ptrace scope location
pub const DEFAULT_PTRACE_SCOPE_PATH: &str = "/proc/sys/kernel/yama/ptrace_scope";

/// Largest control frame accepted by stream connections (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Context configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Backend name, first component of the domain fingerprint
    pub channel_name: String,
    /// Identifier used in log fields (random when unset)
    pub context_id: Option<String>,
    /// Where to read the kernel boot id from
    pub boot_id_path: PathBuf,
    /// Where to read the Yama ptrace scope from
    pub ptrace_scope_path: PathBuf,
    /// Name prefix of the copy worker thread
    pub worker_thread_name: String,
    /// Largest frame a stream connection will read
    pub max_frame_size: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            channel_name: "cma".to_string(),
            context_id: None,
            boot_id_path: PathBuf::from(DEFAULT_BOOT_ID_PATH),
            ptrace_scope_path: PathBuf::from(DEFAULT_PTRACE_SCOPE_PATH),
            worker_thread_name: "cma-copy".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ContextConfig {
    /// Default configuration overlaid with environment variables
    ///
    /// - CMA_CONTEXT_ID: context identifier
    /// - CMA_BOOT_ID_PATH: boot id file
    /// - CMA_MAX_FRAME_SIZE: stream frame limit in bytes
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay environment variables on this configuration
    pub fn with_env(mut self) -> Self {
        if let Ok(id) = std::env::var("CMA_CONTEXT_ID") {
            if !id.is_empty() {
                self.context_id = Some(id);
            }
        }

        if let Ok(path) = std::env::var("CMA_BOOT_ID_PATH") {
            self.boot_id_path = PathBuf::from(path);
        }

        if let Some(size) = std::env::var("CMA_MAX_FRAME_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.max_frame_size = size;
        }

        self
    }

    /// Set the context identifier
    pub fn with_context_id(mut self, id: impl Into<String>) -> Self {
        self.context_id = Some(id.into());
        self
    }

    /// Set the boot id path
    pub fn with_boot_id_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.boot_id_path = path.into();
        self
    }

    /// Set the ptrace scope path
    pub fn with_ptrace_scope_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ptrace_scope_path = path.into();
        self
    }
}
