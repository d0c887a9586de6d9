//! Process identity and service placement.

use std::fmt;

/// Where a service is implemented, relative to the application package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placement {
    /// The designated core process, which also hosts the root registry.
    Core,
    /// The process named `<package><suffix>`; an empty suffix is the main process.
    Process(String),
}

/// How the current process reaches a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Implemented in this process: no IPC.
    Local,
    /// Implemented in the core process: resolve through the root registry.
    Core,
    /// Implemented in the named sibling: resolve through its peer manager.
    Peer(String),
}

/// Names of the current process and of the core process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    package: String,
    process: String,
    core_process: String,
}

impl ProcessIdentity {
    pub fn new(package: &str, process: &str, core_suffix: &str) -> Self {
        Self {
            package: package.to_string(),
            process: process.to_string(),
            core_process: format!("{package}{core_suffix}"),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn process_name(&self) -> &str {
        &self.process
    }

    pub fn core_process(&self) -> &str {
        &self.core_process
    }

    pub fn is_core(&self) -> bool {
        self.process == self.core_process
    }

    /// Full name of the process implementing `placement`.
    pub fn implementing_process(&self, placement: &Placement) -> String {
        match placement {
            Placement::Core => self.core_process.clone(),
            Placement::Process(suffix) => format!("{}{suffix}", self.package),
        }
    }

    pub fn route(&self, placement: &Placement) -> Route {
        let target = self.implementing_process(placement);
        if target == self.process {
            Route::Local
        } else if *placement == Placement::Core {
            Route::Core
        } else {
            Route::Peer(target)
        }
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.process)
    }
}

/// Best-effort name of the running OS process.
///
/// Reads the first `/proc/self/cmdline` argument on Linux and falls back to
/// the executable file name.
pub fn current_process_name() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Some(name) = proc_cmdline_name() {
            return name;
        }
    }
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| format!("pid-{}", std::process::id()))
}

#[cfg(target_os = "linux")]
fn proc_cmdline_name() -> Option<String> {
    let raw = std::fs::read("/proc/self/cmdline").ok()?;
    let first = raw.split(|b| *b == 0).next()?;
    if first.is_empty() {
        return None;
    }
    let arg0 = String::from_utf8_lossy(first);
    // argv[0] may be a path; process names are compared without it.
    let name = arg0.rsplit('/').next().unwrap_or(arg0.as_ref());
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(process: &str) -> ProcessIdentity {
        ProcessIdentity::new("com.example", process, ":core")
    }

    #[test]
    fn core_process_is_detected() {
        assert!(identity("com.example:core").is_core());
        assert!(!identity("com.example").is_core());
    }

    #[test]
    fn route_is_relative_to_the_current_process() {
        let main = identity("com.example");
        assert_eq!(main.route(&Placement::Core), Route::Core);
        assert_eq!(main.route(&Placement::Process(String::new())), Route::Local);
        assert_eq!(
            main.route(&Placement::Process(":ui".to_string())),
            Route::Peer("com.example:ui".to_string())
        );

        let core = identity("com.example:core");
        assert_eq!(core.route(&Placement::Core), Route::Local);
        assert_eq!(
            core.route(&Placement::Process(String::new())),
            Route::Peer("com.example".to_string())
        );
    }

    #[test]
    fn current_process_name_is_not_empty() {
        assert!(!current_process_name().is_empty());
    }
}
