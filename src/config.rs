// Run-wide settings assembled from the command line

use std::path::PathBuf;
use std::time::Duration;

use crate::executor::User;
use crate::inventory::HostDefaults;

/// Configuration for a dispatch run
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Connection settings for hosts that do not set their own
    pub defaults: HostDefaults,
    /// User every command authenticates as
    pub user: User,
    /// Verbose output
    pub verbose: bool,
    /// Only show failures
    pub quiet: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            defaults: HostDefaults::default(),
            user: User::current(),
            verbose: false,
            quiet: false,
        }
    }
}

impl DispatchConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.defaults.port = port;
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.defaults.protocol = protocol.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = timeout;
        self
    }

    pub fn with_user(mut self, name: impl Into<String>) -> Self {
        self.user.name = name.into();
        self
    }

    pub fn with_private_key(mut self, path: PathBuf) -> Self {
        self.user.private_key = Some(path);
        self
    }

    pub fn with_password(mut self, password: String) -> Self {
        self.user.password = Some(password);
        self
    }

    /// Log filter directive matching the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
