// Human-readable error messages for tod

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use colored::*;

/// Initialize color output based on TTY detection and NO_COLOR environment variable
fn should_use_colors() -> bool {
    // Check NO_COLOR environment variable first (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    // Errors are written to stderr
    std::io::stderr().is_terminal()
}

/// All error types in tod
#[derive(Debug, Clone)]
pub enum TodError {
    /// The reachability probe failed (host unreachable at transport level)
    Reachability { host: String, message: String },

    /// The host answered the probe but the SSH session could not be established
    Handshake {
        host: String,
        message: String,
        suggestion: Option<String>,
    },

    /// A command ran but the transport or the remote command reported failure
    Execution {
        host: String,
        command: String,
        message: String,
        stderr: Option<String>,
    },

    /// Commands could not be assigned because no host is eligible
    Assignment { message: String, pending: usize },

    /// Inventory or command batch could not be loaded
    Config {
        message: String,
        suggestion: Option<String>,
    },

    /// I/O errors
    Io {
        message: String,
        path: Option<PathBuf>,
    },
}

impl TodError {
    pub fn config(message: impl Into<String>) -> Self {
        TodError::Config {
            message: message.into(),
            suggestion: None,
        }
    }

    /// Host the error relates to, if any
    pub fn host(&self) -> Option<&str> {
        match self {
            TodError::Reachability { host, .. }
            | TodError::Handshake { host, .. }
            | TodError::Execution { host, .. } => Some(host),
            _ => None,
        }
    }

    /// One-line description, used for structured log fields
    pub fn reason(&self) -> &str {
        match self {
            TodError::Reachability { message, .. }
            | TodError::Handshake { message, .. }
            | TodError::Execution { message, .. }
            | TodError::Assignment { message, .. }
            | TodError::Config { message, .. }
            | TodError::Io { message, .. } => message,
        }
    }
}

impl std::error::Error for TodError {}

/// Styles applied to message labels, or plain text when colors are off
#[derive(Debug, Clone, Copy)]
struct Palette {
    colors: bool,
}

impl Palette {
    fn paint(self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.colors {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn error(self, text: &str) -> String {
        self.paint(text, |t| t.red().bold())
    }

    fn hint(self, text: &str) -> String {
        self.paint(text, |t| t.yellow().bold())
    }

    fn label(self, text: &str) -> String {
        self.paint(text, |t| t.dimmed())
    }
}

impl fmt::Display for TodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let palette = Palette {
            colors: should_use_colors(),
        };
        self.render(f, palette)
    }
}

impl TodError {
    fn render(&self, f: &mut fmt::Formatter<'_>, palette: Palette) -> fmt::Result {
        match self {
            TodError::Reachability { host, message } => {
                writeln!(f, "{}: {}", palette.error("UNREACHABLE"), message)?;
                writeln!(f, "  {} {}", palette.label("Host:"), host)?;
                Ok(())
            }

            TodError::Handshake {
                host,
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", palette.error("SSH ERROR"), message)?;
                writeln!(f, "  {} {}", palette.label("Host:"), host)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", palette.hint("Hint"), suggestion)?;
                }

                Ok(())
            }

            TodError::Execution {
                host,
                command,
                message,
                stderr,
            } => {
                writeln!(f, "{}: {}", palette.error("EXECUTION ERROR"), message)?;
                writeln!(f, "  {} {}", palette.label("Host:"), host)?;
                writeln!(f, "  {} {}", palette.label("Command:"), command)?;

                if let Some(stderr) = stderr {
                    if !stderr.is_empty() {
                        writeln!(f)?;
                        writeln!(f, "  {}:", palette.label("stderr"))?;
                        for line in stderr.lines().take(10) {
                            writeln!(f, "    {}", line)?;
                        }
                    }
                }

                Ok(())
            }

            TodError::Assignment { message, pending } => {
                writeln!(f, "{}: {}", palette.error("DISPATCH ERROR"), message)?;
                writeln!(f, "  {} {}", palette.label("Undispatched commands:"), pending)?;
                Ok(())
            }

            TodError::Config {
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", palette.error("CONFIG ERROR"), message)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", palette.hint("Hint"), suggestion)?;
                }

                Ok(())
            }

            TodError::Io { message, path } => {
                writeln!(f, "{}: {}", palette.error("I/O ERROR"), message)?;
                if let Some(path) = path {
                    writeln!(f, "  {} {}", palette.label("Path:"), path.display())?;
                }
                Ok(())
            }
        }
    }
}

/// Suggest a fix for a failed SSH connection based on the io error kind
pub fn connection_suggestion(e: &std::io::Error) -> Option<String> {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Some("Ensure SSH service is running on the target host".to_string())
        }
        std::io::ErrorKind::TimedOut => {
            Some("Check network connectivity and firewall rules".to_string())
        }
        std::io::ErrorKind::PermissionDenied => {
            Some("Check SSH key permissions and authentication".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display() {
        let err = TodError::Execution {
            host: "web1".to_string(),
            command: "uptime".to_string(),
            message: "Command exited with status 2".to_string(),
            stderr: Some("uptime: not found".to_string()),
        };

        let output = format!("{}", err);

        assert!(output.contains("EXECUTION ERROR"));
        assert!(output.contains("web1"));
        assert!(output.contains("uptime: not found"));
    }

    struct Plain<'a>(&'a TodError);

    impl fmt::Display for Plain<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.render(f, Palette { colors: false })
        }
    }

    #[test]
    fn test_plain_render_has_no_escape_codes() {
        let err = TodError::Handshake {
            host: "web1".to_string(),
            message: "SSH handshake failed".to_string(),
            suggestion: Some("Check sshd".to_string()),
        };

        let output = Plain(&err).to_string();
        assert!(!output.contains('\x1b'));
        assert!(output.starts_with("SSH ERROR: SSH handshake failed\n"));
        assert!(output.contains("Hint: Check sshd"));

        // Rendering plain leaves the global color setting alone
        assert_eq!(Palette { colors: true }.paint("x", |t| t.red()), "x".red().to_string());
    }

    #[test]
    fn test_reason_and_host() {
        let err = TodError::Reachability {
            host: "db2".to_string(),
            message: "Connection refused".to_string(),
        };

        assert_eq!(err.host(), Some("db2"));
        assert_eq!(err.reason(), "Connection refused");

        let err = TodError::Assignment {
            message: "No connected host left".to_string(),
            pending: 3,
        };
        assert_eq!(err.host(), None);
    }
}
