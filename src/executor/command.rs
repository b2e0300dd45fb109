// Commands and the credentials they run with

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::output::errors::TodError;

/// What a session needs to authenticate as a user
pub trait Credentials: Send + Sync {
    fn username(&self) -> &str;

    fn private_key(&self) -> Option<&Path> {
        None
    }

    fn password(&self) -> Option<&str> {
        None
    }
}

/// Username with optional key file and password
#[derive(Clone, Default)]
pub struct User {
    pub name: String,
    pub private_key: Option<PathBuf>,
    pub password: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        User {
            name: name.into(),
            private_key: None,
            password: None,
        }
    }

    /// The invoking user, falling back to root
    pub fn current() -> Self {
        User::new(std::env::var("USER").unwrap_or_else(|_| "root".to_string()))
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

// Keeps the password out of logs
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("name", &self.name)
            .field("private_key", &self.private_key)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials for User {
    fn username(&self) -> &str {
        &self.name
    }

    fn private_key(&self) -> Option<&Path> {
        self.private_key.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// A shell command and the user it runs as
#[derive(Clone)]
pub struct Command {
    text: String,
    user: Arc<dyn Credentials>,
}

impl Command {
    pub fn new(text: impl Into<String>, user: Arc<dyn Credentials>) -> Self {
        Command {
            text: text.into(),
            user,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn user(&self) -> Arc<dyn Credentials> {
        Arc::clone(&self.user)
    }

    /// One command per line; blank lines and `#` comments are skipped
    pub fn parse_batch(content: &str, user: Arc<dyn Credentials>) -> Vec<Command> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| Command::new(line, Arc::clone(&user)))
            .collect()
    }

    pub fn from_file(path: &Path, user: Arc<dyn Credentials>) -> Result<Vec<Command>, TodError> {
        let content = std::fs::read_to_string(path).map_err(|e| TodError::Config {
            message: format!("Failed to read commands file {}: {}", path.display(), e),
            suggestion: Some("Check the --commands-file path".to_string()),
        })?;

        Ok(Command::parse_batch(&content, user))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("user", &self.user.username())
            .finish()
    }
}
