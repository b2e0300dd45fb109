// SSH transport built on ssh2

use async_trait::async_trait;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ssh2::{Channel, KeyboardInteractivePrompt};
use tracing::debug;

use super::command::Credentials;
use super::health::address_family;
use super::{CommandResult, Session, Transport};
use crate::inventory::Host;
use crate::output::errors::{connection_suggestion, TodError};

/// Opens one SSH session per command
#[derive(Debug, Clone, Default)]
pub struct SshTransport;

impl SshTransport {
    pub fn new() -> Self {
        SshTransport
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn open(&self, host: &Host, user: Arc<dyn Credentials>) -> Box<dyn Session> {
        Box::new(SshSession::new(host.clone(), user))
    }
}

/// ssh2 session plus the channel of the command being run
///
/// ssh2 is blocking, so every network call runs on the blocking pool.
pub struct SshSession {
    host: Host,
    user: Arc<dyn Credentials>,
    session: Option<ssh2::Session>,
    channel: Option<Channel>,
}

impl SshSession {
    pub fn new(host: Host, user: Arc<dyn Credentials>) -> Self {
        SshSession {
            host,
            user,
            session: None,
            channel: None,
        }
    }

    fn handshake_error(&self, message: String) -> TodError {
        TodError::Handshake {
            host: self.host.name.clone(),
            message,
            suggestion: None,
        }
    }
}

#[async_trait]
impl Session for SshSession {
    async fn connect(&mut self) -> Result<(), TodError> {
        self.close();

        let host = self.host.clone();
        let user = Arc::clone(&self.user);
        let session = tokio::task::spawn_blocking(move || establish(&host, user.as_ref()))
            .await
            .map_err(|e| self.handshake_error(format!("SSH connect task failed: {}", e)))??;

        debug!(host = %self.host.name, user = %self.user.username(), "ssh session established");
        self.session = Some(session);
        Ok(())
    }

    async fn add_session(&mut self) -> Result<(), TodError> {
        let session = self
            .session
            .take()
            .ok_or_else(|| self.handshake_error("Session is not connected".to_string()))?;

        let (session, channel) = tokio::task::spawn_blocking(move || {
            let channel = session.channel_session();
            (session, channel)
        })
        .await
        .map_err(|e| self.handshake_error(format!("SSH channel task failed: {}", e)))?;

        self.session = Some(session);
        let channel = channel
            .map_err(|e| self.handshake_error(format!("Failed to open channel: {}", e)))?;
        self.channel = Some(channel);
        Ok(())
    }

    async fn run(&mut self, command: &str) -> Result<CommandResult, TodError> {
        let host = self.host.name.clone();
        let execution_error = |message: String| TodError::Execution {
            host: host.clone(),
            command: command.to_string(),
            message,
            stderr: None,
        };

        let channel = self
            .channel
            .take()
            .ok_or_else(|| execution_error("No channel open for the command".to_string()))?;

        let text = command.to_string();
        let (channel, result) = tokio::task::spawn_blocking(move || {
            let mut channel = channel;
            let result = exec_on_channel(&mut channel, &text);
            (channel, result)
        })
        .await
        .map_err(|e| execution_error(format!("SSH exec task failed: {}", e)))?;

        self.channel = Some(channel);
        result.map_err(execution_error)
    }

    fn close(&mut self) {
        self.channel = None;

        if let Some(session) = self.session.take() {
            let disconnect = move || {
                session.disconnect(None, "command done", None).ok();
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(disconnect);
                }
                Err(_) => disconnect(),
            }
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn exec_on_channel(channel: &mut Channel, command: &str) -> Result<CommandResult, String> {
    channel
        .exec(command)
        .map_err(|e| format!("Failed to execute command: {}", e))?;

    let stdout =
        read_lossy(channel).map_err(|e| format!("Failed to read command output: {}", e))?;
    let stderr = read_lossy(&mut channel.stderr()).unwrap_or_default();

    channel
        .wait_close()
        .map_err(|e| format!("Channel did not close cleanly: {}", e))?;
    let exit_code = channel
        .exit_status()
        .map_err(|e| format!("Failed to read exit status: {}", e))?;

    Ok(CommandResult {
        stdout,
        stderr,
        exit_code,
    })
}

/// Read a stream to the end. Output that is not valid UTF-8 is kept,
/// with the bad bytes replaced.
fn read_lossy(reader: &mut impl Read) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Connect, handshake and authenticate. Runs on the blocking pool.
fn establish(host: &Host, user: &dyn Credentials) -> Result<ssh2::Session, TodError> {
    let handshake_error = |message: String, suggestion: Option<String>| TodError::Handshake {
        host: host.name.clone(),
        message,
        suggestion,
    };

    let address = resolve(host).map_err(|m| handshake_error(m, None))?;

    // TCP connection with timeout
    let tcp = if host.timeout.is_zero() {
        TcpStream::connect(address)
    } else {
        TcpStream::connect_timeout(&address, host.timeout)
    }
    .map_err(|e| handshake_error(format!("Connection failed: {}", e), connection_suggestion(&e)))?;

    let mut session = ssh2::Session::new()
        .map_err(|e| handshake_error(format!("Failed to create SSH session: {}", e), None))?;

    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(host.timeout.as_millis()).unwrap_or(u32::MAX));

    session.handshake().map_err(|e| {
        handshake_error(
            format!("SSH handshake failed: {}", e),
            Some("Check SSH service is running on the target".to_string()),
        )
    })?;

    authenticate(&session, user);

    if !session.authenticated() {
        return Err(handshake_error(
            format!("Authentication failed for user '{}'", user.username()),
            Some(
                "Ensure SSH key is added to agent, specify --private-key, or use --ask-pass for password auth"
                    .to_string(),
            ),
        ));
    }

    // Commands themselves run without a deadline
    session.set_timeout(0);
    Ok(session)
}

fn resolve(host: &Host) -> Result<SocketAddr, String> {
    let family = address_family(&host.protocol)?;

    let address = host.address();
    address
        .to_socket_addrs()
        .map_err(|e| format!("Failed to resolve {}: {}", address, e))?
        .find(family)
        .ok_or_else(|| format!("No {} address found for {}", host.protocol, address))
}

/// Agent first, then key files, then password. Stops at the first success.
fn authenticate(session: &ssh2::Session, user: &dyn Credentials) {
    let username = user.username();

    if let Ok(mut agent) = session.agent() {
        if agent.connect().is_ok() {
            agent.list_identities().ok();
            for identity in agent.identities().unwrap_or_default() {
                if agent.userauth(username, &identity).is_ok() {
                    return;
                }
            }
        }
    }

    let key_paths: Vec<PathBuf> = user
        .private_key()
        .map(Path::to_path_buf)
        .into_iter()
        .chain(
            home_dir()
                .map(|h| vec![h.join(".ssh/id_ed25519"), h.join(".ssh/id_rsa")])
                .unwrap_or_default(),
        )
        .collect();

    for key_path in key_paths {
        if key_path.exists()
            && session
                .userauth_pubkey_file(username, None, &key_path, None)
                .is_ok()
        {
            return;
        }
    }

    if let Some(password) = user.password() {
        if session.userauth_password(username, password).is_ok() {
            return;
        }
        // Fall back to keyboard-interactive auth (used by some PAM configurations)
        let mut prompter = PasswordPrompter(password.to_string());
        session
            .userauth_keyboard_interactive(username, &mut prompter)
            .ok();
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Helper for keyboard-interactive authentication
struct PasswordPrompter(String);

impl KeyboardInteractivePrompt for PasswordPrompter {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        // Return the password for each prompt (typically just one "Password:" prompt)
        prompts.iter().map(|_| self.0.clone()).collect()
    }
}
