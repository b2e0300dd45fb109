// tod CLI - dispatch shell commands over SSH to a fleet of hosts

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use tod::executor::{run_commands, Command, Credentials, SshTransport};
use tod::inventory::Inventory;
use tod::output::{TerminalOutput, TodError};
use tod::DispatchConfig;

#[derive(Parser)]
#[command(
    name = "tod",
    about = "Dispatch shell commands over SSH to a fleet of hosts",
    version,
    author,
    disable_colored_help = true,
    term_width = 0,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
#[command(disable_colored_help = true)]
enum Commands {
    /// Run a batch of commands across the hosts
    Run {
        #[command(flatten)]
        hosts: HostSource,

        /// Command to run (can repeat)
        #[arg(short = 'c', long = "command")]
        commands: Vec<String>,

        /// File with one command per line ('#' starts a comment)
        #[arg(short = 'f', long)]
        commands_file: Option<PathBuf>,

        /// SSH user (defaults to $USER)
        #[arg(short, long)]
        user: Option<String>,

        /// Path to SSH private key
        #[arg(long)]
        private_key: Option<PathBuf>,

        /// SSH password (insecure - prefer --ask-pass)
        #[arg(long)]
        password: Option<String>,

        /// Prompt for SSH password
        #[arg(short = 'k', long)]
        ask_pass: bool,
    },

    /// List the hosts and their dispatch weight
    Hosts {
        #[command(flatten)]
        hosts: HostSource,
    },
}

#[derive(Args)]
struct HostSource {
    /// Path to the YAML inventory file
    #[arg(short, long, conflicts_with = "stdin")]
    inventory: Option<PathBuf>,

    /// Read a '|'-separated host list from standard input
    #[arg(long)]
    stdin: bool,

    /// Default SSH port
    #[arg(short, long, default_value = "22")]
    port: u16,

    /// Default transport protocol (tcp, tcp4 or tcp6)
    #[arg(long, default_value = "tcp")]
    protocol: String,

    /// Default connection timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = DispatchConfig {
        verbose: cli.verbose,
        quiet: cli.quiet,
        ..Default::default()
    };
    init_logging(&config);

    let result = match cli.command {
        Commands::Run {
            hosts,
            commands,
            commands_file,
            user,
            private_key,
            password,
            ask_pass,
        } => {
            run(
                config,
                hosts,
                commands,
                commands_file,
                user,
                private_key,
                password,
                ask_pass,
            )
            .await
        }
        Commands::Hosts { hosts } => list_hosts(config, hosts),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &DispatchConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[allow(clippy::too_many_arguments)]
async fn run(
    config: DispatchConfig,
    source: HostSource,
    commands: Vec<String>,
    commands_file: Option<PathBuf>,
    user: Option<String>,
    private_key: Option<PathBuf>,
    password: Option<String>,
    ask_pass: bool,
) -> Result<(), TodError> {
    let mut config = apply_host_source(config, &source);
    if let Some(user) = user {
        config = config.with_user(user);
    }
    if let Some(key) = private_key {
        config = config.with_private_key(key);
    }
    if ask_pass {
        config = config.with_password(prompt_password("SSH password: ")?);
    } else if let Some(password) = password {
        config = config.with_password(password);
    }

    let inventory = load_inventory(&source, &config)?;

    let user: Arc<dyn Credentials> = Arc::new(config.user.clone());
    let mut batch: Vec<Command> = commands
        .iter()
        .map(|text| Command::new(text.as_str(), Arc::clone(&user)))
        .collect();
    if let Some(path) = commands_file {
        batch.extend(Command::from_file(&path, Arc::clone(&user))?);
    }

    if batch.is_empty() {
        return Err(TodError::Config {
            message: "No commands to run".to_string(),
            suggestion: Some("Pass --command or --commands-file".to_string()),
        });
    }

    let output = Arc::new(TerminalOutput::new(config.verbose, config.quiet));
    run_commands(
        Arc::new(SshTransport::new()),
        inventory.into_hosts(),
        batch,
        output,
    )
    .await?;

    Ok(())
}

fn list_hosts(config: DispatchConfig, source: HostSource) -> Result<(), TodError> {
    let config = apply_host_source(config, &source);
    let inventory = load_inventory(&source, &config)?;

    println!("{} {} host(s)", "Found".green(), inventory.len());
    println!();

    for host in &inventory.hosts {
        println!("  {} {}", "•".cyan(), host.name.white().bold());
        println!("    {} {}", "Address:".dimmed(), host.address());
        println!("    {} {}", "Protocol:".dimmed(), host.protocol);
        println!("    {} {}s", "Timeout:".dimmed(), host.timeout.as_secs());
        println!(
            "    {} {} (priority {} x threads {})",
            "Weight:".dimmed(),
            host.weight(),
            host.priority,
            host.threads
        );
        println!();
    }

    Ok(())
}

fn apply_host_source(config: DispatchConfig, source: &HostSource) -> DispatchConfig {
    config
        .with_port(source.port)
        .with_protocol(source.protocol.clone())
        .with_timeout(Duration::from_secs(source.timeout))
}

/// Inventory file if given, otherwise the host list on stdin
fn load_inventory(source: &HostSource, config: &DispatchConfig) -> Result<Inventory, TodError> {
    if let Some(path) = &source.inventory {
        return Inventory::from_file(path, &config.defaults);
    }

    if source.stdin {
        let mut list = String::new();
        io::stdin()
            .read_to_string(&mut list)
            .map_err(|e| TodError::Io {
                message: format!("Failed to read host list from stdin: {}", e),
                path: None,
            })?;
        return Inventory::from_host_list(&list, &config.defaults);
    }

    Err(TodError::Config {
        message: "No hosts given".to_string(),
        suggestion: Some("Use --inventory <file> or pipe 'host1|host2' with --stdin".to_string()),
    })
}

fn prompt_password(prompt: &str) -> Result<String, TodError> {
    // Print prompt to stderr so it appears even with redirected stdout
    eprint!("{}", prompt.cyan());
    io::stderr().flush().ok();

    // Read password with echo disabled
    let password = rpassword::read_password().map_err(|e| TodError::Config {
        message: format!("Failed to read password: {}", e),
        suggestion: Some("Try using --password instead of --ask-pass".to_string()),
    })?;

    let password = password.trim().to_string();

    // Print newline after password entry (since echo was disabled)
    eprintln!();

    if password.is_empty() {
        return Err(TodError::config("Empty password"));
    }

    Ok(password)
}
