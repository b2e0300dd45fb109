// Rich terminal output for tod

use std::io::IsTerminal;
use std::time::Duration;

use colored::*;

use crate::executor::CommandResult;
use crate::output::errors::TodError;

/// Terminal output manager
pub struct TerminalOutput {
    verbose: bool,
    quiet: bool,
}

impl TerminalOutput {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        // Respect NO_COLOR environment variable (https://no-color.org/)
        // Also disable colors if not a TTY
        if std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal() {
            colored::control::set_override(false);
        }

        TerminalOutput { verbose, quiet }
    }

    /// Output manager that prints nothing, for embedding and tests
    pub fn silent() -> Self {
        TerminalOutput {
            verbose: false,
            quiet: true,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Print a header for a dispatch run
    pub fn print_run_header(&self, hosts_count: usize, commands_count: usize) {
        if self.quiet {
            return;
        }

        println!();
        println!(
            "{} {} commands ({} hosts)",
            "DISPATCH".green().bold(),
            commands_count.to_string().cyan(),
            hosts_count
        );
        println!("{}", "─".repeat(60).dimmed());
    }

    /// Print the captured output of a command that completed on a host
    pub fn print_command_output(&self, host: &str, command: &str, result: &CommandResult) {
        if self.quiet {
            return;
        }

        println!(
            "  {} {} {}",
            "OK".green(),
            "=>".dimmed(),
            host.white().bold()
        );

        if self.verbose {
            println!("      {} {}", "$".dimmed(), command.dimmed());
        }

        for line in result.stdout.lines() {
            println!("      {}", line.magenta());
        }

        if self.verbose {
            for line in result.stderr.lines() {
                println!("      {}", line.red());
            }
        }
    }

    /// Print the failure that took a host out of the run
    pub fn print_host_failed(&self, host: &str, error: &TodError) {
        // Failures are shown even in quiet mode
        println!(
            "  {} {} {}",
            "FAILED".red().bold(),
            "=>".dimmed(),
            host.white().bold()
        );
        println!("      {}", error.reason().red());
    }

    /// Print the run recap summary
    pub fn print_recap(&self, recap: &RunRecap) {
        if self.quiet {
            return;
        }

        println!();
        println!("{}", "DISPATCH RECAP".green().bold());
        println!("{}", "─".repeat(60).dimmed());

        for (host, stats) in &recap.hosts {
            let executed = format!("executed={}", stats.executed).green();
            let assigned = format!("assigned={}", stats.assigned).normal();
            let state = if stats.disconnected {
                "disconnected".red().bold()
            } else {
                "connected".cyan()
            };

            println!(
                "{:<30} : {}    {}    {}",
                host.white().bold(),
                executed,
                assigned,
                state
            );
        }

        println!();
        println!(
            "Completed {}/{} commands in {:.2}s",
            recap.completed,
            recap.target,
            recap.total_duration.as_secs_f64()
        );
    }
}

/// Statistics for a single host
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostStats {
    /// Commands this host executed successfully
    pub executed: usize,
    /// Commands that ended up in this host's queue, reassigned ones included
    pub assigned: usize,
    pub disconnected: bool,
}

/// Summary of a dispatch run, hosts in inventory order
#[derive(Debug, Default, Clone)]
pub struct RunRecap {
    pub hosts: Vec<(String, HostStats)>,
    pub completed: usize,
    pub target: usize,
    pub total_duration: Duration,
}

impl RunRecap {
    pub fn host(&self, name: &str) -> Option<&HostStats> {
        self.hosts
            .iter()
            .find(|(host, _)| host == name)
            .map(|(_, stats)| stats)
    }

    pub fn total_executed(&self) -> usize {
        self.hosts.iter().map(|(_, s)| s.executed).sum()
    }

    pub fn disconnected_hosts(&self) -> usize {
        self.hosts.iter().filter(|(_, s)| s.disconnected).count()
    }
}
