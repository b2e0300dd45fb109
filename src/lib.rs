// tod - dispatch shell commands over SSH to a fleet of hosts
//
// Each host drains its own queue in order while hosts run in parallel.
// When a host drops out, its unfinished commands move to the hosts that
// are still connected.

pub mod config;
pub mod executor;
pub mod inventory;
pub mod output;

pub use config::DispatchConfig;
pub use executor::{run_commands, Command, Runner, SshTransport, Transport};
pub use inventory::{Host, HostDefaults, Inventory};
pub use output::{RunRecap, TerminalOutput, TodError};

/// Version of the tod tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::DispatchConfig;
    pub use crate::executor::{run_commands, Command, Credentials, SshTransport, User};
    pub use crate::inventory::{Host, Inventory};
    pub use crate::output::{RunRecap, TerminalOutput, TodError};
}
