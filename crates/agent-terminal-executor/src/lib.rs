//! Execution backends for agent terminals.
//!
//! - `ProcessExecutor` runs system-terminal commands as local processes
//! - `HttpAgentClient` calls remote agents over HTTP
//! - `DockerRuntime` starts and inspects agent containers

pub mod agent;
pub mod command;
pub mod docker;
pub mod process;
pub mod shell;

pub use agent::HttpAgentClient;
pub use command::{CommandBuildError, CommandLine};
pub use docker::DockerRuntime;
pub use process::ProcessExecutor;
pub use shell::{UnixShell, get_shell_command, resolve_executable_path};
