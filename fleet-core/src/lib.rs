pub mod command_stream;
pub mod error;
pub mod output;
pub mod shell;

pub use command_stream::{capture_command, is_tool_installed, stream_command};
pub use error::{FleetError, Result};
pub use output::CommandOutput;
pub use shell::shell_escape;
