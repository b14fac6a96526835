//! Remote shell boundary: sessions on a fleet member and file transfer
//! over them.

use crate::error::Result;
use fleet_config::Credentials;
use fleet_core::CommandOutput;

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }
}

pub trait RemoteConnector {
    /// Open an authenticated session. Fails with `Connect` when the host
    /// cannot be reached and `Auth` when the credential is rejected.
    fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>>;
}

/// An open shell session. Implementations release the connection when
/// dropped, so a session is never leaked on an error path.
pub trait RemoteSession {
    fn host(&self) -> &str;

    /// Run one command to completion. A non-zero exit status is returned,
    /// not raised; only transport failures are errors.
    fn exec(&mut self, command: &str) -> Result<CommandOutput>;

    fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>>;

    /// Close the session explicitly.
    fn close(&mut self) -> Result<()>;
}

/// File transfer over an open session. Paths are remote POSIX paths.
pub trait FileChannel {
    /// Create a directory. An existing directory is not an error.
    fn create_dir(&mut self, path: &str, mode: u32) -> Result<()>;

    /// Read a whole file, `None` if it does not exist.
    fn read_file(&mut self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Create or truncate `path`, write `contents`, then set `mode`.
    fn write_file(&mut self, path: &str, contents: &[u8], mode: u32) -> Result<()>;
}
