//! ssh2-backed remote sessions with password authentication.

use crate::error::{ProviderError, Result};
use crate::remote::{FileChannel, RemoteConnector, RemoteSession, RemoteTarget};
use fleet_core::CommandOutput;
use ssh2::{ErrorCode, FileStat, OpenFlags, OpenType, Session, Sftp};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// libssh2's `LIBSSH2_FX_NO_SUCH_FILE`.
const SFTP_NO_SUCH_FILE: i32 = 2;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl RemoteConnector for SshConnector {
    fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>> {
        let host = target.host.clone();
        let connect_error = |detail: String| ProviderError::Connect {
            host: host.clone(),
            detail,
        };

        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| connect_error(e.to_string()))?
            .next()
            .ok_or_else(|| connect_error("host did not resolve to an address".to_string()))?;

        debug!("Connecting to {}:{}", target.host, target.port);
        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| connect_error(e.to_string()))?;

        let mut session = Session::new().map_err(|e| connect_error(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| connect_error(format!("SSH handshake failed: {e}")))?;

        let username = &target.credentials.username;
        session
            .userauth_password(username, &target.credentials.password)
            .map_err(|e| ProviderError::Auth {
                host: target.host.clone(),
                user: username.clone(),
                detail: e.to_string(),
            })?;
        if !session.authenticated() {
            return Err(ProviderError::Auth {
                host: target.host.clone(),
                user: username.clone(),
                detail: "server did not accept the credential".to_string(),
            });
        }

        Ok(Box::new(SshSession {
            host: target.host.clone(),
            session,
            closed: false,
        }))
    }
}

pub struct SshSession {
    host: String,
    session: Session,
    closed: bool,
}

impl SshSession {
    fn session_error(&self, e: impl std::fmt::Display) -> ProviderError {
        ProviderError::Session {
            host: self.host.clone(),
            detail: e.to_string(),
        }
    }
}

impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| self.session_error(e))?;
        channel.exec(command).map_err(|e| self.session_error(e))?;

        // Both streams share one channel window, so they are drained together.
        let mut out = channel.stream(0);
        let mut err = channel.stderr();
        self.session.set_blocking(false);
        let drained = drain_streams(&mut out, &mut err);
        self.session.set_blocking(true);
        let (stdout, stderr) = drained.map_err(|e| self.session_error(e))?;

        channel.wait_close().map_err(|e| self.session_error(e))?;
        let exit_status = channel.exit_status().map_err(|e| self.session_error(e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>> {
        let sftp = self.session.sftp().map_err(|e| self.session_error(e))?;
        Ok(Box::new(SftpChannel { sftp }))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session
            .disconnect(None, "fleet provisioner done", None)
            .map_err(|e| self.session_error(e))
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close SSH session to {}: {}", self.host, e);
        }
    }
}

/// Read two non-blocking streams until both reach EOF.
fn drain_streams<O: Read, E: Read>(out: &mut O, err: &mut E) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut buf = [0u8; 8192];

    while stdout_open || stderr_open {
        let mut progressed = false;

        if stdout_open {
            match out.read(&mut buf) {
                Ok(0) => stdout_open = false,
                Ok(n) => {
                    stdout.extend_from_slice(&buf[..n]);
                    progressed = true;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }

        if stderr_open {
            match err.read(&mut buf) {
                Ok(0) => stderr_open = false,
                Ok(n) => {
                    stderr.extend_from_slice(&buf[..n]);
                    progressed = true;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }

        if !progressed && (stdout_open || stderr_open) {
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
    }

    Ok((stdout, stderr))
}

pub struct SftpChannel {
    sftp: Sftp,
}

fn transfer_error(path: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::FileTransfer {
        path: path.to_string(),
        detail: e.to_string(),
    }
}

impl FileChannel for SftpChannel {
    fn create_dir(&mut self, path: &str, mode: u32) -> Result<()> {
        match self.sftp.mkdir(Path::new(path), mode as i32) {
            Ok(()) => Ok(()),
            Err(mkdir_err) => match self.sftp.stat(Path::new(path)) {
                Ok(stat) if stat.is_dir() => Ok(()),
                _ => Err(transfer_error(path, mkdir_err)),
            },
        }
    }

    fn read_file(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut file = match self.sftp.open(Path::new(path)) {
            Ok(file) => file,
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) => return Ok(None),
            Err(e) => return Err(transfer_error(path, e)),
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| transfer_error(path, e))?;
        Ok(Some(contents))
    }

    fn write_file(&mut self, path: &str, contents: &[u8], mode: u32) -> Result<()> {
        let remote_path = Path::new(path);
        let mut file = self
            .sftp
            .open_mode(
                remote_path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                mode as i32,
                OpenType::File,
            )
            .map_err(|e| transfer_error(path, e))?;
        file.write_all(contents)
            .map_err(|e| transfer_error(path, e))?;
        drop(file);

        // The server applies its umask on create; set the mode explicitly.
        self.sftp
            .setstat(
                remote_path,
                FileStat {
                    size: None,
                    uid: None,
                    gid: None,
                    perm: Some(mode),
                    atime: None,
                    mtime: None,
                },
            )
            .map_err(|e| transfer_error(path, e))
    }
}
