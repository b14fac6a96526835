//! In-memory hypervisor and remote shell for tests.

use crate::error::{ProviderError, Result};
use crate::hypervisor::Hypervisor;
use crate::remote::{FileChannel, RemoteConnector, RemoteSession, RemoteTarget};
use fleet_core::CommandOutput;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HypervisorCall {
    Clone { base: PathBuf, dest: PathBuf, name: String },
    Start(PathBuf),
    Stop(PathBuf),
    GuestAddress(PathBuf),
    RunningVms,
}

/// One scripted answer to a guest address query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressResponse {
    Pending,
    Transient,
    /// A failure that is not worth retrying.
    Fatal,
    Address(String),
}

#[derive(Debug, Default)]
struct HypervisorState {
    calls: Vec<HypervisorCall>,
    scripted: HashMap<PathBuf, VecDeque<AddressResponse>>,
    addresses: HashMap<PathBuf, String>,
    running: BTreeSet<PathBuf>,
    failing_clones: HashSet<String>,
    failing_starts: HashSet<PathBuf>,
    failing_stops: HashSet<PathBuf>,
}

/// Records every call. Cloning writes the destination descriptor to disk
/// so path checks behave as with a real clone.
#[derive(Debug, Default)]
pub struct MockHypervisor {
    state: Mutex<HypervisorState>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HypervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address returned once scripted responses for `vm` run out.
    pub fn with_address(self, vm: impl Into<PathBuf>, address: &str) -> Self {
        self.state().addresses.insert(vm.into(), address.to_string());
        self
    }

    /// Responses returned in order before falling back to the fixed address.
    pub fn with_responses(
        self,
        vm: impl Into<PathBuf>,
        responses: impl IntoIterator<Item = AddressResponse>,
    ) -> Self {
        self.state()
            .scripted
            .entry(vm.into())
            .or_default()
            .extend(responses);
        self
    }

    pub fn with_running(self, vm: impl Into<PathBuf>) -> Self {
        self.state().running.insert(vm.into());
        self
    }

    pub fn fail_clone(self, name: &str) -> Self {
        self.state().failing_clones.insert(name.to_string());
        self
    }

    pub fn fail_start(self, vm: impl Into<PathBuf>) -> Self {
        self.state().failing_starts.insert(vm.into());
        self
    }

    pub fn fail_stop(self, vm: impl Into<PathBuf>) -> Self {
        self.state().failing_stops.insert(vm.into());
        self
    }

    pub fn calls(&self) -> Vec<HypervisorCall> {
        self.state().calls.clone()
    }

    pub fn clones(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HypervisorCall::Clone { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HypervisorCall::Start(vm) => Some(vm),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HypervisorCall::Stop(vm) => Some(vm),
                _ => None,
            })
            .collect()
    }

    pub fn address_queries(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, HypervisorCall::GuestAddress(_)))
            .count()
    }
}

impl Hypervisor for MockHypervisor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn clone_vm(&self, base: &Path, dest: &Path, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(HypervisorCall::Clone {
            base: base.to_path_buf(),
            dest: dest.to_path_buf(),
            name: name.to_string(),
        });
        if state.failing_clones.contains(name) {
            return Err(ProviderError::CommandFailed {
                command: format!("clone {name}"),
                detail: "mock clone failure".to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, format!("displayName = \"{name}\"\n"))?;
        Ok(())
    }

    fn start(&self, vm: &Path) -> Result<()> {
        let mut state = self.state();
        state.calls.push(HypervisorCall::Start(vm.to_path_buf()));
        if state.failing_starts.contains(vm) {
            return Err(ProviderError::CommandFailed {
                command: format!("start {}", vm.display()),
                detail: "mock start failure".to_string(),
            });
        }
        state.running.insert(vm.to_path_buf());
        Ok(())
    }

    fn stop(&self, vm: &Path) -> Result<()> {
        let mut state = self.state();
        state.calls.push(HypervisorCall::Stop(vm.to_path_buf()));
        if state.failing_stops.contains(vm) {
            return Err(ProviderError::CommandFailed {
                command: format!("stop {}", vm.display()),
                detail: "mock stop failure".to_string(),
            });
        }
        state.running.remove(vm);
        Ok(())
    }

    fn guest_address(&self, vm: &Path) -> Result<Option<String>> {
        let mut state = self.state();
        state.calls.push(HypervisorCall::GuestAddress(vm.to_path_buf()));

        let scripted = state.scripted.get_mut(vm).and_then(VecDeque::pop_front);
        match scripted {
            Some(AddressResponse::Pending) => Ok(None),
            Some(AddressResponse::Transient) => Err(ProviderError::TransientQuery(
                "Error: The VMware Tools are not running in the virtual machine".to_string(),
            )),
            Some(AddressResponse::Fatal) => Err(ProviderError::CommandFailed {
                command: format!("getGuestIPAddress {}", vm.display()),
                detail: "mock query failure".to_string(),
            }),
            Some(AddressResponse::Address(address)) => Ok(Some(address)),
            None => Ok(state.addresses.get(vm).cloned()),
        }
    }

    fn running_vms(&self) -> Result<Vec<PathBuf>> {
        let mut state = self.state();
        state.calls.push(HypervisorCall::RunningVms);
        Ok(state.running.iter().cloned().collect())
    }
}

/// A file in the mock remote file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub contents: Vec<u8>,
    pub mode: u32,
}

impl RemoteFile {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    connects: Vec<String>,
    commands: Vec<String>,
    files: BTreeMap<String, RemoteFile>,
    dirs: BTreeSet<String>,
    opened: usize,
    closed: usize,
    rules: Vec<(String, CommandOutput)>,
    refuse: Option<ProviderError>,
    fail_close: bool,
}

/// Remote shell that records commands and keeps an in-memory file system.
///
/// Clones share state, so a test keeps one handle and passes another to
/// the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<RemoteState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commands containing `pattern` return `output`. The first matching
    /// rule wins; unmatched commands succeed with no output.
    pub fn respond(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.state().rules.push((pattern.to_string(), output));
        self
    }

    pub fn fail_command(&self, pattern: &str, exit_status: i32, stderr: &str) -> &Self {
        self.respond(pattern, CommandOutput::new("", stderr, exit_status))
    }

    /// Make every connection attempt fail as unreachable.
    pub fn refuse_connections(&self) -> &Self {
        self.state().refuse = Some(ProviderError::Connect {
            host: String::new(),
            detail: "connection refused".to_string(),
        });
        self
    }

    pub fn reject_credentials(&self) -> &Self {
        self.state().refuse = Some(ProviderError::Auth {
            host: String::new(),
            user: String::new(),
            detail: "authentication failed".to_string(),
        });
        self
    }

    /// Make an explicit session close report an error. The session still
    /// counts as closed.
    pub fn fail_close(&self) -> &Self {
        self.state().fail_close = true;
        self
    }

    pub fn put_file(&self, path: &str, contents: &str, mode: u32) {
        self.state().files.insert(
            path.to_string(),
            RemoteFile {
                contents: contents.as_bytes().to_vec(),
                mode,
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<RemoteFile> {
        self.state().files.get(path).cloned()
    }

    pub fn files(&self) -> BTreeMap<String, RemoteFile> {
        self.state().files.clone()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains(path)
    }

    /// Hosts connected to, in order.
    pub fn connects(&self) -> Vec<String> {
        self.state().connects.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state().opened
    }

    pub fn open_sessions(&self) -> usize {
        let state = self.state();
        state.opened - state.closed
    }
}

impl RemoteConnector for MockConnector {
    fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>> {
        let mut state = self.state();
        state.connects.push(target.host.clone());

        match &state.refuse {
            Some(ProviderError::Auth { detail, .. }) => {
                return Err(ProviderError::Auth {
                    host: target.host.clone(),
                    user: target.credentials.username.clone(),
                    detail: detail.clone(),
                })
            }
            Some(refusal) => {
                return Err(ProviderError::Connect {
                    host: target.host.clone(),
                    detail: refusal.to_string(),
                })
            }
            None => {}
        }

        state.opened += 1;
        Ok(Box::new(MockSession {
            host: target.host.clone(),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockSession {
    host: String,
    state: Arc<Mutex<RemoteState>>,
    closed: bool,
}

impl MockSession {
    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteSession for MockSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        let mut state = self.state();
        state.commands.push(command.to_string());
        let output = state
            .rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }

    fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>> {
        Ok(Box::new(MockFileChannel {
            state: Arc::clone(&self.state),
        }))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = self.state();
        state.closed += 1;
        if state.fail_close {
            return Err(ProviderError::Session {
                host: self.host.clone(),
                detail: "disconnect failed".to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct MockFileChannel {
    state: Arc<Mutex<RemoteState>>,
}

impl MockFileChannel {
    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileChannel for MockFileChannel {
    fn create_dir(&mut self, path: &str, _mode: u32) -> Result<()> {
        self.state().dirs.insert(path.to_string());
        Ok(())
    }

    fn read_file(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state().files.get(path).map(|f| f.contents.clone()))
    }

    fn write_file(&mut self, path: &str, contents: &[u8], mode: u32) -> Result<()> {
        self.state().files.insert(
            path.to_string(),
            RemoteFile {
                contents: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }
}
