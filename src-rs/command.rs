//! Subprocess plumbing for the bridge, the window-manager tool and the
//! screenshot tools.

use std::env;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;
use wait_timeout::ChildExt;

use crate::error::{Result, UiTestError};

/// Substring the bridge prints on stderr when the target cannot be reached.
pub const TARGET_UNREACHABLE_MARKER: &str = "Cannot contact Workspace";

const BRIDGE_NAME: &str = "uitest";
const BRIDGE_CANDIDATES: &[&str] = &[
    "/usr/bin/uitest",
    "/usr/local/bin/uitest",
    "Tools/uitest/obj/uitest",
    "./uitest/obj/uitest",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one external program to completion.
///
/// Implementations must not treat a nonzero exit as an error; only a
/// failure to start the program or a timeout is.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandResult>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

/// Extra time granted to collect output when the child exits right at the
/// deadline.
const DRAIN_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

enum Chunk {
    Data(Stream, Vec<u8>),
    Eof,
}

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandResult> {
        debug!(program, ?args, "spawning");
        let deadline = Instant::now() + timeout;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| UiTestError::command_failed(format!("failed to run {program}: {err}")))?;

        // Both pipes are drained while waiting so a large payload cannot
        // stall the child until the timeout.
        let (tx, rx) = mpsc::channel();
        let mut open = 0;
        if let Some(pipe) = child.stdout.take() {
            spawn_reader(pipe, Stream::Stdout, tx.clone());
            open += 1;
        }
        if let Some(pipe) = child.stderr.take() {
            spawn_reader(pipe, Stream::Stderr, tx.clone());
            open += 1;
        }
        drop(tx);

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(UiTestError::command_failed(format!(
                    "{program} timed out after {:.1}s",
                    timeout.as_secs_f64()
                )));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(UiTestError::command_failed(format!(
                    "failed to wait for {program}: {err}"
                )));
            }
        };

        // A background descendant may inherit the pipes and keep them open
        // long after the child exits; stop collecting at the deadline.
        let drain_until = deadline.max(Instant::now() + DRAIN_GRACE);
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        while open > 0 {
            let remaining = drain_until.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(Chunk::Data(Stream::Stdout, bytes)) => stdout.extend_from_slice(&bytes),
                Ok(Chunk::Data(Stream::Stderr, bytes)) => stderr.extend_from_slice(&bytes),
                Ok(Chunk::Eof) => open -= 1,
                Err(_) => {
                    debug!(program, "output pipes still open after exit, keeping partial output");
                    break;
                }
            }
        }

        let result = CommandResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code().unwrap_or(-1),
        };
        debug!(program, exit_code = result.exit_code, "finished");
        Ok(result)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<Chunk>) {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Chunk::Data(stream, buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send(Chunk::Eof);
    });
}

/// Looks `name` up on `PATH`, returning the first executable match.
pub fn which(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

pub fn command_exists(name: &str) -> bool {
    which(name).is_some()
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Resolves the bridge executable: an explicit path wins, then `PATH`,
/// then the usual install and build-tree locations.
pub fn locate_bridge(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(found) = which(BRIDGE_NAME) {
        return Ok(found);
    }
    BRIDGE_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| {
            UiTestError::not_found(
                "uitest executable",
                "make sure it's in PATH or provide an explicit path",
            )
        })
}

/// Command proxy for the bridge tool.
pub struct BridgeProxy {
    runner: Rc<dyn CommandRunner>,
    program: String,
    target: String,
    timeout: Duration,
}

impl BridgeProxy {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        program: &Path,
        target: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            program: program.to_string_lossy().into_owned(),
            target: target.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs `<bridge> <args...>`. A nonzero exit is returned, not raised.
    pub fn run(&self, args: &[&str]) -> Result<CommandResult> {
        self.run_with_timeout(args, self.timeout)
    }

    pub fn run_with_timeout(&self, args: &[&str], timeout: Duration) -> Result<CommandResult> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let result = self.runner.run(&self.program, &args, timeout)?;
        if result.stderr.contains(TARGET_UNREACHABLE_MARKER) {
            return Err(UiTestError::TargetNotRunning {
                target: self.target.clone(),
            });
        }
        Ok(result)
    }

    /// Checks that the bridge starts and answers `help`.
    pub fn verify(&self, timeout: Duration) -> Result<()> {
        let result = self.run_with_timeout(&["help"], timeout)?;
        if !result.success() {
            return Err(UiTestError::command_failed(format!(
                "{} help exited with status {}",
                self.program, result.exit_code
            )));
        }
        Ok(())
    }
}
