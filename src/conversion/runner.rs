//! External process supervision
//!
//! Spawns one encoder process, streams stdout and stderr line by line into a
//! single channel as the lines arrive, and mirrors every line into the job
//! log file. The process can be stopped from another thread while the owner
//! is blocked reading lines.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::TrackCommand;
use crate::error::RunnerError;

/// How often `wait` polls for exit; keeps the child lock free for `stop`
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

type SharedLog = Arc<Mutex<File>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Launch `command` in `dir`, logging to `log_path`
///
/// A timestamped record of the full command line is appended to the log
/// before the process starts. A missing or non-executable program is
/// reported as [`RunnerError::Launch`].
pub fn start(command: &TrackCommand, dir: &Path, log_path: &Path) -> Result<ProcessHandle, RunnerError> {
    let log = open_log(log_path)?;
    {
        let mut file = lock(&log);
        writeln!(
            file,
            "\n[{}] COMMAND: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            command
        )
        .and_then(|_| file.flush())
        .map_err(|source| RunnerError::Log {
            path: log_path.to_path_buf(),
            source,
        })?;
    }

    let mut cmd = Command::new(command.program());
    cmd.args(command.args())
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group, so stop() also reaches anything the program forks
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|source| RunnerError::Launch {
        program: command.program().to_string_lossy().into_owned(),
        source,
    })?;
    let pid = child.id();
    log::debug!("Spawned pid {}: {}", pid, command);

    let (line_tx, line_rx) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, line_tx.clone(), log.clone(), log_path.to_path_buf()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, line_tx, log, log_path.to_path_buf()));
    }

    Ok(ProcessHandle {
        control: Arc::new(ProcessControl {
            child: Mutex::new(child),
            pid,
            stop_requested: AtomicBool::new(false),
        }),
        lines: line_rx,
        readers,
    })
}

fn open_log(path: &Path) -> Result<SharedLog, RunnerError> {
    let err = |source| RunnerError::Log {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(err)?;
    Ok(Arc::new(Mutex::new(file)))
}

/// Forward each line of `pipe` to the channel and the log
fn spawn_reader<R: Read + Send + 'static>(
    pipe: R,
    tx: Sender<String>,
    log: SharedLog,
    log_path: PathBuf,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        let mut log_failed = false;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Output pipe closed with error: {}", e);
                    break;
                }
            }
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            let line = String::from_utf8_lossy(&buf).into_owned();

            if !log_failed {
                let mut file = lock(&log);
                if let Err(e) = writeln!(file, "{}", line) {
                    log::warn!("Failed to write to {:?}: {}", log_path, e);
                    log_failed = true;
                }
            }

            // Receiver gone means nobody is listening; keep draining the pipe
            let _ = tx.send(line);
        }
    })
}

/// Thread-safe stop/wait access to a running process
#[derive(Debug)]
pub struct ProcessControl {
    child: Mutex<Child>,
    pid: u32,
    stop_requested: AtomicBool,
}

impl ProcessControl {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Ask the process to terminate
    ///
    /// No-op once the process has exited. The line stream ends as soon as
    /// the process (group) has closed its pipes.
    pub fn stop(&self) -> Result<(), RunnerError> {
        self.stop_requested.store(true, Ordering::SeqCst);

        // Holding the lock across try_wait and the signal keeps the pid from
        // being reaped (and reused) in between
        let mut child = lock(&self.child);
        if child.try_wait()?.is_some() {
            return Ok(());
        }

        log::info!("Stopping encoder process {}", self.pid);

        #[cfg(unix)]
        {
            // Negative pid: signal the whole process group
            let result = unsafe { libc::kill(-(self.pid as libc::pid_t), libc::SIGTERM) };
            if result == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                log::debug!("Group signal failed ({}), killing pid {}", err, self.pid);
            }
        }

        match child.kill() {
            Ok(()) => Ok(()),
            // Already exited between try_wait and kill
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Block until the process exits
    fn wait(&self) -> Result<ExitStatus, RunnerError> {
        loop {
            if let Some(status) = lock(&self.child).try_wait()? {
                return Ok(status);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

/// A running external process and its merged output stream
pub struct ProcessHandle {
    control: Arc<ProcessControl>,
    lines: Receiver<String>,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.control.pid
    }

    /// Shared control for stopping the process from another thread
    pub fn control(&self) -> Arc<ProcessControl> {
        Arc::clone(&self.control)
    }

    /// Blocking iterator over output lines, in arrival order
    ///
    /// Ends once both stdout and stderr are closed.
    pub fn lines(&self) -> mpsc::Iter<'_, String> {
        self.lines.iter()
    }

    pub fn stop(&self) -> Result<(), RunnerError> {
        self.control.stop()
    }

    /// Wait for exit and return the exit status (0 = success)
    ///
    /// A process ended by a signal reports `128 + signal` on Unix.
    pub fn wait(self) -> Result<i32, RunnerError> {
        let status = self.control.wait()?;
        for reader in self.readers {
            let _ = reader.join();
        }
        Ok(exit_code(status))
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
