//! Process supervision with merged output
//!
//! stdout and stderr are drained by one reader thread each into a shared
//! channel; the calling thread is the only consumer. The stream ends when
//! every reader has hit end-of-file, and only then is the child reaped.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use super::TrainingCommand;
use crate::{Error, Result};

/// How the trainer process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitStatus {
    code: Option<i32>,
    timed_out: bool,
}

impl ExitStatus {
    /// Status of a process that exited with `code`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            timed_out: false,
        }
    }

    /// Status of a process that never produced an exit code (killed by a
    /// signal, or never started).
    #[must_use]
    pub const fn no_code() -> Self {
        Self {
            code: None,
            timed_out: false,
        }
    }

    /// Exit code, if the process exited normally.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// Whether the process was killed for exceeding its timeout.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Exit code 0 within the deadline. A timed-out process never
    /// succeeds, even if it was reaped with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        !self.timed_out && matches!(self.code, Some(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            timed_out: false,
        }
    }
}

/// Options for [`stream_lines`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Kill the process once this much wall time has elapsed
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Options with a timeout.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Run `command` in `working_dir`, calling `on_line` for every line of its
/// merged stdout and stderr, and return how it exited.
///
/// Carriage returns split lines as newlines do, so progress bars that
/// redraw in place still arrive one update at a time. Empty lines are
/// skipped and invalid UTF-8 is replaced.
///
/// # Errors
///
/// Returns [`Error::Io`] if the process cannot be spawned, killed or
/// reaped, and [`Error::QueueClosed`] if a reader thread panicked.
pub fn stream_lines<F>(
    command: &TrainingCommand,
    working_dir: &Path,
    options: &ExecOptions,
    mut on_line: F,
) -> Result<ExitStatus>
where
    F: FnMut(&str),
{
    let mut child = command
        .to_command(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    debug!(pid = child.id(), command = %command.display(), "spawned trainer");

    let (tx, rx) = mpsc::channel();
    let readers = match spawn_readers(&mut child, tx) {
        Ok(readers) => readers,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };

    let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
    let finished = consume(&rx, deadline, &mut on_line);

    if !finished {
        warn!(
            pid = child.id(),
            timeout_secs = options.timeout.map_or(0, |t| t.as_secs()),
            "trainer exceeded its timeout, killing it"
        );
        child.kill()?;
        let status = child.wait()?;
        // Readers exit on their own once the pipes close; a grandchild
        // holding the pipe open must not block us.
        drop(rx);
        debug!(?status, "killed trainer reaped");
        return Ok(ExitStatus {
            code: status.code(),
            timed_out: true,
        });
    }

    let status = child.wait()?;
    for reader in readers {
        match reader.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "error reading trainer output"),
            Err(_) => return Err(Error::QueueClosed),
        }
    }

    Ok(status.into())
}

fn spawn_readers(child: &mut Child, tx: Sender<String>) -> Result<Vec<JoinHandle<io::Result<()>>>> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("trainer stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("trainer stderr was not captured"))?;

    Ok(vec![spawn_reader(stdout, tx.clone()), spawn_reader(stderr, tx)])
}

fn spawn_reader<R>(source: R, tx: Sender<String>) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&buf);
            for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
                if tx.send(line.to_string()).is_err() {
                    return Ok(());
                }
            }
        }
    })
}

/// Feed lines to `on_line` until every sender hangs up (`true`) or the
/// deadline passes (`false`).
fn consume<F>(rx: &Receiver<String>, deadline: Option<Instant>, on_line: &mut F) -> bool
where
    F: FnMut(&str),
{
    loop {
        let line = match deadline {
            None => match rx.recv() {
                Ok(line) => line,
                Err(_) => return true,
            },
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(remaining) {
                    Ok(line) => line,
                    Err(RecvTimeoutError::Disconnected) => return true,
                    Err(RecvTimeoutError::Timeout) => return false,
                }
            }
        };
        on_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_success() {
        assert!(ExitStatus::from_code(0).success());
        assert!(!ExitStatus::from_code(1).success());
        assert!(!ExitStatus::no_code().success());
        assert_eq!(ExitStatus::no_code().code(), None);
        assert!(!ExitStatus::from_code(0).timed_out());
    }

    #[test]
    fn test_timed_out_never_succeeds() {
        let reaped_clean = ExitStatus {
            code: Some(0),
            timed_out: true,
        };
        assert!(!reaped_clean.success());
        assert_eq!(reaped_clean.code(), Some(0));
    }

    #[test]
    fn test_consume_until_disconnect() {
        let (tx, rx) = mpsc::channel();
        tx.send("a".to_string()).unwrap();
        tx.send("b".to_string()).unwrap();
        drop(tx);

        let mut seen = Vec::new();
        assert!(consume(&rx, None, &mut |l: &str| seen.push(l.to_string())));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_consume_deadline() {
        let (tx, rx) = mpsc::channel::<String>();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!consume(&rx, Some(deadline), &mut |_: &str| {}));
        drop(tx);
    }

    #[test]
    fn test_reader_splits_carriage_returns() {
        let (tx, rx) = mpsc::channel();
        let input: &[u8] = b"Iter 1: Train loss 2.0\rIter 2: Train loss 1.9\r\n\nlast without newline";
        spawn_reader(input, tx).join().unwrap().unwrap();

        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(
            lines,
            vec![
                "Iter 1: Train loss 2.0",
                "Iter 2: Train loss 1.9",
                "last without newline"
            ]
        );
    }

    #[test]
    fn test_reader_tolerates_invalid_utf8() {
        let (tx, rx) = mpsc::channel();
        let input: &[u8] = b"Val loss 0.5 \xff\n";
        spawn_reader(input, tx).join().unwrap().unwrap();

        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Val loss 0.5"));
    }

    #[cfg(unix)]
    #[test]
    fn test_merges_stdout_and_stderr() {
        let command = TrainingCommand::new(
            "sh",
            vec!["-c".into(), "echo out; echo err 1>&2; exit 3".into()],
        );
        let mut lines = Vec::new();
        let status = stream_lines(&command, Path::new("."), &ExecOptions::default(), |l| {
            lines.push(l.to_string());
        })
        .unwrap();

        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
        assert_eq!(status.code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        let command = TrainingCommand::new("sh", vec!["-c".into(), "echo start; exec sleep 5".into()]);
        let options = ExecOptions::with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let status = stream_lines(&command, Path::new("."), &options, |_| {}).unwrap();

        assert!(status.timed_out());
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_spawn_failure_is_io_error() {
        let command = TrainingCommand::new("finetrack-no-such-binary", vec![]);
        let err = stream_lines(&command, Path::new("."), &ExecOptions::default(), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
