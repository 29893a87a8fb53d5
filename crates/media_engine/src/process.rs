use std::path::{Path, PathBuf};
use std::process::Stdio;

use engine_logging::{engine_debug, engine_warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::TransferError;

/// A child process to run: program, arguments, optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Receives child output as it is produced, one line at a time.
pub trait LineSink: Send + Sync {
    fn line(&self, line: OutputLine);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawn-stream-wait supervision of an external program.
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &ProcessInvocation,
        sink: &dyn LineSink,
    ) -> Result<ProcessExit, TransferError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        invocation: &ProcessInvocation,
        sink: &dyn LineSink,
    ) -> Result<ProcessExit, TransferError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = invocation.working_dir.as_deref() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                TransferError::DownloaderMissing(invocation.program.clone())
            }
            _ => TransferError::Spawn(err.to_string()),
        })?;
        engine_debug!("spawned {} pid={:?}", invocation.program, child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::join!(
            pump(stdout, sink, OutputLine::Stdout),
            pump(stderr, sink, OutputLine::Stderr),
        );

        let status = child.wait().await?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

/// Forward every line of `reader` to `sink`. Bytes that are not UTF-8 are
/// replaced so the pipe is always drained.
async fn pump<R>(reader: Option<R>, sink: &dyn LineSink, wrap: fn(String) -> OutputLine)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                sink.line(wrap(line.trim_end_matches(['\r', '\n']).to_string()));
            }
            Err(err) => {
                engine_warn!("stopped reading child output: {}", err);
                break;
            }
        }
    }
}

/// Resolve the downloader program on `PATH` (or as a path), so a missing
/// binary is reported at startup rather than on the first transfer.
pub fn locate_downloader(program: &str) -> Result<PathBuf, TransferError> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(TransferError::DownloaderMissing(program.to_string()))
        };
    }
    which::which(program).map_err(|_| TransferError::DownloaderMissing(program.to_string()))
}
