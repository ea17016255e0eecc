//! Running the formatter as a child process.
//!
//! Source text is written to the child's stdin while stdout and stderr are
//! drained on separate tasks, so a formatter that starts answering before it
//! has read everything cannot deadlock against us. Writing and waiting for
//! exit are each bounded by a timeout; a child that misses either is killed.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::command::Invocation;
use crate::error::FormatError;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long writing the whole input to stdin may take
    pub write: Duration,
    /// How long to wait for the child to exit once input is written
    pub exit: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            write: DEFAULT_WRITE_TIMEOUT,
            exit: DEFAULT_EXIT_TIMEOUT,
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome<T = Vec<u8>> {
    pub exit_code: Option<i32>,
    pub stdout: T,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    timeouts: Timeouts,
}

impl ProcessRunner {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Run `invocation` feeding it `input`, returning raw stdout
    pub async fn run(
        &self,
        invocation: &Invocation,
        input: String,
    ) -> Result<ProcessOutcome, FormatError> {
        self.run_with(invocation, input, |bytes| bytes).await
    }

    /// Run `invocation` feeding it `input`, with `decode` applied to stdout
    /// on the reader task as soon as the stream closes
    ///
    /// Failures are reported in this order: launch, write timeout, exit
    /// timeout, non-zero exit (with stderr), write error, read error.
    pub async fn run_with<T, F>(
        &self,
        invocation: &Invocation,
        input: String,
        decode: F,
    ) -> Result<ProcessOutcome<T>, FormatError>
    where
        T: Send + 'static,
        F: FnOnce(Vec<u8>) -> T + Send + 'static,
    {
        let command_line = invocation.command_line();
        log::debug!("running {command_line} ({} bytes of input)", input.len());

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FormatError::Launch {
                program: invocation.program.clone(),
                command: command_line.clone(),
                source,
            })?;

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(FormatError::Interrupted(
                "child process pipes were not captured".to_string(),
            ));
        };

        let mut writer = tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        });
        let reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| decode(buf))
        });
        let errors = tokio::spawn(async move {
            let mut buf = Vec::new();
            // Whatever arrived before a read error is still worth showing
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let write_result = match timeout(self.timeouts.write, &mut writer).await {
            Ok(joined) => joined,
            Err(_) => {
                writer.abort();
                reader.abort();
                errors.abort();
                let _ = child.start_kill();
                log::warn!("timed out writing to {command_line}, killed it");
                return Err(FormatError::WriteTimeout {
                    timeout: self.timeouts.write,
                    command: command_line,
                });
            }
        };

        let status = match timeout(self.timeouts.exit, child.wait()).await {
            Ok(status) => status.map_err(FormatError::Read)?,
            Err(_) => {
                let _ = child.kill().await;
                reader.abort();
                errors.abort();
                log::warn!("{command_line} did not exit in time, killed it");
                return Err(FormatError::ExitTimeout {
                    timeout: self.timeouts.exit,
                    command: command_line,
                });
            }
        };

        // Bounded: a grandchild may still hold the pipe open
        let stderr = match timeout(self.timeouts.exit, errors).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        };

        if !status.success() {
            reader.abort();
            return Err(FormatError::NonzeroExit {
                code: status.code(),
                stderr: stderr.trim_end().to_string(),
                command: command_line,
            });
        }

        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(FormatError::Write(e)),
            Err(e) => return Err(FormatError::Interrupted(e.to_string())),
        }

        let stdout = match timeout(self.timeouts.exit, reader).await {
            Ok(Ok(Ok(decoded))) => decoded,
            Ok(Ok(Err(e))) => return Err(FormatError::Read(e)),
            Ok(Err(e)) => return Err(FormatError::Interrupted(e.to_string())),
            Err(_) => {
                return Err(FormatError::Interrupted(format!(
                    "output of {command_line} did not close after exit"
                )));
            }
        };

        if !stderr.is_empty() {
            log::debug!("{command_line} stderr: {}", stderr.trim_end());
        }

        Ok(ProcessOutcome {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}
