// SPDX-License-Identifier: Apache-2.0

use crate::app::App;
use anyhow::{bail, Context, Result};
use std::{
    ffi::OsStr,
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    time::Duration,
};
use tracing::{debug, debug_span, error, info, info_span, warn};

fn exhibit_file(file: &Path, title: &str) -> Result<()> {
    let file = File::open(file)?;
    let lines = BufReader::new(file).lines();
    error!("begin {}", &title);
    for line in lines.flatten() {
        error!("{}", &line);
    }
    error!("end {}", &title);
    Ok(())
}

/// A command whose stdout/stderr are captured into sandbox-relative files
/// unless other destinations are specified. Used both for shelling out to
/// `git` during fetches and for running an action's command locally.
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    description_path: PathBuf,
}

#[derive(Debug)]
pub enum SandboxCommandOutput {
    All,
    Stdout,
    Stderr,
    Ignore,
}

impl SandboxCommand {
    pub fn new(program: impl AsRef<OsStr>, app: Arc<App>) -> Result<(Command, Self)> {
        let mut command = Command::new(program);
        let sandbox_command = Self::with_command(&mut command, app)?;
        Ok((command, sandbox_command))
    }

    pub fn new_with_handles(
        program: impl AsRef<OsStr>,
        stdin: Option<Stdio>,
        stdout: Option<&Path>,
        stderr: Option<&Path>,
        app: Arc<App>,
    ) -> Result<(Command, Self)> {
        let mut command = Command::new(program);
        let sandbox_command =
            Self::with_command_and_handles(&mut command, stdin, stdout, stderr, app)?;
        Ok((command, sandbox_command))
    }

    pub fn with_command(command: &mut Command, app: Arc<App>) -> Result<Self> {
        Self::with_command_and_handles(command, None, None, None, app)
    }

    pub fn with_command_and_handles(
        command: &mut Command,
        stdin: Option<Stdio>,
        stdout: Option<&Path>,
        stderr: Option<&Path>,
        app: Arc<App>,
    ) -> Result<Self> {
        let sandbox = app.sandbox();

        let (description_path, serial) = {
            let (_, description_path, serial) = sandbox
                .create_file(Some("sandboxed_command"), Some("script"), None)
                .context("failed creating description file")?;
            (description_path, serial)
        };

        let output_file = |extension: &str| -> Result<(Stdio, PathBuf)> {
            let (file, path, _) =
                sandbox.create_file(Some("sandboxed_command"), Some(extension), Some(serial))?;
            Ok((Stdio::from(file), path))
        };

        let stdin = stdin.unwrap_or_else(Stdio::null);

        let (stdout, stdout_path) = match stdout {
            Some(path) => (Stdio::from(File::open(path)?), path.to_owned()),
            None => output_file("stdout").context("failed preparing stdout")?,
        };
        let (stderr, stderr_path) = match stderr {
            Some(path) => (Stdio::from(File::open(path)?), path.to_owned()),
            None => output_file("stderr").context("failed preparing stderr")?,
        };

        command.stdin(stdin).stdout(stdout).stderr(stderr);

        Ok(Self {
            stdout_path,
            stderr_path,
            description_path,
        })
    }

    pub fn log(&self, output: SandboxCommandOutput, description: &str) -> Result<()> {
        let title = |o: &str| format!("{o} from {description}");
        let items: Vec<(String, &Path)> = match output {
            SandboxCommandOutput::All => vec![
                (title("stdout"), self.stdout_path.as_path()),
                (title("stderr"), self.stderr_path.as_path()),
            ],
            SandboxCommandOutput::Stdout => vec![(title("stdout"), self.stdout_path.as_path())],
            SandboxCommandOutput::Stderr => vec![(title("stderr"), self.stderr_path.as_path())],
            SandboxCommandOutput::Ignore => vec![],
        };

        for (title, path) in items {
            exhibit_file(path, title.as_str()).with_context(|| format!("exhibiting {}", title))?
        }

        Ok(())
    }

    pub fn read_to_string(
        &self,
        output: SandboxCommandOutput,
        output_string: &mut String,
    ) -> Result<()> {
        let path = match output {
            SandboxCommandOutput::Stdout => &self.stdout_path,
            SandboxCommandOutput::Stderr => &self.stderr_path,
            _ => bail!("cannot read all outputs into one string"),
        };

        let mut reader = BufReader::new(File::open(path)?);
        use std::io::Read;
        reader.read_to_string(output_string)?;
        Ok(())
    }

    /// Run the command to completion, logging captured output if it fails.
    pub fn ensure_success_or_log(
        &self,
        cmd: &mut Command,
        output: SandboxCommandOutput,
    ) -> Result<ExitStatus> {
        let command_description = crate::process::pretty_print_command(cmd);
        let span = debug_span!("running command", description = %command_description);
        let _guard = span.enter();
        let mut file = OpenOptions::new()
            .write(true)
            .append(true)
            .open(&self.description_path)?;
        writeln!(file, "{}", command_description)?;

        let mut launch = cmd
            .spawn()
            .with_context(|| format!("failed to spawn command {}", &command_description))?;

        let tailer =
            Self::tail(&command_description, &self.stderr_path).context("could not create log tailer");

        let status = launch
            .wait()
            .with_context(|| format!("failed to wait for command {}", &command_description))?;
        if let Ok(t) = tailer {
            t.stop();
        }
        debug!(command = %command_description, %status, "command exited");
        if !status.success() {
            self.log(output, &command_description).context("logging output")?;
            bail!("command failed: {}", command_description);
        }

        Ok(status)
    }

    fn tail(description: &str, path: &Path) -> Result<Tailer> {
        Ok(match File::options().read(true).open(path) {
            Ok(f) => Tailer::new(description, f),
            Err(_e) => bail!("could not open {} for tailing", path.display()),
        })
    }
}

struct Tailer {
    cancel_tx: mpsc::Sender<()>,
    stopped: AtomicBool,
}

impl Tailer {
    pub fn new(description: &str, file: File) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let description = description.to_owned();
        let _ = std::thread::spawn(move || Self::work(description, file, cancel_rx));
        Self {
            cancel_tx,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            if let Err(e) = self.cancel_tx.send(()) {
                warn!(?e, "failed to send stop signal to Tailer instance");
            }
        }
    }

    fn work(description: String, file: File, cancel_rx: mpsc::Receiver<()>) {
        let buffered_reader = BufReader::new(file);
        let mut lines = buffered_reader.lines();
        let span = info_span!("output", command = ?description);
        let _guard = span.enter();
        while cancel_rx.try_recv().is_err() {
            while let Some(Ok(line)) = lines.next() {
                info!("{}", line);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandboxed_command_capture_all() -> Result<()> {
        let app = Arc::new(App::new_for_testing()?);
        let (mut cmd, scmd) = SandboxCommand::new("echo", app)?;
        cmd.arg("-n").arg("hey").arg("there").status()?;
        let mut output_string = String::new();
        scmd.read_to_string(SandboxCommandOutput::Stdout, &mut output_string)?;
        assert_eq!(output_string, "hey there");
        Ok(())
    }
}
