use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Instant;

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::log_sanitize::sanitize_log_line;
use crate::ui::{self, Spinner, Tone};

#[derive(Debug, Clone)]
pub enum ExecEvent {
    StepStarted {
        label: String,
    },
    StepFinished {
        label: String,
        ok: bool,
        code: Option<i32>,
        elapsed_ms: u128,
    },
    Note {
        tone: Tone,
        msg: String,
    },
}

pub trait ExecSink: Send + Sync {
    fn emit(&self, ev: ExecEvent);
}

/// Console sink: one spinner per running step, one status line per result.
#[derive(Default)]
pub struct StdoutSink {
    spinner: Mutex<Option<Spinner>>,
}

impl ExecSink for StdoutSink {
    fn emit(&self, ev: ExecEvent) {
        match ev {
            ExecEvent::StepStarted { label } => {
                if let Ok(mut g) = self.spinner.lock() {
                    if let Some(prev) = g.take() {
                        prev.stop();
                    }
                    *g = Some(Spinner::start(&label));
                }
            }
            ExecEvent::StepFinished {
                label,
                ok,
                code,
                elapsed_ms,
            } => {
                if let Ok(mut g) = self.spinner.lock()
                    && let Some(sp) = g.take()
                {
                    sp.stop();
                }
                if ok {
                    ui::status_line(Tone::Ok, &format!("{label}: done ({elapsed_ms}ms)"));
                } else {
                    let code = code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".into());
                    ui::status_line(Tone::Fail, &format!("{label}: error (code {code})"));
                }
            }
            ExecEvent::Note { tone, msg } => ui::status_line(tone, &msg),
        }
    }
}

#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ExecEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ExecEvent>) -> Self {
        Self { tx }
    }
}

impl ExecSink for ChannelSink {
    fn emit(&self, ev: ExecEvent) {
        let _ = self.tx.send(ev);
    }
}

/// Output of one finished command.
#[derive(Debug, Default)]
pub struct CmdOutput {
    pub code: Option<i32>,
    pub stdout: Vec<String>,
}

#[derive(Clone)]
pub struct ExecCtx {
    pub sink: Arc<dyn ExecSink>,
    log_path: Option<PathBuf>,
}

impl ExecCtx {
    pub fn new(sink: Arc<dyn ExecSink>) -> Self {
        Self {
            sink,
            log_path: None,
        }
    }

    /// Same sink, but command output is appended to `path`.
    pub fn with_log(&self, path: PathBuf) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            log_path: Some(path),
        }
    }

    pub fn note(&self, tone: Tone, msg: impl Into<String>) {
        self.sink.emit(ExecEvent::Note {
            tone,
            msg: msg.into(),
        });
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.note(Tone::Info, msg);
    }

    pub fn ok(&self, msg: impl Into<String>) {
        self.note(Tone::Ok, msg);
    }

    pub fn warn(&self, msg: impl Into<String>) {
        self.note(Tone::Warn, msg);
    }

    /// Appends a free-form line to the log, if one is attached.
    pub fn log_line(&self, line: &str) -> Result<()> {
        let Some(mut log) = self.open_log()? else {
            return Ok(());
        };
        writeln!(log, "{}", sanitize_log_line(line))
            .map_err(|e| Error::msg(format!("failed to write log: {e}")))
    }

    /// Runs `cmd` to completion. Combined output goes to the log; a non-zero exit is an error.
    pub fn run_cmd(&self, label: &str, cmd: Command) -> Result<()> {
        let out = self.exec(label, cmd, true)?;
        check_status(label, &out)
    }

    /// Like `run_cmd`, but also hands back stdout lines.
    pub fn capture_cmd(&self, label: &str, cmd: Command) -> Result<Vec<String>> {
        let out = self.exec(label, cmd, true)?;
        check_status(label, &out)?;
        Ok(out.stdout)
    }

    /// `run_cmd` without console events, for commands issued inside a larger `step`.
    pub fn run_quiet(&self, label: &str, cmd: Command) -> Result<()> {
        let out = self.exec(label, cmd, false)?;
        check_status(label, &out)
    }

    /// Runs `cmd` quietly and reports its status without turning a non-zero exit into an error.
    pub fn probe_cmd(&self, label: &str, cmd: Command) -> Result<CmdOutput> {
        self.exec(label, cmd, false)
    }

    /// Wraps in-process work in the same started/finished events a command gets.
    pub fn step<T>(&self, label: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.sink.emit(ExecEvent::StepStarted {
            label: label.to_string(),
        });
        let mut guard = StepGuard {
            sink: Some(self.sink.as_ref()),
            label,
            start: Instant::now(),
            done: false,
        };
        let res = f();
        guard.finish(res.is_ok(), None);
        res
    }

    fn open_log(&self) -> Result<Option<File>> {
        let Some(path) = self.log_path.as_ref() else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::msg(format!("failed to create {}: {e}", parent.display())))?;
        }
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::msg(format!("failed to open log {}: {e}", path.display())))?;
        Ok(Some(f))
    }

    fn exec(&self, label: &str, mut cmd: Command, announce: bool) -> Result<CmdOutput> {
        let mut log = self.open_log()?;
        if let Some(log) = log.as_mut() {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(log, "==> [{stamp}] {label}: {:?}", cmd);
        }
        debug!(step = label, command = ?cmd, "spawning");

        if announce {
            self.sink.emit(ExecEvent::StepStarted {
                label: label.to_string(),
            });
        }
        let mut step = StepGuard {
            sink: announce.then_some(self.sink.as_ref()),
            label,
            start: Instant::now(),
            done: false,
        };

        let program = cmd.get_program().to_os_string();
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::new(
                    ErrorKind::CommandFailed,
                    format!("{label}: failed to spawn {}: {e}", program.to_string_lossy()),
                )
            })?;

        let (tx, rx) = mpsc::channel::<(Stream, String)>();
        if let Some(out) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(out, Stream::Stdout, tx));
        }
        if let Some(err) = child.stderr.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(err, Stream::Stderr, tx));
        }
        drop(tx);

        let mut stdout = Vec::new();
        for (stream, line) in rx {
            if let Some(log) = log.as_mut() {
                let _ = writeln!(log, "{}", sanitize_log_line(&line));
            }
            if stream == Stream::Stdout {
                stdout.push(line);
            }
        }

        let status = child
            .wait()
            .map_err(|e| Error::new(ErrorKind::CommandFailed, format!("{label}: wait failed: {e}")))?;
        let code = status.code();
        if let Some(log) = log.as_mut() {
            let _ = writeln!(log, "<== {label}: {status}");
        }
        debug!(step = label, ?code, "finished");
        step.finish(status.success(), code);

        Ok(CmdOutput { code, stdout })
    }
}

fn check_status(label: &str, out: &CmdOutput) -> Result<()> {
    if out.code == Some(0) {
        return Ok(());
    }
    let code = out
        .code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "killed by signal".into());
    Err(Error::new(
        ErrorKind::CommandFailed,
        format!("{label} failed (exit code {code})"),
    ))
}

// Emits StepFinished exactly once, even when spawning or waiting bails out early.
struct StepGuard<'a> {
    sink: Option<&'a dyn ExecSink>,
    label: &'a str,
    start: Instant,
    done: bool,
}

impl StepGuard<'_> {
    fn finish(&mut self, ok: bool, code: Option<i32>) {
        if self.done {
            return;
        }
        self.done = true;
        let Some(sink) = self.sink else {
            return;
        };
        sink.emit(ExecEvent::StepFinished {
            label: self.label.to_string(),
            ok,
            code,
            elapsed_ms: self.start.elapsed().as_millis(),
        });
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        self.finish(false, None);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn read_output_stream<R: Read>(reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>) {
    const MAX_PENDING_BYTES: usize = 16 * 1024;
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 8192];
    let mut pending = Vec::with_capacity(1024);

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        for b in &buf[..n] {
            if *b == b'\n' || *b == b'\r' {
                if pending.is_empty() {
                    continue;
                }
                let line = String::from_utf8_lossy(&pending).into_owned();
                pending.clear();
                let _ = tx.send((stream, line));
            } else {
                pending.push(*b);
                if pending.len() >= MAX_PENDING_BYTES {
                    let line = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();
                    let _ = tx.send((stream, line));
                }
            }
        }
    }

    if !pending.is_empty() {
        let line = String::from_utf8_lossy(&pending).into_owned();
        let _ = tx.send((stream, line));
    }
}
