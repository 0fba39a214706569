//! Console presentation: tagged status lines and the progress spinner.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::style::Stylize;
use crossterm::tty::IsTty;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Ok,
    Warn,
    Fail,
}

impl Tone {
    fn tag(self) -> &'static str {
        match self {
            Tone::Info => "[INFO]",
            Tone::Ok => "[ OK ]",
            Tone::Warn => "[WARN]",
            Tone::Fail => "[FAIL]",
        }
    }
}

pub fn stdout_is_tty() -> bool {
    io::stdout().is_tty()
}

pub fn status_line(tone: Tone, msg: &str) {
    let tag = tone.tag();
    if !stdout_is_tty() {
        println!("{tag} {msg}");
        return;
    }
    let tag = match tone {
        Tone::Info => tag.blue(),
        Tone::Ok => tag.green(),
        Tone::Warn => tag.yellow(),
        Tone::Fail => tag.red(),
    };
    println!("{tag} {msg}");
}

pub fn heading(text: &str) -> String {
    if stdout_is_tty() {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Animated progress indicator for one blocking operation.
///
/// The animation thread only exists on a TTY. Stopping (explicitly or on drop)
/// always joins it, so no frame is drawn after the operation's result line.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start(text: &str) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        if !stdout_is_tty() {
            return Self {
                running,
                handle: None,
            };
        }

        let flag = Arc::clone(&running);
        let text = text.to_string();
        let handle = std::thread::spawn(move || {
            let mut out = io::stdout();
            let mut i = 0usize;
            while flag.load(Ordering::Relaxed) {
                let frame = format!("[{}] {}", FRAMES[i % FRAMES.len()], text);
                let _ = write!(out, "\r{}", frame.cyan());
                let _ = out.flush();
                std::thread::sleep(FRAME_INTERVAL);
                i = i.wrapping_add(1);
            }
            let blank = " ".repeat(text.chars().count() + 6);
            let _ = write!(out, "\r{blank}\r");
            let _ = out.flush();
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}
