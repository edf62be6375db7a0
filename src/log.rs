//! File logging for detsched.
//!
//! Log levels:
//! - ERROR: a run or a system construction failed
//! - WARN: a task failed inside the scheduler
//! - INFO: system construction, transforms, run timings
//! - DEBUG: task dispatch and completion
//! - TRACE: every instruction a task evaluates
//!
//! `--debug` or `DETSCHED_DEBUG=1` selects DEBUG, `DETSCHED_DEBUG=trace`
//! selects TRACE. Nothing is written until [`init_with_debug`] runs.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::config::Config;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
// Task threads log concurrently; one writer at a time keeps lines whole.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn current() -> Self {
        match LOG_LEVEL.load(Ordering::Relaxed) {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Level chosen by the `--debug` flag and the `DETSCHED_DEBUG` value.
    fn select(debug: bool, env: Option<&str>) -> Self {
        match env.map(str::to_lowercase).as_deref() {
            Some("trace") => LogLevel::Trace,
            Some("1") | Some("true") | Some("debug") => LogLevel::Debug,
            _ if debug => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

/// Start logging to `~/.detsched/detsched.log`, truncating it.
pub fn init_with_debug(debug: bool) {
    let env = std::env::var("DETSCHED_DEBUG").ok();
    let level = LogLevel::select(debug, env.as_deref());
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);

    let Ok(dir) = Config::app_dir() else {
        return;
    };
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let path = dir.join("detsched.log");
    if std::fs::write(&path, "").is_ok() {
        LOG_PATH.set(path).ok();
    }
}

fn format_line(level: LogLevel, thread: Option<&str>, msg: &str) -> String {
    format!(
        "[{}] [{}] [{}] {}",
        chrono::Local::now().format("%H:%M:%S%.6f"),
        level.label(),
        thread.unwrap_or("-"),
        msg
    )
}

/// Append `msg` to the log file if `level` is enabled.
pub fn log_at(level: LogLevel, msg: &str) {
    if level > LogLevel::current() {
        return;
    }
    let Some(path) = LOG_PATH.get() else {
        return;
    };
    let line = format_line(level, std::thread::current().name(), msg);
    let _guard = WRITE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", line);
    }
}

#[macro_export]
macro_rules! dlog {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_error {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_debug {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Debug, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_trace {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Trace, &format!($($arg)*))
    };
}
