//! Logging infrastructure for toolbus
//!
//! Logs to ~/.toolbus/logs/ with one dated file per day.
//!
//! Supports task-local context so concurrent calls multiplexed on one
//! runtime tag their lines with endpoint, session, and call id.

use chrono::Local;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use crate::config::toolbus_dir;
use crate::protocol::CallId;

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);
static TASK_CONTEXTS: OnceLock<Mutex<HashMap<String, LogContext>>> = OnceLock::new();

/// Context attached to log lines from the current task (or thread, outside
/// the runtime).
#[derive(Default, Clone)]
pub struct LogContext {
    /// "client" or "server".
    pub endpoint: Option<String>,
    /// Session identifier from `id::new_id`.
    pub session: Option<String>,
    /// The call currently being processed, if any.
    pub call: Option<CallId>,
}

thread_local! {
    static THREAD_CONTEXT: RefCell<LogContext> = RefCell::new(LogContext::default());
}

/// Set the full logging context for the current task.
pub fn set_context(ctx: LogContext) {
    if set_task_context(|stored| *stored = ctx.clone()) {
        return;
    }
    THREAD_CONTEXT.with(|c| *c.borrow_mut() = ctx);
}

/// Update just the call id in the current context.
pub fn set_call(call: Option<CallId>) {
    if set_task_context(|ctx| ctx.call = call) {
        return;
    }
    THREAD_CONTEXT.with(|c| c.borrow_mut().call = call);
}

/// Clear the logging context for the current task.
pub fn clear_context() {
    if let Some(task_id) = current_task_id() {
        if let Some(store) = TASK_CONTEXTS.get() {
            if let Ok(mut contexts) = store.lock() {
                contexts.remove(&task_id);
            }
        }
    }
    THREAD_CONTEXT.with(|c| *c.borrow_mut() = LogContext::default());
}

fn current_task_id() -> Option<String> {
    tokio::task::try_id().map(|id| id.to_string())
}

fn set_task_context(update: impl FnOnce(&mut LogContext)) -> bool {
    let Some(task_id) = current_task_id() else {
        return false;
    };
    let store = TASK_CONTEXTS.get_or_init(|| Mutex::new(HashMap::new()));
    if let Ok(mut contexts) = store.lock() {
        update(contexts.entry(task_id).or_default());
        true
    } else {
        false
    }
}

fn context_prefix() -> String {
    let task_ctx = current_task_id()
        .and_then(|id| TASK_CONTEXTS.get()?.lock().ok()?.get(&id).cloned());
    match task_ctx {
        Some(ctx) => prefix_for(&ctx),
        None => THREAD_CONTEXT.with(|c| prefix_for(&c.borrow())),
    }
}

fn prefix_for(ctx: &LogContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref endpoint) = ctx.endpoint {
        parts.push(endpoint.clone());
    }
    if let Some(ref session) = ctx.session {
        parts.push(format!("ses:{}", crate::id::short_id(session)));
    }
    if let Some(call) = ctx.call {
        parts.push(format!("call:{}", call));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("[{}] ", parts.join("|"))
    }
}

struct Logger {
    file: File,
}

impl Logger {
    fn new() -> Option<Self> {
        let log_dir = toolbus_dir().join("logs");
        fs::create_dir_all(&log_dir).ok()?;

        let date = Local::now().format("%Y-%m-%d");
        let path = log_dir.join(format!("toolbus-{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;

        Some(Self { file })
    }

    fn write(&mut self, level: &str, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] [{}] {}{}\n", timestamp, level, context_prefix(), message);
        let _ = self.file.write_all(line.as_bytes());
        let _ = self.file.flush();
    }
}

/// Initialize the logger (call once at startup). Without this, log calls are
/// no-ops, which keeps library embedders quiet by default.
pub fn init() {
    let mut guard = match LOGGER.lock() {
        Ok(g) => g,
        Err(_) => return,
    };
    if guard.is_none() {
        *guard = Logger::new();
    }
}

fn write(level: &str, message: &str) {
    if let Ok(mut guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_mut() {
            logger.write(level, message);
        }
    }
}

/// Log an info message.
pub fn info(message: &str) {
    write("INFO", message);
}

/// Log a warning message.
pub fn warn(message: &str) {
    write("WARN", message);
}

/// Log an error message.
pub fn error(message: &str) {
    write("ERROR", message);
}

/// Log a debug message (only if TOOLBUS_TRACE is set).
pub fn debug(message: &str) {
    if std::env::var("TOOLBUS_TRACE").is_ok() {
        write("DEBUG", message);
    }
}

/// Path to today's log file.
pub fn log_path() -> PathBuf {
    let date = Local::now().format("%Y-%m-%d");
    toolbus_dir().join("logs").join(format!("toolbus-{}.log", date))
}

/// Clean up old logs (keep last 7 days).
pub fn cleanup_old_logs() {
    let log_dir = toolbus_dir().join("logs");
    let Ok(entries) = fs::read_dir(&log_dir) else {
        return;
    };
    let cutoff = Local::now() - chrono::Duration::days(7);
    for entry in entries.flatten() {
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified: chrono::DateTime<Local> = modified.into();
                if modified < cutoff {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
    }
}
