// Error reporting. All failure paths in the library are explicit returns
// plus a side channel through the installed error hook; no panics cross the
// public surface for recoverable conditions.

use std::cell::Cell;
use std::process;

/// Error severity reported to the hook.
///
/// `Fatal` errors leave the library in an unusable state (allocation failure,
/// broken heap invariants); the default hook terminates the process. `Error`
/// covers recoverable conditions (type mismatches, out-of-range indices), for
/// which operations return their documented sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Fatal,
    Error,
}

/// Signature of error hooks. Receives the level and the formatted message.
pub type ErrorProc = fn(ErrorLevel, &str);

thread_local! {
    static ERROR_PROC: Cell<ErrorProc> = Cell::new(default_error_proc);
}

fn default_error_proc(level: ErrorLevel, msg: &str) {
    match level {
        ErrorLevel::Fatal => {
            eprintln!("nereid: fatal: {}", msg);
            process::abort();
        }
        ErrorLevel::Error => {
            eprintln!("nereid: error: {}", msg);
        }
    }
}

/// Install an error hook for the calling thread, returning the previous one.
pub fn set_error_proc(proc: ErrorProc) -> ErrorProc {
    ERROR_PROC.with(|p| p.replace(proc))
}

/// The currently installed error hook.
pub fn error_proc() -> ErrorProc {
    ERROR_PROC.with(|p| p.get())
}

pub(crate) fn report(level: ErrorLevel, msg: &str) {
    error_proc()(level, msg);
}

macro_rules! col_error {
    ($level:expr, $($arg:tt)*) => {
        crate::error::report($level, &format!($($arg)*))
    };
}
