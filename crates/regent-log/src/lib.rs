//! Leveled logging for the `Regent` runtime.
//!
//! Messages carry the module path of the call site and are written to
//! standard error, one line per record. The minimum level is a single atomic
//! shared by every thread, so raising or lowering it is visible immediately
//! everywhere.
//!
//! The level is set programmatically; the runtime reads its configured level
//! from `REGENT_LOG` and applies it with [`set_level`].
//!
//! # Example
//!
//! ```
//! use regent_log::{debug, info, trace, Level};
//!
//! regent_log::set_level(Level::Debug);
//!
//! let footprint = 24;
//! debug!("built descriptor, footprint {footprint} bytes");
//! info!("region released");
//! trace!("not shown at debug level");
//! ```

use std::fmt::{self, Arguments};
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity of a log record.
///
/// Lower numeric values are more severe. A record is emitted when its level
/// is less than or equal to the configured minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Caller contract violations and unrecoverable conditions.
    Error = 0,
    /// Suspicious but tolerated conditions.
    Warn = 1,
    /// Lifecycle milestones.
    Info = 2,
    /// Per-type and per-region diagnostics.
    Debug = 3,
    /// Per-allocation diagnostics.
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case label printed for this level.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a log level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid log level: {}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring ASCII case.
    ///
    /// ```
    /// use regent_log::Level;
    ///
    /// assert_eq!("warn".parse::<Level>(), Ok(Level::Warn));
    /// assert_eq!("TRACE".parse::<Level>(), Ok(Level::Trace));
    /// assert!("verbose".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            _ => Err(ParseLevelError { input: s.to_owned() }),
        }
    }
}

/// Process-wide level filter.
pub struct Logger {
    level: AtomicU8,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
        }
    }

    /// Sets the minimum level that will be emitted.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Returns the current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns `true` if a record at `level` would be emitted.
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: Logger = Logger::new(Level::Info);

/// Returns the global logger.
#[inline]
pub fn get_logger() -> &'static Logger {
    &LOGGER
}

/// Sets the minimum level of the global logger.
pub fn set_level(level: Level) {
    LOGGER.set_level(level);
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments<'_>) {
    const RESET: &str = "\x1b[0m";

    let color = level.color_code();
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = writeln!(out, "{color}[{level}]{RESET} {target}: {args}");
}

/// Logs a record at an explicit level.
///
/// ```
/// use regent_log::{log, Level};
///
/// log!(level: Level::Info, "registered {} descriptors", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__log_with_target(level, module_path!(), format_args!($($arg)*));
        }
    }};
}

/// Logs at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Error, $($arg)*) };
}

/// Logs at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Warn, $($arg)*) };
}

/// Logs at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Info, $($arg)*) };
}

/// Logs at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Debug, $($arg)*) };
}

/// Logs at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Trace, $($arg)*) };
}
