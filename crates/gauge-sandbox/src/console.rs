//! Console capture for sandboxed snippets
//!
//! A snippet never writes to the host console while it runs. Each console call
//! lands in a per-severity buffer; the host flushes the buffers after the call
//! returns, or drops them.

use serde::{Deserialize, Serialize};
use std::io::Write;

/// Severity of a captured console line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Error,
    Warn,
}

impl LogLevel {
    /// Flush order
    pub const ALL: [LogLevel; 4] = [LogLevel::Log, LogLevel::Info, LogLevel::Error, LogLevel::Warn];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
        }
    }
}

/// Lines captured during one evaluation, one buffer per severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleCapture {
    #[serde(default)]
    log: Vec<String>,
    #[serde(default)]
    info: Vec<String>,
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    warn: Vec<String>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, line: impl Into<String>) {
        self.buffer_mut(level).push(line.into());
    }

    pub fn lines(&self, level: LogLevel) -> &[String] {
        match level {
            LogLevel::Log => &self.log,
            LogLevel::Info => &self.info,
            LogLevel::Error => &self.error,
            LogLevel::Warn => &self.warn,
        }
    }

    /// Total number of captured lines across all severities
    pub fn len(&self) -> usize {
        LogLevel::ALL.iter().map(|l| self.lines(*l).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every captured line to `sink`: all `log` lines, then `info`,
    /// then `error`, then `warn`.
    pub fn flush_to(&self, sink: &dyn ConsoleSink) {
        for level in LogLevel::ALL {
            for line in self.lines(level) {
                sink.write(level, line);
            }
        }
    }

    fn buffer_mut(&mut self, level: LogLevel) -> &mut Vec<String> {
        match level {
            LogLevel::Log => &mut self.log,
            LogLevel::Info => &mut self.info,
            LogLevel::Error => &mut self.error,
            LogLevel::Warn => &mut self.warn,
        }
    }
}

/// Host-side destination for flushed snippet output
pub trait ConsoleSink: Send + Sync {
    fn write(&self, level: LogLevel, line: &str);
}

/// The process console: `log`/`info` to stdout, `error`/`warn` to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl ConsoleSink for StdConsole {
    fn write(&self, level: LogLevel, line: &str) {
        // A closed pipe must not take the collector down with it.
        let _ = match level {
            LogLevel::Log | LogLevel::Info => writeln!(std::io::stdout().lock(), "{}", line),
            LogLevel::Error | LogLevel::Warn => writeln!(std::io::stderr().lock(), "{}", line),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(LogLevel, String)>>);

    impl ConsoleSink for Recorder {
        fn write(&self, level: LogLevel, line: &str) {
            self.0.lock().unwrap().push((level, line.to_string()));
        }
    }

    #[test]
    fn test_flush_order_is_by_severity() {
        let mut capture = ConsoleCapture::new();
        capture.push(LogLevel::Warn, "4");
        capture.push(LogLevel::Log, "1");
        capture.push(LogLevel::Error, "3");
        capture.push(LogLevel::Info, "2");
        capture.push(LogLevel::Log, "1b");

        let sink = Recorder::default();
        capture.flush_to(&sink);

        let written = sink.0.into_inner().unwrap();
        let levels: Vec<_> = written.iter().map(|(l, _)| *l).collect();
        assert_eq!(
            levels,
            vec![LogLevel::Log, LogLevel::Log, LogLevel::Info, LogLevel::Error, LogLevel::Warn]
        );
        assert_eq!(written[1].1, "1b");
    }

    #[test]
    fn test_empty_capture_writes_nothing() {
        let capture = ConsoleCapture::new();
        assert!(capture.is_empty());
        let sink = Recorder::default();
        capture.flush_to(&sink);
        assert!(sink.0.into_inner().unwrap().is_empty());
    }

    #[test]
    fn test_deserialize_partial_buffers() {
        let capture: ConsoleCapture = serde_json::from_str(r#"{"log":["a"],"warn":["b","c"]}"#).unwrap();
        assert_eq!(capture.lines(LogLevel::Log), &["a".to_string()]);
        assert_eq!(capture.lines(LogLevel::Warn).len(), 2);
        assert!(capture.lines(LogLevel::Info).is_empty());
        assert_eq!(capture.len(), 3);
    }
}
