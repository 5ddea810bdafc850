//! Logging
//!
//! Structured logging for token operations.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Token operation log context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenLogContext {
    /// Node the operation runs for.
    pub node_id: Option<String>,
    /// Operation name.
    pub operation: Option<String>,
    /// Grant type of the exchange.
    pub grant_type: Option<String>,
    /// Additional context.
    pub extra: BTreeMap<String, String>,
}

impl TokenLogContext {
    /// Create new log context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set node id.
    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Set operation.
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set grant type.
    pub fn grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = Some(grant_type.into());
        self
    }

    /// Add extra context.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn extras(&self) -> String {
        self.extra
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Logger interface.
pub trait Logger: Send + Sync {
    fn trace(&self, message: &str, context: &TokenLogContext);

    fn debug(&self, message: &str, context: &TokenLogContext);

    fn info(&self, message: &str, context: &TokenLogContext);

    fn warn(&self, message: &str, context: &TokenLogContext);

    fn error(&self, message: &str, context: &TokenLogContext);

    /// Check if a log level is enabled.
    fn is_enabled(&self, level: LogLevel) -> bool;
}

/// No-op logger implementation.
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn trace(&self, _message: &str, _context: &TokenLogContext) {}
    fn debug(&self, _message: &str, _context: &TokenLogContext) {}
    fn info(&self, _message: &str, _context: &TokenLogContext) {}
    fn warn(&self, _message: &str, _context: &TokenLogContext) {}
    fn error(&self, _message: &str, _context: &TokenLogContext) {}
    fn is_enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

/// No-op logger singleton.
pub fn no_op_logger() -> NoOpLogger {
    NoOpLogger
}

/// Logger forwarding to `tracing` events.
///
/// Context fields become structured event fields, so any subscriber the host
/// installs can filter on `node_id` or `grant_type`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

macro_rules! forward {
    ($level:ident, $message:expr, $ctx:expr) => {{
        let ctx: &TokenLogContext = $ctx;
        let extra = ctx.extras();
        tracing::$level!(
            node_id = ctx.node_id.as_deref().unwrap_or(""),
            operation = ctx.operation.as_deref().unwrap_or(""),
            grant_type = ctx.grant_type.as_deref().unwrap_or(""),
            extra = %extra,
            "{}",
            $message
        )
    }};
}

impl Logger for TracingLogger {
    fn trace(&self, message: &str, context: &TokenLogContext) {
        forward!(trace, message, context);
    }

    fn debug(&self, message: &str, context: &TokenLogContext) {
        forward!(debug, message, context);
    }

    fn info(&self, message: &str, context: &TokenLogContext) {
        forward!(info, message, context);
    }

    fn warn(&self, message: &str, context: &TokenLogContext) {
        forward!(warn, message, context);
    }

    fn error(&self, message: &str, context: &TokenLogContext) {
        forward!(error, message, context);
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Trace => tracing::enabled!(tracing::Level::TRACE),
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Warn => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
        }
    }
}

/// Create the default logger.
pub fn create_tracing_logger() -> TracingLogger {
    TracingLogger
}

/// Log entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: TokenLogContext,
    pub timestamp: u64,
}

/// In-memory logger for testing.
pub struct InMemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
    min_level: LogLevel,
}

impl InMemoryLogger {
    /// Create new in-memory logger.
    pub fn new() -> Self {
        Self::with_level(LogLevel::Trace)
    }

    /// Create in-memory logger with minimum level.
    pub fn with_level(min_level: LogLevel) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            min_level,
        }
    }

    /// Get all log entries.
    pub fn get_entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Get entries by level.
    pub fn get_entries_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Check whether any entry at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log(&self, level: LogLevel, message: &str, context: &TokenLogContext) {
        if level >= self.min_level {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;

            self.lock().push(LogEntry {
                level,
                message: message.to_string(),
                context: context.clone(),
                timestamp: now,
            });
        }
    }
}

impl Default for InMemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for InMemoryLogger {
    fn trace(&self, message: &str, context: &TokenLogContext) {
        self.log(LogLevel::Trace, message, context);
    }

    fn debug(&self, message: &str, context: &TokenLogContext) {
        self.log(LogLevel::Debug, message, context);
    }

    fn info(&self, message: &str, context: &TokenLogContext) {
        self.log(LogLevel::Info, message, context);
    }

    fn warn(&self, message: &str, context: &TokenLogContext) {
        self.log(LogLevel::Warn, message, context);
    }

    fn error(&self, message: &str, context: &TokenLogContext) {
        self.log(LogLevel::Error, message, context);
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

/// Create in-memory logger for testing.
pub fn create_in_memory_logger() -> InMemoryLogger {
    InMemoryLogger::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Warn > LogLevel::Info);
        assert!(LogLevel::Debug > LogLevel::Trace);
    }

    #[test]
    fn test_in_memory_logger() {
        let logger = InMemoryLogger::new();
        let context = TokenLogContext::new()
            .node_id("n1")
            .operation("token_request");

        logger.info("Token request started", &context);
        logger.debug("Debug info", &context);
        logger.error("Token request failed", &context);

        assert_eq!(logger.get_entries().len(), 3);
        assert_eq!(logger.get_entries_by_level(LogLevel::Error).len(), 1);
        assert!(logger.contains(LogLevel::Info, "started"));
    }

    #[test]
    fn test_log_context_builder() {
        let context = TokenLogContext::new()
            .node_id("n1")
            .grant_type("password")
            .extra("status", "401");

        assert_eq!(context.grant_type.as_deref(), Some("password"));
        assert_eq!(context.extras(), "status=401");
    }

    #[test]
    fn test_min_level_filtering() {
        let logger = InMemoryLogger::with_level(LogLevel::Warn);
        let context = TokenLogContext::new();

        logger.trace("trace", &context);
        logger.info("info", &context);
        logger.warn("warn", &context);
        logger.error("error", &context);

        assert_eq!(logger.get_entries().len(), 2);
    }

    #[test]
    fn test_tracing_logger_without_subscriber() {
        let logger = create_tracing_logger();
        logger.warn("Bad proxy URL", &TokenLogContext::new().node_id("n1"));
    }
}
