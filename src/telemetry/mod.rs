//! Telemetry
//!
//! Observability components for token operations.
//!
//! - **Logging**: structured logging with node context, forwarded to `tracing`
//! - **Metrics**: counters for requests, outcomes and lifecycle transitions

pub mod logging;
pub mod metrics;

pub use logging::{
    create_in_memory_logger, create_tracing_logger, no_op_logger, InMemoryLogger, LogEntry,
    LogLevel, Logger, NoOpLogger, TokenLogContext, TracingLogger,
};
pub use metrics::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, TokenMetrics,
};
