//! Result persistence

pub mod sink;

pub use sink::{ResultSink, SinkOutcome, SinkStats};
