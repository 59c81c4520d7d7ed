// SPDX-License-Identifier: Apache-2.0

//! A minimal Chrome trace-event ("catapult") writer.
//!
//! `forge-model`'s async map (C3) schedules thousands of short-lived
//! producer invocations across worker threads; understanding why a build is
//! slow means seeing *when* each key started and finished relative to the
//! others, which a log line cannot show. This mirrors the event-phase
//! vocabulary the teacher's `focus-tracing::chrome` module writes (the
//! `B`/`E`/`X`/`i` single-letter phases of the Chrome trace format) without
//! porting its `git_trace2`-specific event sources, which have no analogue
//! in this domain.

use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "B")]
    DurationBegin,
    #[serde(rename = "E")]
    DurationEnd,
    #[serde(rename = "X")]
    Complete,
    #[serde(rename = "i")]
    Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub cat: String,
    pub ph: Phase,
    /// Microseconds since the trace started.
    pub ts: u64,
    pub pid: u32,
    pub tid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dur: Option<u64>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Append-only sink for [`TraceEvent`]s, emitting the JSON-Lines flavor of
/// the Chrome trace format (one object per line, no enclosing array) so that
/// events can be flushed incrementally from many worker threads.
pub struct Trace {
    writer: Mutex<Box<dyn Write + Send>>,
    pid: u32,
}

impl Trace {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            pid: std::process::id(),
        }
    }

    pub fn to_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    pub fn emit(&self, event: TraceEvent) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().expect("trace writer poisoned");
        serde_json::to_writer(&mut *writer, &event)?;
        writeln!(writer)?;
        Ok(())
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Record the duration of `f` as a single `Complete` event named `name`.
pub fn time_scope<T>(
    trace: Option<&Trace>,
    name: &str,
    cat: &str,
    tid: u64,
    epoch: std::time::Instant,
    f: impl FnOnce() -> T,
) -> T {
    let start = epoch.elapsed().as_micros() as u64;
    let result = f();
    if let Some(trace) = trace {
        let dur = (epoch.elapsed().as_micros() as u64).saturating_sub(start);
        let _ = trace.emit(TraceEvent {
            name: name.to_string(),
            cat: cat.to_string(),
            ph: Phase::Complete,
            ts: start,
            pid: trace.pid(),
            tid,
            dur: Some(dur),
            args: Default::default(),
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_line_per_event() {
        let buf: Vec<u8> = Vec::new();
        let trace = Trace::new(Box::new(buf));
        trace
            .emit(TraceEvent {
                name: "hash_key".into(),
                cat: "async_map".into(),
                ph: Phase::Instant,
                ts: 0,
                pid: trace.pid(),
                tid: 1,
                dur: None,
                args: Default::default(),
            })
            .unwrap();
    }
}
