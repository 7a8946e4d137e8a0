use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSONL trace of scan and enhancement activity, one event per line.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: Box<dyn Write + Send>,
    counters: HashMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: Box::new(writer),
                counters: HashMap::new(),
            })),
        }
    }

    pub fn log_event(&self, kind: &str, fields: Value) {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(kind.to_string()));
        if let Value::Object(extra) = fields {
            record.extend(extra);
        }
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{}", Value::Object(record));
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts: Map<String, Value> = counters
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect();
            let record = json!({
                "type": "debug.summary",
                "context": context,
                "counts": counts,
            });
            let _ = writeln!(state.writer, "{record}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
