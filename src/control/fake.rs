//! In-memory control library for tests.

use super::{ControlOp, SmurfControl};
use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// Records every operation and answers from a canned table.
///
/// The clock advances one second per timestamp read, so `start <= end` holds for
/// every step.
pub(crate) struct FakeControl {
    pub output_dir: PathBuf,
    pub outputs: HashMap<&'static str, Value>,
    pub fail_on: Option<&'static str>,
    pub channels: Vec<i64>,
    clock: AtomicI64,
    calls: Mutex<Vec<ControlOp>>,
}

impl FakeControl {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            outputs: HashMap::new(),
            fail_on: None,
            channels: vec![0, 16, 32],
            clock: AtomicI64::new(1_583_352_819),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(mut self, op: &'static str, value: Value) -> Self {
        self.outputs.insert(op, value);
        self
    }

    pub fn failing_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Operations called so far, excluding timestamp and output-dir queries.
    pub fn calls(&self) -> Vec<ControlOp> {
        self.calls.lock().unwrap().clone()
    }
}

impl SmurfControl for FakeControl {
    async fn call(&self, op: &ControlOp) -> Result<Value> {
        match op {
            ControlOp::GetTimestamp { .. } => {
                return Ok(json!(self.clock.fetch_add(1, Ordering::SeqCst)))
            }
            ControlOp::OutputDir => return Ok(json!(self.output_dir)),
            _ => {}
        }
        self.calls.lock().unwrap().push(op.clone());
        if self.fail_on == Some(op.name()) {
            bail!("{} failed on fake hardware", op.name());
        }
        if let ControlOp::WhichOn { .. } = op {
            return Ok(json!(self.channels));
        }
        Ok(self
            .outputs
            .get(op.name())
            .cloned()
            .unwrap_or_else(|| json!(format!("{} ok", op.name()))))
    }
}
