//! Scripted AT radio for tests
//!
//! Each complete line written is checked against the next script entry and
//! answered with that entry's lines. JSON lines are answered as JSON-RPC
//! calls. Escape characters are counted, not echoed.

use crate::rpc::{Request, Response};
use eolt_core::{Result, Transport};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

enum Step {
    Line(String, Vec<String>),
    Rpc(String, Value),
}

pub(crate) struct ScriptedRadio {
    script: VecDeque<Step>,
    pending: Vec<u8>,
    out: VecDeque<u8>,
    received: Vec<String>,
    escapes: usize,
    timeout: Duration,
}

impl ScriptedRadio {
    pub(crate) fn new() -> Self {
        Self {
            script: VecDeque::new(),
            pending: Vec::new(),
            out: VecDeque::new(),
            received: Vec::new(),
            escapes: 0,
            timeout: Duration::from_millis(100),
        }
    }

    /// Answer `line` with `replies`
    pub(crate) fn expect(mut self, line: &str, replies: &[&str]) -> Self {
        self.script.push_back(Step::Line(
            line.to_string(),
            replies.iter().map(|r| r.to_string()).collect(),
        ));
        self
    }

    /// Answer a call of `method` with `result`
    pub(crate) fn rpc(mut self, method: &str, result: Value) -> Self {
        self.script.push_back(Step::Rpc(method.to_string(), result));
        self
    }

    /// Non-JSON lines received so far
    pub(crate) fn received(&self) -> &[String] {
        &self.received
    }

    pub(crate) fn escapes(&self) -> usize {
        self.escapes
    }

    fn queue(&mut self, line: &str) {
        self.out.extend(line.as_bytes());
        self.out.extend(b"\r\n");
    }

    fn on_line(&mut self, line: String) {
        if line.starts_with('{') {
            let request: Request = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(_) => return,
            };
            if let Some(Step::Rpc(method, result)) = self.script.front() {
                if *method == request.method {
                    let response = Response {
                        id: request.id,
                        result: Some(result.clone()),
                        error: None,
                    };
                    self.script.pop_front();
                    // Unrelated chatter the driver must skip
                    self.queue("+RSSI=-40");
                    if let Ok(text) = serde_json::to_string(&response) {
                        self.queue(&text);
                    }
                }
            }
            return;
        }

        self.received.push(line.clone());
        let replies = match self.script.front() {
            Some(Step::Line(expected, replies)) if *expected == line => replies.clone(),
            _ => {
                self.queue("ERROR");
                return;
            }
        };
        self.script.pop_front();
        for reply in replies {
            self.queue(&reply);
        }
    }
}

impl Transport for ScriptedRadio {
    fn name(&self) -> &str {
        "scripted-radio"
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let k = n.min(self.out.len());
        Ok(self.out.drain(..k).collect())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        for &b in data {
            if b == b'^' {
                self.escapes += 1;
                continue;
            }
            self.pending.push(b);
            if self.pending.ends_with(b"\r\n") {
                let raw = std::mem::take(&mut self.pending);
                let line = String::from_utf8_lossy(&raw[..raw.len() - 2]).into_owned();
                self.on_line(line);
            }
        }
        Ok(())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.out.clear();
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        self.out.clear();
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}
