//! Scripted transport and recording sleeper shared by the integration tests.

#![allow(dead_code)]

use marketfeed_core::{
    ContentCheck, Response, Sleeper, SourceChain, SourceDescriptor, SourceRequest, Transport,
    TransportError, TransportErrorKind,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// What a scripted source does on one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    Body(&'static [u8]),
    Timeout,
}

/// Replays a per-source script in order; the last reply repeats forever.
/// A source with no script answers 500.
#[derive(Default)]
pub struct ScriptedTransport {
    script: HashMap<String, Vec<Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, source: &str, replies: Vec<Reply>) -> Self {
        self.script.insert(source.to_string(), replies);
        self
    }

    /// Source names in the order they were requested.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &SourceRequest) -> Result<Response, TransportError> {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.iter().filter(|c| **c == request.source).count();
        calls.push(request.source.clone());

        let reply = match self.script.get(&request.source) {
            Some(replies) if !replies.is_empty() => replies[n.min(replies.len() - 1)].clone(),
            _ => Reply::Status(500),
        };
        match reply {
            Reply::Status(status) => Ok(Response::new(
                status,
                format!("{} answered {status}", request.source),
            )),
            Reply::Body(body) => Ok(Response::new(200, body)),
            Reply::Timeout => Err(TransportError::new(
                TransportErrorKind::Timeout,
                format!("{} timed out", request.source),
            )),
        }
    }
}

/// Records every requested delay instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.slept().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn source(name: &str) -> SourceDescriptor {
    SourceDescriptor::new(name, format!("https://{name}.example/series/{{key}}"))
        .with_check(ContentCheck::MinBytes { min_bytes: 1 })
}

/// Chain built without consulting the process environment.
pub fn chain(sources: Vec<SourceDescriptor>) -> SourceChain {
    SourceChain::with_env_lookup(sources, &|_| None)
}

pub fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}
