use crate::error::{FlashgenError, Result};
use crate::ollama::{FragmentStream, TextGenerator};
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::json;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// One `{"response": ...}` line.
pub fn record(text: &str) -> String {
    format!("{}\n", json!({ "response": text }))
}

/// A full response body: one record per fragment plus the terminal record.
pub fn ndjson(fragments: &[&str]) -> String {
    let mut body: String = fragments.iter().map(|f| record(f)).collect();
    body.push_str("{\"done\":true}\n");
    body
}

#[derive(Clone, Default)]
pub struct BodyCounters {
    reads: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl BodyCounters {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// Scripted response body that records how often it was read and dropped.
pub struct TrackedBody {
    chunks: VecDeque<std::result::Result<Vec<u8>, io::Error>>,
    hang_when_empty: bool,
    counters: BodyCounters,
}

impl TrackedBody {
    pub fn new(chunks: &[&str]) -> Self {
        Self::from_bytes(chunks.iter().map(|c| c.as_bytes().to_vec()).collect())
    }

    pub fn from_bytes(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Ok).collect(),
            hang_when_empty: false,
            counters: BodyCounters::default(),
        }
    }

    /// Never ends once the scripted chunks run out, like a stalled server.
    pub fn hanging(mut self) -> Self {
        self.hang_when_empty = true;
        self
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.chunks.push_back(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            message.to_string(),
        )));
        self
    }

    pub fn counters(&self) -> BodyCounters {
        self.counters.clone()
    }
}

impl Stream for TrackedBody {
    type Item = std::result::Result<Vec<u8>, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.chunks.pop_front() {
            Some(chunk) => {
                self.counters.reads.fetch_add(1, Ordering::SeqCst);
                Poll::Ready(Some(chunk))
            }
            None if self.hang_when_empty => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.counters.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Text generator that replays scripted bodies in call order.
#[derive(Default)]
pub struct ScriptedGenerator {
    bodies: Mutex<VecDeque<TrackedBody>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(bodies: Vec<TrackedBody>) -> Self {
        Self {
            bodies: Mutex::new(bodies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_stream(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream> {
        if cancel.is_cancelled() {
            return Err(FlashgenError::Cancelled);
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        let body = self
            .bodies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| FlashgenError::ConnectivityError("no scripted body left".into()))?;
        Ok(FragmentStream::new(body, cancel, 50))
    }
}
