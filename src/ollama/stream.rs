use super::buffer::{FlushBuffer, LineBuffer};
use crate::error::{FlashgenError, Result};
use crate::models::StreamRecord;
use futures::stream::{self, BoxStream, Stream};
use futures::StreamExt;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// What a single decoded line means for the caller.
#[derive(Debug)]
pub enum Step {
    /// Nothing to surface yet.
    Pending,
    Fragment(String),
    /// Terminal record seen, carrying whatever was still buffered.
    Done(Option<String>),
    Failed(FlashgenError),
}

/// Turns newline-delimited JSON generation records into flushed text fragments.
#[derive(Debug)]
pub struct RecordDecoder {
    lines: LineBuffer,
    buffer: FlushBuffer,
    records: usize,
}

impl RecordDecoder {
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            lines: LineBuffer::new(),
            buffer: FlushBuffer::new(flush_threshold),
            records: 0,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.lines = self.lines.with_max_line_bytes(max_line_bytes);
        self
    }

    /// Feeds one body read and returns the lines it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.lines.push(chunk)
    }

    pub fn decode_line(&mut self, line: &str) -> Step {
        let line = line.trim();
        if line.is_empty() {
            return Step::Pending;
        }

        let record: StreamRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Skipping malformed stream record ({}): {}", e, line);
                return Step::Pending;
            }
        };
        self.records += 1;

        if let Some(message) = record.error {
            return Step::Failed(FlashgenError::ServerError(message));
        }

        let flushed = record
            .response
            .as_deref()
            .and_then(|text| self.buffer.push(text));

        if record.done {
            // A flush leaves the buffer empty, so at most one of these is set.
            return Step::Done(flushed.or_else(|| self.buffer.finish()));
        }

        match flushed {
            Some(fragment) => Step::Fragment(fragment),
            None => Step::Pending,
        }
    }

    /// Called once the body is exhausted without a terminal record.
    ///
    /// Only a body that delivered no bytes at all is an error; one made of
    /// skipped lines simply ends.
    pub fn finish(&mut self) -> Step {
        let mut tail = None;
        if let Some(line) = self.lines.finish() {
            match self.decode_line(&line) {
                Step::Pending => {}
                Step::Fragment(fragment) => tail = Some(fragment),
                terminal => return terminal,
            }
        }

        if self.lines.received_bytes() == 0 {
            return Step::Failed(FlashgenError::EmptyResponse);
        }

        log::warn!("Generation stream ended without a done marker");
        Step::Done(tail.or_else(|| self.buffer.finish()))
    }

    pub fn records(&self) -> usize {
        self.records
    }
}

#[derive(Debug)]
enum Exit {
    Done,
    Cancelled,
    Failed,
}

/// Owns the response body and decodes it one read at a time, on demand.
struct BodyReader<S> {
    body: Option<Pin<Box<S>>>,
    decoder: RecordDecoder,
    lines: VecDeque<String>,
    cancel: CancellationToken,
}

impl<S, B, E> BodyReader<S>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    /// Reads only as far as needed to produce the next item.
    async fn next_item(&mut self) -> Option<Result<String>> {
        loop {
            if self.body.is_none() {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.release(Exit::Cancelled);
                return Some(Err(FlashgenError::Cancelled));
            }

            if let Some(line) = self.lines.pop_front() {
                let step = self.decoder.decode_line(&line);
                match self.settle(step) {
                    Some(item) => return item,
                    None => continue,
                }
            }

            let body = self.body.as_mut()?;
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                next = body.next() => Some(next),
            };

            match read {
                None => {
                    self.release(Exit::Cancelled);
                    return Some(Err(FlashgenError::Cancelled));
                }
                Some(Some(Ok(chunk))) => match self.decoder.feed(chunk.as_ref()) {
                    Ok(lines) => self.lines.extend(lines),
                    Err(e) => {
                        self.release(Exit::Failed);
                        return Some(Err(e));
                    }
                },
                Some(Some(Err(e))) => {
                    self.release(Exit::Failed);
                    return Some(Err(FlashgenError::TransportError(e.to_string())));
                }
                Some(None) => {
                    let step = self.decoder.finish();
                    if let Some(item) = self.settle(step) {
                        return item;
                    }
                    self.release(Exit::Done);
                    return None;
                }
            }
        }
    }

    /// Maps a decoded step to the item to yield, if the step produces one.
    fn settle(&mut self, step: Step) -> Option<Option<Result<String>>> {
        match step {
            Step::Pending => None,
            Step::Fragment(fragment) => Some(Some(Ok(fragment))),
            Step::Done(residual) => {
                self.release(Exit::Done);
                Some(residual.map(Ok))
            }
            Step::Failed(e) => {
                self.release(Exit::Failed);
                Some(Some(Err(e)))
            }
        }
    }

    fn release(&mut self, exit: Exit) {
        self.lines.clear();
        if let Some(body) = self.body.take() {
            drop(body);
            log::debug!(
                "Released generation body after {} records ({:?})",
                self.decoder.records(),
                exit
            );
        }
    }
}

/// Lazy sequence of generated text fragments for one generation call.
///
/// Nothing is read from the body until the sequence is polled, and each poll
/// reads only until the next fragment is ready. Fragments arrive in body order
/// and concatenate to the full output. The sequence ends after the terminal
/// record, on the first error, or with [`FlashgenError::Cancelled`] once the
/// token is cancelled. The response body is dropped exactly once, on whichever
/// exit comes first, or when the sequence itself is dropped.
pub struct FragmentStream {
    fragments: Option<BoxStream<'static, Result<String>>>,
    cancel: CancellationToken,
}

impl FragmentStream {
    pub fn new<S, B, E>(body: S, cancel: CancellationToken, flush_threshold: usize) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        Self::with_decoder(body, cancel, RecordDecoder::new(flush_threshold))
    }

    pub fn with_decoder<S, B, E>(body: S, cancel: CancellationToken, decoder: RecordDecoder) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let reader = BodyReader {
            body: Some(Box::pin(body)),
            decoder,
            lines: VecDeque::new(),
            cancel: cancel.clone(),
        };
        let fragments = stream::unfold(reader, |mut reader| async move {
            let item = reader.next_item().await?;
            Some((item, reader))
        })
        .boxed();

        Self {
            fragments: Some(fragments),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drains the stream into one string.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for FragmentStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(fragments) = this.fragments.as_mut() else {
            return Poll::Ready(None);
        };
        if this.cancel.is_cancelled() {
            this.fragments = None;
            log::debug!("Generation stream closed on cancellation");
            return Poll::Ready(Some(Err(FlashgenError::Cancelled)));
        }

        match fragments.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(fragment))) => Poll::Ready(Some(Ok(fragment))),
            Poll::Ready(Some(Err(e))) => {
                this.fragments = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.fragments = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ndjson, record, TrackedBody};

    async fn drain(stream: FragmentStream) -> Vec<Result<String>> {
        stream.collect().await
    }

    fn texts(items: Vec<Result<String>>) -> Vec<String> {
        items.into_iter().map(|item| item.unwrap()).collect()
    }

    #[tokio::test]
    async fn short_output_is_one_fragment_at_done() {
        let body = TrackedBody::new(&[concat!(
            "{\"response\":\"Hel\"}\n",
            "{\"response\":\"lo\"}\n",
            "{\"response\":\" world\"}\n",
            "{\"done\":true}\n"
        )]);
        let stream = FragmentStream::new(body, CancellationToken::new(), 50);
        assert_eq!(texts(drain(stream).await), vec!["Hello world"]);
    }

    #[tokio::test]
    async fn newline_flushes_below_threshold() {
        let body = TrackedBody::new(&[&ndjson(&["Line one:\n", "rest"])]);
        let stream = FragmentStream::new(body, CancellationToken::new(), 50);
        assert_eq!(texts(drain(stream).await), vec!["Line one:\n", "rest"]);
    }

    #[tokio::test]
    async fn threshold_flushes_long_buffer() {
        let long = "x".repeat(60);
        let body = TrackedBody::new(&[&ndjson(&[&long, "tail"])]);
        let stream = FragmentStream::new(body, CancellationToken::new(), 50);
        assert_eq!(texts(drain(stream).await), vec![long, "tail".to_string()]);
    }

    #[tokio::test]
    async fn records_split_at_every_byte_decode_identically() {
        let pieces = [
            "Naïve ",
            "café au lait ✓ ",
            "is a phrase\n",
            "that keeps going for quite a while without any break at all ",
            "and ",
            "ends.",
        ];
        let payload = ndjson(&pieces);
        let bytes: Vec<Vec<u8>> = payload.bytes().map(|b| vec![b]).collect();
        let body = TrackedBody::from_bytes(bytes);

        let stream = FragmentStream::new(body, CancellationToken::new(), 50);
        let fragments = texts(drain(stream).await);

        assert_eq!(fragments.concat(), pieces.concat());
        for fragment in &fragments[..fragments.len() - 1] {
            assert!(fragment.chars().count() >= 50 || fragment.contains('\n'));
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let body = TrackedBody::new(&[concat!(
            "{\"response\":\"a\"}\n",
            "not json at all\n",
            "{\"response\":\n",
            "{\"response\":\"b\"}\n",
            "{\"done\":true}\n"
        )]);
        let stream = FragmentStream::new(body, CancellationToken::new(), 50);
        assert_eq!(texts(drain(stream).await), vec!["ab"]);
    }

    #[tokio::test]
    async fn body_of_only_malformed_lines_ends_quietly() {
        let body = TrackedBody::new(&["garbage\nnot json\n"]);
        let counters = body.counters();
        let items = drain(FragmentStream::new(body, CancellationToken::new(), 50)).await;

        assert!(items.is_empty());
        assert_eq!(counters.drops(), 1);
    }

    #[tokio::test]
    async fn nothing_is_read_before_the_first_poll() {
        let chunks: Vec<String> = (0..3).map(|i| record(&i.to_string().repeat(60))).collect();
        let done = ndjson(&[]);
        let body = TrackedBody::new(&[&chunks[0], &chunks[1], &chunks[2], &done]);
        let counters = body.counters();
        let mut stream = FragmentStream::new(body, CancellationToken::new(), 50);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(counters.reads(), 0);

        assert_eq!(stream.next().await.unwrap().unwrap(), "0".repeat(60));
        assert_eq!(counters.reads(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(counters.reads(), 1);

        assert_eq!(stream.next().await.unwrap().unwrap(), "1".repeat(60));
        assert_eq!(counters.reads(), 2);
    }

    #[tokio::test]
    async fn reading_stops_at_done() {
        let body = TrackedBody::new(&[
            "{\"response\":\"x\",\"done\":true}\n",
            "{\"response\":\"never read\"}\n",
        ]);
        let counters = body.counters();
        let stream = FragmentStream::new(body, CancellationToken::new(), 50);

        assert_eq!(texts(drain(stream).await), vec!["x"]);
        assert_eq!(counters.reads(), 1);
        assert_eq!(counters.drops(), 1);
    }

    #[tokio::test]
    async fn cancel_mid_stream_yields_cancelled_and_releases_once() {
        let first = "y".repeat(60);
        let body = TrackedBody::new(&[&record(&first)]).hanging();
        let counters = body.counters();
        let cancel = CancellationToken::new();
        let mut stream = FragmentStream::new(body, cancel.clone(), 50);

        assert_eq!(stream.next().await.unwrap().unwrap(), first);
        cancel.cancel();
        assert!(matches!(stream.next().await, Some(Err(FlashgenError::Cancelled))));
        assert!(stream.next().await.is_none());
        assert_eq!(counters.drops(), 1);

        drop(stream);
        assert_eq!(counters.drops(), 1);
    }

    #[tokio::test]
    async fn cancel_during_pending_read_wakes_the_consumer() {
        let body = TrackedBody::new(&[]).hanging();
        let counters = body.counters();
        let cancel = CancellationToken::new();
        let mut stream = FragmentStream::new(body, cancel.clone(), 50);

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            stopper.cancel();
        });

        assert!(matches!(stream.next().await, Some(Err(FlashgenError::Cancelled))));
        assert_eq!(counters.drops(), 1);
    }

    #[tokio::test]
    async fn fragments_decoded_after_cancel_are_discarded() {
        let first = "a".repeat(50);
        let second = "b".repeat(50);
        let body = TrackedBody::new(&[&record(&first), &record(&second), &ndjson(&[])]);
        let counters = body.counters();
        let cancel = CancellationToken::new();
        let mut stream = FragmentStream::new(body, cancel.clone(), 50);

        assert_eq!(stream.next().await.unwrap().unwrap(), first);
        cancel.cancel();
        assert!(matches!(stream.next().await, Some(Err(FlashgenError::Cancelled))));
        assert!(stream.next().await.is_none());
        assert_eq!(counters.reads(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_yields_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let body = TrackedBody::new(&[&ndjson(&["hello"])]);
        let counters = body.counters();
        let items = drain(FragmentStream::new(body, cancel, 50)).await;

        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_cancelled());
        assert_eq!(counters.reads(), 0);
    }

    #[tokio::test]
    async fn transport_error_ends_stream_after_partial_output() {
        let first = "z".repeat(55);
        let body = TrackedBody::new(&[&record(&first)]).with_error("connection reset");
        let counters = body.counters();
        let items = drain(FragmentStream::new(body, CancellationToken::new(), 50)).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &first);
        assert!(matches!(
            &items[1],
            Err(FlashgenError::TransportError(msg)) if msg.contains("connection reset")
        ));
        assert_eq!(counters.drops(), 1);
    }

    #[tokio::test]
    async fn overlong_line_fails_the_stream() {
        let body = TrackedBody::new(&["{\"response\":\"", &"x".repeat(64)]).hanging();
        let counters = body.counters();
        let decoder = RecordDecoder::new(50).with_max_line_bytes(32);
        let stream = FragmentStream::with_decoder(body, CancellationToken::new(), decoder);
        let items = drain(stream).await;

        assert!(matches!(items.as_slice(), [Err(FlashgenError::TransportError(_))]));
        assert_eq!(counters.reads(), 2);
        assert_eq!(counters.drops(), 1);
    }

    #[tokio::test]
    async fn end_of_body_without_done_flushes_residual() {
        let body = TrackedBody::new(&["{\"response\":\"abc\"}\n{\"response\":\"def\"}"]);
        let stream = FragmentStream::new(body, CancellationToken::new(), 50);
        assert_eq!(texts(drain(stream).await), vec!["abcdef"]);
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        let body = TrackedBody::new(&[]);
        let items = drain(FragmentStream::new(body, CancellationToken::new(), 50)).await;
        assert!(matches!(items.as_slice(), [Err(FlashgenError::EmptyResponse)]));
    }

    #[tokio::test]
    async fn error_record_fails_the_stream() {
        let body = TrackedBody::new(&["{\"error\":\"model 'nope' not found\"}\n"]);
        let items = drain(FragmentStream::new(body, CancellationToken::new(), 50)).await;
        assert!(matches!(
            items.as_slice(),
            [Err(FlashgenError::ServerError(msg))] if msg.contains("nope")
        ));
    }

    #[tokio::test]
    async fn dropping_stream_releases_body() {
        let body = TrackedBody::new(&[]).hanging();
        let counters = body.counters();
        let stream = FragmentStream::new(body, CancellationToken::new(), 50);

        drop(stream);
        assert_eq!(counters.drops(), 1);
    }

    #[tokio::test]
    async fn collect_text_concatenates() {
        let body = TrackedBody::new(&[&ndjson(&["one ", "two\n", "three"])]);
        let text = FragmentStream::new(body, CancellationToken::new(), 50)
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "one two\nthree");
    }

    #[test]
    fn decoder_done_record_carries_response_and_residual() {
        let mut decoder = RecordDecoder::new(50);
        assert!(matches!(decoder.decode_line("{\"response\":\"ab\"}"), Step::Pending));
        match decoder.decode_line("{\"response\":\"cd\",\"done\":true}") {
            Step::Done(Some(rest)) => assert_eq!(rest, "abcd"),
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(decoder.records(), 2);
    }
}
