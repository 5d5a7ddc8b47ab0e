// src/arena/consumer.rs
//! Turns a chunked event-stream body into an ordered debate transcript.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use metrics::counter;
use serde::Serialize;

use super::decode::{LineBuffer, Utf8Decoder};
use super::frame::{parse_frame, Frame};
use super::{DebateTurn, RoleColumns, Transcript};

/// Why the consumer stopped reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Termination {
    /// The service sent `[DONE]`.
    Sentinel,
    /// The body ended without a sentinel.
    EndOfStream,
    /// Reading the body failed.
    Transport(String),
    /// The caller gave up first.
    Cancelled,
}

/// Everything a finished (or abandoned) session produced.
#[derive(Debug, Clone, Serialize)]
pub struct DebateOutcome {
    pub transcript: Transcript,
    pub termination: Termination,
    pub malformed_frames: u64,
    pub error_frames: u64,
}

impl DebateOutcome {
    pub fn columns(&self) -> RoleColumns {
        self.transcript.partition()
    }
}

pub struct StreamConsumer {
    /// `None` once the body has been released.
    inner: Option<BoxStream<'static, Result<Bytes, String>>>,
    decoder: Utf8Decoder,
    lines: LineBuffer,
    pending: VecDeque<String>,
    transcript: Transcript,
    termination: Option<Termination>,
    malformed_frames: u64,
    error_frames: u64,
}

impl StreamConsumer {
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        Self {
            inner: Some(stream.map(|r| r.map_err(|e| e.to_string())).boxed()),
            decoder: Utf8Decoder::new(),
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            transcript: Transcript::new(),
            termination: None,
            malformed_frames: 0,
            error_frames: 0,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.termination.is_some()
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    pub fn error_frames(&self) -> u64 {
        self.error_frames
    }

    /// Stop reading now and release the body. No-op once finished.
    pub fn cancel(&mut self) {
        self.finish(Termination::Cancelled);
    }

    fn finish(&mut self, why: Termination) {
        if self.termination.is_some() {
            return;
        }
        tracing::info!(
            target: "arena",
            turns = self.transcript.len(),
            malformed = self.malformed_frames,
            errors = self.error_frames,
            termination = ?why,
            "debate stream finished"
        );
        self.inner = None;
        self.pending.clear();
        self.termination = Some(why);
    }

    /// Apply one line; returns the new turn if it produced one.
    fn apply_line(&mut self, line: &str) -> Option<DebateTurn> {
        match parse_frame(line) {
            Frame::Turn(turn) => {
                counter!("arena_turns_total").increment(1);
                self.transcript.push(turn.clone());
                Some(turn)
            }
            Frame::Done => {
                self.finish(Termination::Sentinel);
                None
            }
            Frame::Error(msg) => {
                self.error_frames += 1;
                tracing::warn!(target: "arena", error = %msg, "debate service reported an error");
                None
            }
            Frame::Malformed(err) => {
                self.malformed_frames += 1;
                counter!("arena_malformed_frames_total").increment(1);
                tracing::warn!(target: "arena", error = %err, "skipping malformed event payload");
                None
            }
            Frame::Ignored => None,
        }
    }

    /// Read until the next turn arrives. Returns `None` once the stream is over.
    ///
    /// Only suspends while waiting for the next body chunk, so dropping the
    /// returned future between chunks loses nothing.
    pub async fn next_turn(&mut self) -> Option<DebateTurn> {
        loop {
            if self.termination.is_some() {
                return None;
            }

            while let Some(line) = self.pending.pop_front() {
                if let Some(turn) = self.apply_line(&line) {
                    return Some(turn);
                }
                if self.termination.is_some() {
                    return None;
                }
            }

            let next = match self.inner.as_mut() {
                Some(stream) => stream.next().await,
                None => {
                    self.finish(Termination::EndOfStream);
                    return None;
                }
            };

            match next {
                Some(Ok(chunk)) => {
                    let text = self.decoder.decode(&chunk);
                    let lines = self.lines.push(&text);
                    self.pending.extend(lines);
                }
                Some(Err(e)) => {
                    tracing::warn!(target: "arena", error = %e, "debate stream transport error");
                    self.finish(Termination::Transport(e));
                    return None;
                }
                None => {
                    // Body done: release it and process whatever is still buffered.
                    self.inner = None;
                    let tail = self.decoder.finish();
                    let lines = self.lines.push(&tail);
                    self.pending.extend(lines);
                    self.pending.extend(self.lines.finish());
                }
            }
        }
    }

    /// Consume until the stream ends.
    pub async fn run(mut self) -> DebateOutcome {
        while self.next_turn().await.is_some() {}
        self.into_outcome()
    }

    /// Consume until the stream ends or `cancel` resolves, whichever is first.
    /// On cancel the body is dropped right away and the partial transcript kept.
    pub async fn run_until<F>(mut self, cancel: F) -> DebateOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        loop {
            let cancelled = tokio::select! {
                biased;
                _ = &mut cancel => true,
                turn = self.next_turn() => {
                    if turn.is_none() {
                        break;
                    }
                    false
                }
            };
            if cancelled {
                self.cancel();
                break;
            }
        }
        self.into_outcome()
    }

    pub fn into_outcome(mut self) -> DebateOutcome {
        if self.termination.is_none() {
            self.finish(Termination::Cancelled);
        }
        DebateOutcome {
            termination: self.termination.take().unwrap_or(Termination::Cancelled),
            transcript: std::mem::take(&mut self.transcript),
            malformed_frames: self.malformed_frames,
            error_frames: self.error_frames,
        }
    }
}
