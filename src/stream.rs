//! Accumulates streamed response events into the conversation.
//!
//! The gateway sends cumulative snapshots, not deltas: every event carries
//! the full text so far. The accumulator owns the one in-progress assistant
//! node; there is never more than one active stream.

use crate::conversation::{Conversation, Role};
use crate::persona;

/// One streamed event from the gateway, already decoded.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    /// Cumulative response text (or the error message for `Error` events).
    pub text: String,
    pub kind: ResponseKind,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Assistant,
    Error,
}

/// Events delivered from the client task to the UI loop.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Chunk(ResponseEvent),
    /// The request could not be issued at all (transport failure, bad
    /// status before any stream was established).
    SendFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Idle,
    Streaming { node: usize },
}

/// What the caller should surface after applying an event.
#[derive(Debug, Default)]
pub struct StepResult {
    /// Transient notices to toast.
    pub notices: Vec<String>,
    /// True when this event ended the stream (the waiting state can clear).
    pub done: bool,
}

pub struct Accumulator {
    state: StreamState,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
        }
    }

    /// Drop any in-progress state ahead of a new send.
    pub fn reset(&mut self) {
        self.state = StreamState::Idle;
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, StreamState::Streaming { .. })
    }

    /// Fold one event into the conversation. Masking happens here, before
    /// any text reaches the render pipeline, so partial and final snapshots
    /// are masked alike.
    pub fn apply(&mut self, event: ResponseEvent, conv: &mut Conversation) -> StepResult {
        let mut result = StepResult::default();

        if event.kind == ResponseKind::Error {
            conv.remove_thinking();
            result.notices.push(format!("Server error: {}", event.text));
            self.state = StreamState::Idle;
            result.done = true;
            return result;
        }

        if event.text.is_empty() {
            if !event.is_complete {
                // Keep-alive with nothing to show yet.
                return result;
            }
            // Terminal event with no content at all.
            match self.state {
                StreamState::Idle => {
                    conv.remove_thinking();
                    result.notices.push("The response was empty.".to_string());
                }
                StreamState::Streaming { node } => conv.finalize(node),
            }
            self.state = StreamState::Idle;
            result.done = true;
            return result;
        }

        let masked = persona::mask_provider_identity(&event.text);
        let applied = match self.state {
            StreamState::Idle => {
                conv.remove_thinking();
                match conv.append_streaming(Role::Assistant, &masked) {
                    Ok(node) => {
                        self.state = StreamState::Streaming { node };
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            StreamState::Streaming { node } => conv.update_assistant(node, &masked),
        };

        match applied {
            Ok(()) => {
                if event.is_complete {
                    if let StreamState::Streaming { node } = self.state {
                        conv.finalize(node);
                    }
                    self.state = StreamState::Idle;
                    result.done = true;
                }
            }
            Err(err) => {
                // Rendering failed; abandon the stream rather than show a
                // half-mangled node.
                tracing::warn!(error = %err, "render failed mid-stream");
                conv.remove_thinking();
                result
                    .notices
                    .push("Failed to render the response.".to_string());
                self.state = StreamState::Idle;
                result.done = true;
            }
        }

        result
    }
}
