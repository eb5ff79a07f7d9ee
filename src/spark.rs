//! Chat gateway client.
//!
//! Speaks the OpenAI-compatible streaming protocol the Spark proxy exposes:
//! `POST /v1/chat/completions` with `stream: true` and SSE `data:` lines in
//! the reply. Delta fragments are folded into a cumulative snapshot and each
//! snapshot is forwarded over the channel, so the UI side only ever sees
//! full-text events.

use anyhow::{bail, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::{ClientEvent, ResponseEvent, ResponseKind};

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatTurn>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatTurn {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatDelta {
    choices: Vec<DeltaChoice>,
}

#[derive(Deserialize)]
struct DeltaChoice {
    delta: DeltaContent,
}

#[derive(Deserialize, Default)]
struct DeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Deserialize)]
struct WireErrorBody {
    message: String,
}

/// Folds SSE lines into response events.
///
/// The consumer contract allows at most one terminal event per turn, so once
/// one has been produced every remaining line is ignored — a stream carrying
/// an in-band error object followed by `[DONE]` must not surface both.
struct EventFold {
    full: String,
    terminated: bool,
}

impl EventFold {
    fn new() -> Self {
        Self {
            full: String::new(),
            terminated: false,
        }
    }

    fn on_line(&mut self, line: &str) -> Option<ResponseEvent> {
        if self.terminated {
            return None;
        }
        let payload = line.trim().strip_prefix("data:")?.trim();

        if payload == "[DONE]" {
            self.terminated = true;
            return Some(ResponseEvent {
                text: self.full.clone(),
                kind: ResponseKind::Assistant,
                is_complete: true,
            });
        }

        if let Ok(delta) = serde_json::from_str::<ChatDelta>(payload) {
            let fragment = delta
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
                .unwrap_or("");
            self.full.push_str(fragment);
            return Some(ResponseEvent {
                text: self.full.clone(),
                kind: ResponseKind::Assistant,
                is_complete: false,
            });
        }

        if let Ok(wire) = serde_json::from_str::<WireError>(payload) {
            self.terminated = true;
            return Some(ResponseEvent {
                text: wire.error.message,
                kind: ResponseKind::Error,
                is_complete: true,
            });
        }

        tracing::debug!(line = %payload, "unrecognized stream line");
        None
    }

    /// Connection closed. If no terminal line arrived, treat what we have as
    /// the whole answer.
    fn finish(&mut self) -> Option<ResponseEvent> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        Some(ResponseEvent {
            text: std::mem::take(&mut self.full),
            kind: ResponseKind::Assistant,
            is_complete: true,
        })
    }
}

#[derive(Clone)]
pub struct SparkClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl SparkClient {
    pub fn new(base_url: &str, model: &str, tx: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            tx,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Probe the gateway. With `silent`, transport failures come back as
    /// `Ok(false)` so startup can degrade to an in-conversation notice
    /// instead of aborting.
    pub async fn connect(&self, silent: bool) -> Result<bool> {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(err) if silent => {
                tracing::warn!(error = %err, "gateway probe failed");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Send one user turn and stream the reply back over the channel. The
    /// returned future runs until the stream ends; the caller spawns it.
    pub async fn send_message(&self, prompt: &str) -> Result<()> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatTurn {
                role: "user",
                content: prompt.to_string(),
            }],
            stream: true,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if let Ok(wire) = serde_json::from_str::<WireError>(&body) {
                bail!("{}", wire.error.message);
            }
            bail!("gateway returned {}", status);
        }

        let mut fold = EventFold::new();
        let mut buffer = String::new();
        let mut byte_stream = response.bytes_stream();

        'read: while let Some(piece) = byte_stream.next().await {
            let bytes = piece?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].to_string();
                buffer.drain(..=newline);
                if let Some(event) = fold.on_line(&line) {
                    self.emit(event);
                }
                if fold.terminated {
                    break 'read;
                }
            }
        }

        if let Some(event) = fold.finish() {
            self.emit(event);
        }
        Ok(())
    }

    fn emit(&self, event: ResponseEvent) {
        // Receiver gone means the UI is shutting down.
        let _ = self.tx.send(ClientEvent::Chunk(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(lines: &[&str]) -> Vec<ResponseEvent> {
        let mut fold = EventFold::new();
        let mut events = Vec::new();
        for line in lines {
            events.extend(fold.on_line(line));
        }
        events.extend(fold.finish());
        events
    }

    #[test]
    fn request_serializes_with_stream_flag() {
        let request = ChatRequest {
            model: "spark-lite".to_string(),
            messages: vec![ChatTurn {
                role: "user",
                content: "hi".to_string(),
            }],
            stream: true,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"stream\":true"));
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"model\":\"spark-lite\""));
    }

    #[test]
    fn delta_without_content_is_tolerated() {
        let payload = r#"{"choices":[{"delta":{}}]}"#;
        let delta: ChatDelta = serde_json::from_str(payload).unwrap();
        assert!(delta.choices[0].delta.content.is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = SparkClient::new("http://localhost:8000/", "spark-lite", tx);
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[test]
    fn deltas_accumulate_into_cumulative_snapshots() {
        let events = drive(&[
            r#"data: {"choices":[{"delta":{"content":"hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "data: [DONE]",
        ]);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].text, "hel");
        assert_eq!(events[1].text, "hello");
        assert!(events[2].is_complete);
        assert_eq!(events[2].text, "hello");
    }

    #[test]
    fn error_then_done_emits_one_terminal_event() {
        let events = drive(&[
            r#"data: {"choices":[{"delta":{"content":"par"}}]}"#,
            r#"data: {"error":{"message":"boom"}}"#,
            "data: [DONE]",
        ]);
        let terminal: Vec<_> = events.iter().filter(|e| e.is_complete).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].kind, ResponseKind::Error);
        assert_eq!(terminal[0].text, "boom");
    }

    #[test]
    fn lines_after_done_are_ignored() {
        let events = drive(&[
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"late"}}]}"#,
        ]);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_complete);
        assert_eq!(events[0].text, "");
    }

    #[test]
    fn stream_end_without_done_is_still_terminal() {
        let events = drive(&[r#"data: {"choices":[{"delta":{"content":"half"}}]}"#]);
        assert_eq!(events.len(), 2);
        assert!(events[1].is_complete);
        assert_eq!(events[1].text, "half");
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let events = drive(&[": keep-alive", "", "data: [DONE]"]);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_complete);
    }
}
