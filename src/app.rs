use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::conversation::{Conversation, Role};
use crate::persona;
use crate::spark::SparkClient;
use crate::stream::{Accumulator, ClientEvent};

/// Cadence of the UI clock. The ellipsis animation and toast expiry count
/// these ticks, so this is the one place the rate is set.
pub const TICK_INTERVAL: Duration = Duration::from_millis(300);

/// Transient notice shown in the corner of the screen.
pub struct Toast {
    pub text: String,
    pub ticks_left: u8,
}

// ~2 seconds' worth of TICK_INTERVAL.
const TOAST_TICKS: u8 = 7;

pub struct App {
    pub should_quit: bool,

    // Input state
    pub input: String,
    pub input_cursor: usize, // char position in input

    // Conversation state
    pub conversation: Conversation,
    pub accumulator: Accumulator,
    pub waiting: bool,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // View state
    pub toast: Option<Toast>,
    pub chat_scroll: u16,
    pub chat_height: u16, // set during render, for scroll calculations
    pub chat_width: u16,  // set during render, for wrap calculations

    pub spark: SparkClient,
    pub client_tx: mpsc::UnboundedSender<ClientEvent>,
    pub transcript_path: std::path::PathBuf,
}

impl App {
    pub fn new(
        spark: SparkClient,
        client_tx: mpsc::UnboundedSender<ClientEvent>,
        transcript_path: std::path::PathBuf,
    ) -> Self {
        Self {
            should_quit: false,
            input: String::new(),
            input_cursor: 0,
            conversation: Conversation::new(),
            accumulator: Accumulator::new(),
            waiting: false,
            animation_frame: 0,
            toast: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            spark,
            client_tx,
            transcript_path,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn show_toast(&mut self, text: impl Into<String>) {
        self.toast = Some(Toast {
            text: text.into(),
            ticks_left: TOAST_TICKS,
        });
    }

    /// Take the drafted input and send it. Identity questions are answered
    /// locally; everything else goes to the gateway with a thinking
    /// placeholder in the meantime.
    pub fn submit(&mut self) -> Result<()> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }
        if self.waiting {
            // One active stream at a time.
            self.show_toast("Still answering, hold on.");
            return Ok(());
        }

        self.input.clear();
        self.input_cursor = 0;

        self.conversation.append(Role::User, &text)?;

        if let Some(canned) = persona::classify(&text) {
            self.conversation.append(Role::Assistant, &canned.text)?;
            self.scroll_to_bottom();
            return Ok(());
        }

        self.waiting = true;
        self.accumulator.reset();
        self.conversation.append(Role::Thinking, "")?;
        self.scroll_to_bottom();

        let spark = self.spark.clone();
        let tx = self.client_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = spark.send_message(&text).await {
                let _ = tx.send(ClientEvent::SendFailed(err.to_string()));
            }
        });
        Ok(())
    }

    pub fn on_client_event(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Chunk(chunk) => {
                let step = self.accumulator.apply(chunk, &mut self.conversation);
                for notice in step.notices {
                    self.show_toast(notice);
                }
                if step.done {
                    self.waiting = false;
                }
            }
            ClientEvent::SendFailed(reason) => {
                tracing::warn!(reason = %reason, "send failed");
                self.conversation.remove_thinking();
                self.conversation
                    .append(Role::Error, &format!("Request failed: {}", reason))?;
                self.waiting = false;
                self.accumulator.reset();
            }
        }
        self.scroll_to_bottom();
        Ok(())
    }

    /// Tick animation frame and toast countdown (called by Tick event).
    pub fn tick(&mut self) {
        if self.waiting {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some(toast) = &mut self.toast {
            toast.ticks_left = toast.ticks_left.saturating_sub(1);
            if toast.ticks_left == 0 {
                self.toast = None;
            }
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    /// Scroll the conversation so the newest message is visible.
    pub fn scroll_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        // Counted in usize: long sessions overflow a u16 line count well
        // before they overflow anything else.
        let mut total_lines: usize = 0;

        for node in self.conversation.nodes() {
            total_lines += 1; // header line (icon + label)
            if node.role == Role::Thinking {
                total_lines += 1; // "Smitty is thinking..."
            } else {
                for line in node.raw_text.lines() {
                    // Character count, not byte length, for UTF-8 content.
                    let char_count = line.chars().count();
                    if char_count == 0 {
                        total_lines += 1;
                    } else {
                        total_lines += (char_count / wrap_width) + 1;
                    }
                }
            }
            total_lines += 1; // blank line after message
        }

        self.chat_scroll = total_lines
            .saturating_sub(self.chat_height as usize)
            .min(u16::MAX as usize) as u16;
    }

    /// Write the conversation out as an HTML transcript.
    pub fn export_transcript(&self) -> Result<std::path::PathBuf> {
        if let Some(parent) = self.transcript_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.transcript_path, self.conversation.to_html())?;
        Ok(self.transcript_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let spark = SparkClient::new("http://127.0.0.1:8000", "spark-lite", tx.clone());
        App::new(spark, tx, std::path::PathBuf::from("/tmp/smitty-test.html"))
    }

    #[test]
    fn empty_input_is_not_submitted() {
        let mut app = test_app();
        app.input = "   ".to_string();
        app.submit().unwrap();
        assert!(app.conversation.is_empty());
        assert!(!app.waiting);
    }

    #[test]
    fn identity_question_is_answered_without_the_gateway() {
        let mut app = test_app();
        app.input = "你是谁".to_string();
        app.submit().unwrap();

        assert!(!app.waiting);
        let nodes = app.conversation.nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].role, Role::User);
        assert_eq!(nodes[1].role, Role::Assistant);
        assert!(nodes[1].raw_text.contains("SMT"));
        // No thinking placeholder was ever queued.
        assert!(nodes.iter().all(|n| n.role != Role::Thinking));
    }

    #[test]
    fn send_failure_becomes_an_error_node() {
        let mut app = test_app();
        app.waiting = true;
        app.conversation.append(Role::Thinking, "").unwrap();

        app.on_client_event(ClientEvent::SendFailed("connection refused".to_string()))
            .unwrap();

        assert!(!app.waiting);
        let nodes = app.conversation.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].role, Role::Error);
        assert!(nodes[0].raw_text.contains("connection refused"));
    }

    #[test]
    fn toast_expires_after_its_ticks() {
        let mut app = test_app();
        app.show_toast("hello");
        for _ in 0..TOAST_TICKS {
            app.tick();
        }
        assert!(app.toast.is_none());
    }

    #[test]
    fn scroll_math_survives_very_long_sessions() {
        let mut app = test_app();
        app.chat_width = 1;
        app.chat_height = 10;
        app.conversation
            .append(Role::System, &"a".repeat(70_000))
            .unwrap();
        app.scroll_to_bottom();
        assert_eq!(app.chat_scroll, u16::MAX);
    }

    #[test]
    fn animation_only_advances_while_waiting() {
        let mut app = test_app();
        app.tick();
        assert_eq!(app.animation_frame, 0);
        app.waiting = true;
        app.tick();
        assert_eq!(app.animation_frame, 1);
    }
}
