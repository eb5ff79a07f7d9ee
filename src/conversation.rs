use anyhow::Result;

use crate::highlight::highlight;
use crate::markup::{self, CodeBlockDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Error,
    Thinking,
}

/// How a role is presented, shared by the TUI pane and the HTML transcript.
/// `markup` decides whether content is pipeline output or plain escaped text:
/// only assistant output is expected to carry Markdown-like structure.
pub struct RoleDescriptor {
    pub icon: &'static str,
    pub label: &'static str,
    pub class: &'static str,
    pub markup: bool,
}

impl Role {
    pub fn descriptor(self) -> &'static RoleDescriptor {
        match self {
            Role::User => &RoleDescriptor {
                icon: "👤",
                label: "You",
                class: "user-message",
                markup: false,
            },
            Role::Assistant => &RoleDescriptor {
                icon: "A",
                label: "Smitty",
                class: "assistant-message",
                markup: true,
            },
            Role::System => &RoleDescriptor {
                icon: "🔔",
                label: "System",
                class: "system-message",
                markup: false,
            },
            Role::Error => &RoleDescriptor {
                icon: "⚠️",
                label: "System",
                class: "error-message",
                markup: false,
            },
            Role::Thinking => &RoleDescriptor {
                icon: "🤔",
                label: "Smitty",
                class: "thinking-message",
                markup: false,
            },
        }
    }
}

/// One entry in the conversation view.
///
/// `complete` is meaningful only for assistant messages: false while the
/// response is still streaming, true once the terminal event was processed.
#[derive(Debug, Clone)]
pub struct MessageNode {
    pub role: Role,
    pub raw_text: String,
    pub rendered_html: String,
    pub complete: bool,
    pub code_blocks: Vec<CodeBlockDescriptor>,
}

/// Append-only ordered view of the session's messages. Cleared only by
/// exiting; nothing is persisted across runs.
#[derive(Default)]
pub struct Conversation {
    nodes: Vec<MessageNode>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[MessageNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a fully-formed message. Assistant content goes through the
    /// transform pipeline and is finalized (highlighted) immediately; other
    /// roles carry plain text.
    pub fn append(&mut self, role: Role, content: &str) -> Result<usize> {
        let idx = self.append_streaming(role, content)?;
        if role == Role::Assistant {
            self.finalize(idx);
        }
        Ok(idx)
    }

    /// Append an assistant message that is still streaming: formatted, but
    /// not yet complete and not yet highlighted.
    pub fn append_streaming(&mut self, role: Role, content: &str) -> Result<usize> {
        let node = match role {
            Role::Assistant => {
                let formatted = markup::format(content)?;
                MessageNode {
                    role,
                    raw_text: content.to_string(),
                    rendered_html: formatted.html,
                    complete: false,
                    code_blocks: formatted.code_blocks,
                }
            }
            _ => MessageNode {
                role,
                raw_text: content.to_string(),
                rendered_html: String::new(),
                complete: false,
                code_blocks: Vec::new(),
            },
        };
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    /// Replace the content of an in-progress assistant message with the
    /// latest cumulative text, re-rendering from scratch.
    pub fn update_assistant(&mut self, idx: usize, content: &str) -> Result<()> {
        let formatted = markup::format(content)?;
        if let Some(node) = self.nodes.get_mut(idx) {
            node.raw_text = content.to_string();
            node.rendered_html = formatted.html;
            node.code_blocks = formatted.code_blocks;
        }
        Ok(())
    }

    /// Mark an assistant message complete and run the highlight stage over
    /// each of its code blocks, swapping the plain bodies for tokenized ones
    /// and filling in the line-number gutters.
    pub fn finalize(&mut self, idx: usize) {
        let Some(node) = self.nodes.get_mut(idx) else {
            return;
        };
        node.complete = true;

        let blocks = node.code_blocks.clone();
        for block in &blocks {
            let hl = highlight(&block.content, &block.language);

            let gutter: String = hl
                .line_numbers
                .iter()
                .map(|n| format!("<span class=\"line-number\">{}</span>", n))
                .collect();
            let empty_gutter = format!("<div class=\"line-numbers\" id=\"line-numbers-{}\"></div>", block.id);
            let filled_gutter = format!(
                "<div class=\"line-numbers\" id=\"line-numbers-{}\">{}</div>",
                block.id, gutter
            );
            node.rendered_html = node.rendered_html.replace(&empty_gutter, &filled_gutter);

            let plain_body = format!(
                "<code id=\"{}\" class=\"language-{}\">{}</code>",
                block.id, block.language, block.escaped
            );
            let highlighted_body = format!(
                "<code id=\"{}\" class=\"language-{}\">{}</code>",
                block.id, block.language, hl.code
            );
            node.rendered_html = node.rendered_html.replace(&plain_body, &highlighted_body);
        }
    }

    /// Drop every thinking placeholder currently in the view.
    pub fn remove_thinking(&mut self) {
        self.nodes.retain(|node| node.role != Role::Thinking);
    }

    pub fn find_code_block(&self, id: &str) -> Option<&CodeBlockDescriptor> {
        self.nodes
            .iter()
            .flat_map(|node| node.code_blocks.iter())
            .find(|block| block.id == id)
    }

    /// Most recent code block in the conversation, if any (copy target).
    pub fn last_code_block(&self) -> Option<&CodeBlockDescriptor> {
        self.nodes
            .iter()
            .rev()
            .flat_map(|node| node.code_blocks.iter().rev())
            .next()
    }

    /// Render the whole conversation as a standalone HTML transcript.
    /// Thinking placeholders are transient UI state and are skipped.
    pub fn to_html(&self) -> String {
        let mut out = String::from(
            "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
             <title>Smitty transcript</title></head><body class=\"chat\">\n",
        );
        for node in &self.nodes {
            if node.role == Role::Thinking {
                continue;
            }
            let desc = node.role.descriptor();
            let content = if desc.markup {
                node.rendered_html.clone()
            } else {
                markup::escape_html(&node.raw_text)
            };
            out.push_str(&format!(
                "<div class=\"message {}\"><div class=\"message-header\">\
                 <span class=\"icon\">{}</span><span class=\"name\">{}</span></div>\
                 <div class=\"message-content\">{}</div></div>\n",
                desc.class, desc.icon, desc.label, content
            ));
        }
        out.push_str("</body></html>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_content_is_not_interpreted_as_markup() {
        let mut conv = Conversation::new();
        let idx = conv.append(Role::User, "**hi** <b>").unwrap();
        let node = &conv.nodes()[idx];
        assert_eq!(node.rendered_html, "");
        assert_eq!(node.raw_text, "**hi** <b>");
        assert!(conv.to_html().contains("**hi** &lt;b&gt;"));
    }

    #[test]
    fn assistant_content_goes_through_the_pipeline() {
        let mut conv = Conversation::new();
        let idx = conv.append(Role::Assistant, "**hi**").unwrap();
        let node = &conv.nodes()[idx];
        assert_eq!(node.rendered_html, "<strong>hi</strong>");
        assert!(node.complete);
    }

    #[test]
    fn streaming_append_is_incomplete_until_finalized() {
        let mut conv = Conversation::new();
        let idx = conv.append_streaming(Role::Assistant, "partial").unwrap();
        assert!(!conv.nodes()[idx].complete);
        conv.finalize(idx);
        assert!(conv.nodes()[idx].complete);
    }

    #[test]
    fn finalize_highlights_code_blocks() {
        let mut conv = Conversation::new();
        let idx = conv
            .append_streaming(Role::Assistant, "```python\nprint(1)\n```")
            .unwrap();
        conv.finalize(idx);

        let node = &conv.nodes()[idx];
        assert!(node
            .rendered_html
            .contains("<span class=\"token function\">print</span>("));
        assert!(node.rendered_html.contains("<span class=\"line-number\">1</span>"));
        assert!(!node.rendered_html.contains("token keyword"));
    }

    #[test]
    fn update_rerenders_from_cumulative_text() {
        let mut conv = Conversation::new();
        let idx = conv.append_streaming(Role::Assistant, "hel").unwrap();
        conv.update_assistant(idx, "hello **world**").unwrap();
        let node = &conv.nodes()[idx];
        assert_eq!(node.raw_text, "hello **world**");
        assert_eq!(node.rendered_html, "hello <strong>world</strong>");
    }

    #[test]
    fn remove_thinking_only_drops_placeholders() {
        let mut conv = Conversation::new();
        conv.append(Role::User, "hi").unwrap();
        conv.append(Role::Thinking, "").unwrap();
        conv.append(Role::Thinking, "").unwrap();
        conv.remove_thinking();
        assert_eq!(conv.nodes().len(), 1);
        assert_eq!(conv.nodes()[0].role, Role::User);
    }

    #[test]
    fn code_blocks_are_addressable_by_id() {
        let mut conv = Conversation::new();
        conv.append(Role::Assistant, "```\nfirst\n```").unwrap();
        conv.append(Role::Assistant, "```\nsecond\n```").unwrap();

        let last = conv.last_code_block().expect("a code block");
        assert_eq!(last.content, "second");
        let by_id = conv.find_code_block(&last.id).expect("lookup by id");
        assert_eq!(by_id.content, "second");
    }

    #[test]
    fn transcript_skips_thinking_placeholders() {
        let mut conv = Conversation::new();
        conv.append(Role::User, "hi").unwrap();
        conv.append(Role::Thinking, "").unwrap();
        let html = conv.to_html();
        assert!(!html.contains("thinking-message"));
        assert!(html.contains("user-message"));
    }
}
