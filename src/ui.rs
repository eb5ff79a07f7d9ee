use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::app::App;
use crate::conversation::Role;
use crate::persona::PERSONA;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' {
            // Check for ** (bold)
            if chars.peek().map(|(_, c)| *c) == Some('*') {
                chars.next();

                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }

                // Find closing **
                let mut bold_text = String::new();
                let mut found_close = false;

                while let Some((_, c)) = chars.next() {
                    if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                        chars.next();
                        found_close = true;
                        break;
                    }
                    bold_text.push(c);
                }

                if found_close && !bold_text.is_empty() {
                    spans.push(Span::styled(
                        bold_text,
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                } else {
                    // No closing **, treat as literal
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            } else {
                current_text.push(c);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn role_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        Role::Assistant => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        Role::System => Style::default().fg(Color::DarkGray),
        Role::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Role::Thinking => Style::default().fg(Color::DarkGray),
    }
}

/// Assistant text with fenced code rendered as a numbered box.
fn assistant_lines(text: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_fence = false;
    let mut code_line = 0usize;

    for raw in text.lines() {
        if let Some(rest) = raw.strip_prefix("```") {
            if in_fence {
                lines.push(Line::from(Span::styled(
                    "└──".to_string(),
                    Style::default().fg(Color::DarkGray),
                )));
                in_fence = false;
            } else {
                in_fence = true;
                code_line = 0;
                let label = if rest.trim().is_empty() {
                    "┌──".to_string()
                } else {
                    format!("┌── {}", rest.trim())
                };
                lines.push(Line::from(Span::styled(
                    label,
                    Style::default().fg(Color::DarkGray),
                )));
            }
            continue;
        }

        if in_fence {
            code_line += 1;
            lines.push(Line::from(vec![
                Span::styled(
                    format!("│{:>3} ", code_line),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(raw.to_string(), Style::default().fg(Color::Green)),
            ]));
        } else {
            lines.push(parse_markdown_line(raw));
        }
    }

    if in_fence {
        // Unterminated fence: close the box visually anyway.
        lines.push(Line::from(Span::styled(
            "└──".to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(frame, footer_area);
    render_toast(app, frame);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(
            format!(" {} ", PERSONA),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("({})", app.spark.model()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(title), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    // Store inner dimensions for scroll calculations (minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();
    for node in app.conversation.nodes() {
        let desc = node.role.descriptor();
        lines.push(Line::from(Span::styled(
            format!("{} {}", desc.icon, desc.label),
            role_style(node.role),
        )));

        if node.role == Role::Thinking {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("{} is thinking{}", PERSONA, dots),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        } else if node.role == Role::Assistant {
            lines.extend(assistant_lines(&node.raw_text));
        } else {
            for line in node.raw_text.lines() {
                lines.push(Line::from(Span::raw(line.to_string())));
            }
        }
        lines.push(Line::default());
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.waiting {
        Color::DarkGray
    } else {
        Color::Yellow
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message (Enter to send, Alt+Enter for newline) ");

    // Locate the cursor's line and column within the (possibly multi-line)
    // draft; only that line is shown, horizontally scrolled.
    let mut line_start = 0usize;
    let mut cursor_col = app.input_cursor;
    for line in app.input.split('\n') {
        let len = line.chars().count();
        if cursor_col <= len {
            break;
        }
        cursor_col -= len + 1;
        line_start += len + 1;
    }
    let current_line: String = app
        .input
        .chars()
        .skip(line_start)
        .take_while(|c| *c != '\n')
        .collect();

    // Horizontal scroll keeps the cursor visible.
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_col >= inner_width {
        cursor_col - inner_width + 1
    } else {
        0
    };

    let visible_text: String = current_line
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    let cursor_x = (cursor_col - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let help = Line::from(Span::styled(
        " Esc quit · ↑/↓ scroll · Ctrl+E export · Ctrl+B copy code ",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(help), area);
}

fn render_toast(app: &App, frame: &mut Frame) {
    let Some(toast) = &app.toast else {
        return;
    };

    let width = (toast.text.chars().count() as u16 + 4).min(frame.area().width);
    let height = 3;
    let x = frame.area().width.saturating_sub(width + 1);
    let y = frame.area().height.saturating_sub(height + 2);
    let area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let body = Paragraph::new(toast.text.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(block);
    frame.render_widget(body, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_markdown_becomes_a_styled_span() {
        let line = parse_markdown_line("say **hi** now");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "hi");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let line = parse_markdown_line("say **hi");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "say **hi");
    }

    #[test]
    fn fenced_code_gets_a_numbered_box() {
        let lines = assistant_lines("before\n```python\nprint(1)\nprint(2)\n```\nafter");
        let rendered: Vec<String> = lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert_eq!(rendered[0], "before");
        assert_eq!(rendered[1], "┌── python");
        assert!(rendered[2].starts_with("│  1 "));
        assert!(rendered[3].starts_with("│  2 "));
        assert_eq!(rendered[4], "└──");
        assert_eq!(rendered[5], "after");
    }

    #[test]
    fn unterminated_fence_still_closes_the_box() {
        let lines = assistant_lines("```\ncode");
        let last: String = lines
            .last()
            .unwrap()
            .spans
            .iter()
            .map(|s| s.content.as_ref())
            .collect();
        assert_eq!(last, "└──");
    }
}
