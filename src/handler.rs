use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::App;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key)?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        // Redraw happens on the next pass of the UI loop anyway.
        AppEvent::Redraw => {}
        AppEvent::Tick => {
            app.tick();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.quit();
                return Ok(());
            }
            KeyCode::Char('u') => {
                app.scroll_up(5);
                return Ok(());
            }
            KeyCode::Char('d') => {
                app.scroll_down(5);
                return Ok(());
            }
            KeyCode::Char('e') => {
                match app.export_transcript() {
                    Ok(path) => app.show_toast(format!("Saved {}", path.display())),
                    Err(err) => app.show_toast(format!("Export failed: {}", err)),
                }
                return Ok(());
            }
            KeyCode::Char('b') => {
                let code = app
                    .conversation
                    .last_code_block()
                    .map(|block| block.content.clone());
                match code {
                    Some(code) => {
                        copy_to_clipboard(&code);
                        app.show_toast("Code copied.");
                    }
                    None => app.show_toast("No code block yet."),
                }
                return Ok(());
            }
            _ => {}
        }
    }

    match key.code {
        KeyCode::Esc => {
            app.quit();
        }
        KeyCode::Enter => {
            // Shift/Alt+Enter inserts a newline instead of sending.
            if key.modifiers.contains(KeyModifiers::SHIFT)
                || key.modifiers.contains(KeyModifiers::ALT)
            {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.insert(byte_pos, '\n');
                app.input_cursor += 1;
            } else {
                app.submit()?;
            }
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Up => {
            app.scroll_up(1);
        }
        KeyCode::Down => {
            app.scroll_down(1);
        }
        KeyCode::PageUp => {
            app.scroll_up(10);
        }
        KeyCode::PageDown => {
            app.scroll_down(10);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
    Ok(())
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}

fn copy_to_clipboard(text: &str) {
    use std::process::{Command, Stdio};
    use std::io::Write;

    // Try the platform clipboards in order; silently give up if none exist.
    for cmd in [&["pbcopy"][..], &["xclip", "-selection", "clipboard"][..], &["wl-copy"][..]] {
        if let Ok(mut child) = Command::new(cmd[0])
            .args(&cmd[1..])
            .stdin(Stdio::piped())
            .spawn()
        {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ClientEvent;
    use tokio::sync::mpsc;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel::<ClientEvent>();
        let spark = crate::spark::SparkClient::new("http://127.0.0.1:8000", "spark-lite", tx.clone());
        App::new(spark, tx, std::path::PathBuf::from("/tmp/smitty-test.html"))
    }

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn char_index_handles_multibyte_text() {
        let s = "你好ab";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 3);
        assert_eq!(char_to_byte_index(s, 2), 6);
        assert_eq!(char_to_byte_index(s, 4), s.len());
    }

    #[test]
    fn typing_inserts_at_the_cursor() {
        let mut app = test_app();
        handle_event(&mut app, press(KeyCode::Char('a'))).unwrap();
        handle_event(&mut app, press(KeyCode::Char('c'))).unwrap();
        handle_event(&mut app, press(KeyCode::Left)).unwrap();
        handle_event(&mut app, press(KeyCode::Char('b'))).unwrap();
        assert_eq!(app.input, "abc");
        assert_eq!(app.input_cursor, 2);
    }

    #[test]
    fn backspace_removes_whole_characters() {
        let mut app = test_app();
        app.input = "你好".to_string();
        app.input_cursor = 2;
        handle_event(&mut app, press(KeyCode::Backspace)).unwrap();
        assert_eq!(app.input, "你");
        assert_eq!(app.input_cursor, 1);
    }

    #[test]
    fn alt_enter_inserts_a_newline() {
        let mut app = test_app();
        app.input = "ab".to_string();
        app.input_cursor = 2;
        handle_event(
            &mut app,
            AppEvent::Key(KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT)),
        )
        .unwrap();
        assert_eq!(app.input, "ab\n");
        assert!(!app.waiting);
    }

    #[test]
    fn escape_quits() {
        let mut app = test_app();
        handle_event(&mut app, press(KeyCode::Esc)).unwrap();
        assert!(app.should_quit);
    }
}
