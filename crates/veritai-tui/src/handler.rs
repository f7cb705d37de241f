use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use veritai_core::SourceKind;
use crate::app::{App, InputMode, Screen, SourceField};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Apply a cursor-editing key to a single-line input. Returns false for keys
/// that are not editing keys.
fn edit_text(input: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < input.chars().count() {
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(input.chars().count()),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = input.chars().count(),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            input.clear();
            *cursor = 0;
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(input, *cursor);
            input.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_tasks().await;
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.show_api_key_input {
        handle_api_key_input(app, key).await;
        return Ok(());
    }
    if app.show_provider_picker {
        handle_provider_picker(app, key).await;
        return Ok(());
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return Ok(());
    }

    match (app.screen, app.input_mode) {
        (Screen::Source, InputMode::Normal) => handle_source_normal(app, key).await,
        (Screen::Source, InputMode::Editing) => handle_source_editing(app, key),
        (Screen::Chat, InputMode::Normal) => handle_chat_normal(app, key).await,
        (Screen::Chat, InputMode::Editing) => handle_chat_editing(app, key),
    }

    Ok(())
}

async fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_api_key_input(),
        KeyCode::Enter => app.submit_api_key().await,
        _ => {
            edit_text(&mut app.api_key_input, &mut app.api_key_input_cursor, key);
        }
    }
}

async fn handle_provider_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_provider_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.provider_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.provider_picker_nav_up(),
        KeyCode::Enter => app.choose_provider().await,
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

/// Keys shared by both screens in normal mode. Returns true when handled.
async fn handle_common_normal(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('P') | KeyCode::Char('M') if app.is_busy() => {
            app.set_error("Wait for the current request to finish.");
        }
        KeyCode::Char('P') => app.open_provider_picker(),
        KeyCode::Char('M') => app.open_model_picker().await,
        _ => return false,
    }
    true
}

async fn handle_source_normal(app: &mut App, key: KeyEvent) {
    if handle_common_normal(app, key).await {
        return;
    }

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.source_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.source_nav_up(),
        KeyCode::Char('1') => app.source_state.select(Some(0)),
        KeyCode::Char('2') => app.source_state.select(Some(1)),
        KeyCode::Char('3') => app.source_state.select(Some(2)),
        KeyCode::Enter | KeyCode::Char('i') => {
            app.source_field = SourceField::Locator;
            app.locator_cursor = app.locator_input.chars().count();
            app.input_mode = InputMode::Editing;
        }
        // Back to the conversation without reloading
        KeyCode::Tab | KeyCode::Esc => {
            if app.session.can_chat() {
                app.screen = Screen::Chat;
            }
        }
        _ => {}
    }
}

fn handle_source_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.start_load(),
        KeyCode::Tab => {
            if app.selected_kind() == SourceKind::YouTube {
                app.source_field = match app.source_field {
                    SourceField::Locator => SourceField::Language,
                    SourceField::Language => SourceField::Locator,
                };
            }
        }
        _ => {
            match app.source_field {
                SourceField::Locator => edit_text(&mut app.locator_input, &mut app.locator_cursor, key),
                SourceField::Language => edit_text(&mut app.language_input, &mut app.language_cursor, key),
            };
        }
    }
}

async fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    if handle_common_normal(app, key).await {
        return;
    }

    match key.code {
        KeyCode::Esc | KeyCode::Char('s') => {
            app.screen = Screen::Source;
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter | KeyCode::Tab | KeyCode::Char('i') => {
            app.query_cursor = app.query_input.chars().count();
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('j') | KeyCode::Down => app.query_scroll = app.query_scroll.saturating_add(1),
        KeyCode::Char('k') | KeyCode::Up => app.query_scroll = app.query_scroll.saturating_sub(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.query_scroll = app.query_scroll.saturating_add(app.query_chat_height / 2);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.query_scroll = app.query_scroll.saturating_sub(app.query_chat_height / 2);
        }
        KeyCode::Char('g') => app.query_scroll = 0,
        KeyCode::Char('G') => app.scroll_query_to_bottom(),
        KeyCode::Char('r') => app.retry(),
        KeyCode::Char('n') => app.new_conversation(),
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.send_message(),
        _ => {
            edit_text(&mut app.query_input, &mut app.query_cursor, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritai_core::{Config, Provider};

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_edit_text_handles_multibyte_chars() {
        let mut input = String::from("ação");
        let mut cursor = 2;

        assert!(edit_text(&mut input, &mut cursor, press(KeyCode::Backspace)));
        assert_eq!(input, "aão");
        assert_eq!(cursor, 1);

        edit_text(&mut input, &mut cursor, press(KeyCode::Char('ç')));
        assert_eq!(input, "ação");

        edit_text(&mut input, &mut cursor, press(KeyCode::End));
        edit_text(&mut input, &mut cursor, press(KeyCode::Delete));
        assert_eq!(input, "ação");
        assert_eq!(cursor, 4);

        assert!(!edit_text(&mut input, &mut cursor, press(KeyCode::Tab)));
    }

    #[tokio::test]
    async fn test_language_field_only_for_youtube() {
        let mut app = App::new(Config::new(), Provider::Ollama, "m".into());
        app.input_mode = InputMode::Editing;

        handle_key(&mut app, press(KeyCode::Tab)).await.unwrap();
        assert_eq!(app.source_field, SourceField::Locator);

        app.source_state.select(Some(2));
        handle_key(&mut app, press(KeyCode::Tab)).await.unwrap();
        assert_eq!(app.source_field, SourceField::Language);

        handle_key(&mut app, press(KeyCode::Backspace)).await.unwrap();
        handle_key(&mut app, press(KeyCode::Backspace)).await.unwrap();
        handle_key(&mut app, press(KeyCode::Char('e'))).await.unwrap();
        handle_key(&mut app, press(KeyCode::Char('n'))).await.unwrap();
        assert_eq!(app.language_input, "en");
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_anywhere() {
        let mut app = App::new(Config::new(), Provider::Ollama, "m".into());
        app.input_mode = InputMode::Editing;
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        handle_key(&mut app, key).await.unwrap();
        assert!(app.should_quit);
    }
}
