use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use veritai_core::{ChatRole, Provider, SessionState, SourceKind};
use crate::app::{App, InputMode, Screen, SourceField};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
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
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

/// Visible window of a single-line input that keeps the cursor in view.
fn visible_input(input: &str, cursor: usize, width: usize) -> (String, usize) {
    let scroll_offset = if width == 0 || cursor < width {
        0
    } else {
        cursor - width + 1
    };
    let text = input.chars().skip(scroll_offset).take(width).collect();
    (text, cursor - scroll_offset)
}

fn mask_key(key: &str) -> String {
    let char_count = key.chars().count();
    if char_count <= 4 {
        return "*".repeat(char_count);
    }
    let masked_len = char_count - 4;
    let last_four: String = key.chars().skip(masked_len).collect();
    format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    )
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, status, footer
    let [header_area, body_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Source => render_source_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_status(app, frame, status_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    } else if app.show_provider_picker {
        render_provider_picker(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let source = match app.session.source() {
        Some(source) => format!(" {}: {}", source.kind.display_name(), source.label),
        None => " no document loaded".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(" VeritAI ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(source, Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let line = if app.load_task.is_some() {
        let dots = ".".repeat(app.animation_frame as usize + 1);
        Line::from(Span::styled(
            format!(" Loading source{}", dots),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        ))
    } else if let Some(status) = &app.status {
        let color = if status.is_error { Color::Red } else { Color::Green };
        Line::from(Span::styled(format!(" {}", status.text), Style::default().fg(color)))
    } else {
        Line::default()
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Source => " SOURCE ",
        Screen::Chat => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let keys: Vec<(&str, &str)> = match (app.screen, app.input_mode) {
        (Screen::Source, InputMode::Normal) => {
            let mut keys = vec![(" j/k ", " source "), (" Enter ", " edit ")];
            if app.session.can_chat() {
                keys.push((" Tab ", " chat "));
            }
            keys.extend([(" P ", " provider "), (" M ", " model "), (" q ", " quit ")]);
            keys
        }
        (Screen::Source, InputMode::Editing) => {
            let mut keys = vec![(" Enter ", " load ")];
            if app.selected_kind() == SourceKind::YouTube {
                keys.push((" Tab ", " language "));
            }
            keys.push((" Esc ", " done "));
            keys
        }
        (Screen::Chat, InputMode::Normal) => {
            let mut keys = vec![(" i ", " ask "), (" j/k ", " scroll ")];
            if app.session.state() == SessionState::AwaitingReply && !app.query_loading {
                keys.push((" r ", " retry "));
            }
            keys.extend([
                (" n ", " new chat "),
                (" s ", " source "),
                (" P ", " provider "),
                (" M ", " model "),
                (" q ", " quit "),
            ]);
            keys
        }
        (Screen::Chat, InputMode::Editing) => vec![(" Enter ", " send "), (" Esc ", " done ")],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in keys {
        spans.push(Span::styled(key, key_style));
        spans.push(Span::styled(label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_source_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, form_area] = Layout::horizontal([
        Constraint::Length(24),
        Constraint::Min(0),
    ])
    .areas(area);

    let list_focused = app.input_mode == InputMode::Normal;
    let items: Vec<ListItem> = SourceKind::all()
        .iter()
        .enumerate()
        .map(|(i, kind)| ListItem::new(format!(" {}. {} ", i + 1, kind.display_name())))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(if list_focused { Color::Cyan } else { Color::DarkGray }))
                .title(" Source "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.source_state);

    let kind = app.selected_kind();
    let show_language = kind == SourceKind::YouTube;
    let [locator_area, language_area, info_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(if show_language { 3 } else { 0 }),
        Constraint::Min(0),
    ])
    .areas(form_area);

    let editing = app.input_mode == InputMode::Editing;
    render_input_field(
        frame,
        locator_area,
        kind.locator_prompt(),
        &app.locator_input,
        app.locator_cursor,
        editing && app.source_field == SourceField::Locator,
    );
    if show_language {
        render_input_field(
            frame,
            language_area,
            "Transcript language",
            &app.language_input,
            app.language_cursor,
            editing && app.source_field == SourceField::Language,
        );
    }

    render_document_info(app, frame, info_area);
}

fn render_input_field(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    input: &str,
    cursor: usize,
    active: bool,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if active { Color::Yellow } else { Color::DarkGray }))
        .title(format!(" {} ", title));

    let inner_width = area.width.saturating_sub(2) as usize;
    let (visible_text, cursor_x) = visible_input(input, cursor, inner_width);
    frame.render_widget(
        Paragraph::new(visible_text)
            .style(Style::default().fg(Color::Cyan))
            .block(block),
        area,
    );

    if active {
        frame.set_cursor_position((area.x + cursor_x as u16 + 1, area.y + 1));
    }
}

fn render_document_info(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Document ");

    let label_style = Style::default().fg(Color::DarkGray);
    let mut lines: Vec<Line> = match (app.session.state(), app.session.document()) {
        (SessionState::NotLoaded, _) => vec![
            Line::from("Pick a source, press Enter, type its location and press Enter again."),
            Line::default(),
            Line::from(Span::styled("Websites and YouTube need a full URL. PDFs take a file path.", label_style)),
        ],
        (_, Some(document)) => {
            let mut lines = Vec::new();
            if let Some(source) = app.session.source() {
                lines.push(Line::from(vec![
                    Span::styled("Source:     ", label_style),
                    Span::raw(source.label.clone()),
                ]));
            }
            lines.push(Line::from(vec![
                Span::styled("Characters: ", label_style),
                Span::raw(document.char_count().to_string()),
            ]));
            lines.push(Line::from(vec![
                Span::styled("Messages:   ", label_style),
                Span::raw(app.session.transcript().len().to_string()),
            ]));
            lines.push(Line::default());
            let preview: String = document.text().chars().take(400).collect();
            lines.push(Line::from(Span::styled(preview, Style::default().fg(Color::Gray))));
            lines
        }
        (_, None) => vec![Line::from(Span::styled(
            "No document available. Chat is disabled until a source loads.",
            Style::default().fg(Color::Yellow),
        ))],
    };

    if let Some(err) = app.session.last_load_error() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("Last load failed: {}", err),
            Style::default().fg(Color::Red),
        )));
    }

    let info = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(info, area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.query_chat_height = chat_area.height.saturating_sub(2);
    app.query_chat_width = chat_area.width.saturating_sub(2);

    let chat_focused = app.input_mode == InputMode::Normal;
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if chat_focused { Color::Cyan } else { Color::DarkGray }))
        .title(format!(" {}: {} ", app.current_provider.short_name(), app.selected_model));

    let messages = app.session.transcript().messages();
    let chat_text = if messages.is_empty() && !app.query_loading {
        Text::from(Span::styled(
            "Ask a question about the document...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in messages {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.clone()));
                    lines.push(Line::default());
                }
                ChatRole::Assistant | ChatRole::System => {
                    lines.push(Line::from(Span::styled(
                        "VeritAI:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                    lines.push(Line::default());
                }
            }
        }

        if app.query_loading {
            lines.push(Line::from(Span::styled(
                "VeritAI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else if app.session.state() == SessionState::AwaitingReply {
            lines.push(Line::from(Span::styled(
                "No reply yet. Press r to retry.",
                Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.query_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input_field(
        frame,
        input_area,
        "Ask (i to type, Enter to send)",
        &app.query_input,
        app.query_cursor,
        app.input_mode == InputMode::Editing,
    );
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 44, app.available_models.len() as u16 + 2);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn render_provider_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let providers = Provider::all();
    let popup_area = centered(area, 45, providers.len() as u16 + 2);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Provider ");

    let items: Vec<ListItem> = providers
        .iter()
        .map(|provider| {
            let key_source = app.config.key_source(*provider);
            let is_current = *provider == app.current_provider;

            let status = match key_source {
                Some("env") => "(env var)",
                Some("config") => "(configured)",
                Some("local") => "(local)",
                _ => "(needs key)",
            };
            let prefix = if is_current { "* " } else { "  " };

            let style = if is_current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if key_source.is_some() {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(format!("{}{} {}", prefix, provider.display_name(), status)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.provider_picker_state);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let provider_name = app.api_key_target_provider
        .map(|p| p.display_name())
        .unwrap_or("Provider");

    let popup_area = centered(area, 60, 7);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" Enter API Key for {} ", provider_name));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your API key below. Press Enter to save, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    frame.render_widget(
        Paragraph::new(mask_key(&app.api_key_input)).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    let cursor_x = app.api_key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let char_count = format!("{} characters", app.api_key_input.chars().count());
    frame.render_widget(
        Paragraph::new(char_count).style(Style::default().fg(Color::DarkGray)),
        Rect::new(inner.x, inner.y + 4, inner.width, 1),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use veritai_core::{Config, Document, SourceKind};

    #[test]
    fn test_parse_markdown_bold() {
        let line = parse_markdown_line("The **answer** is here");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "answer");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));

        let unclosed = parse_markdown_line("a **b");
        assert_eq!(unclosed.spans.len(), 1);
        assert_eq!(unclosed.spans[0].content, "a **b");
    }

    #[test]
    fn test_mask_key_keeps_last_four() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key("gsk_12345678"), "********...5678");
    }

    #[test]
    fn test_visible_input_scrolls_with_cursor() {
        assert_eq!(visible_input("hello", 2, 10), ("hello".to_string(), 2));
        assert_eq!(visible_input("abcdefghij", 10, 4), ("hij".to_string(), 3));
    }

    #[tokio::test]
    async fn test_render_both_screens() {
        let mut app = App::new(Config::new(), Provider::Ollama, "gemma3:latest".into());
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        app.finish_load(crate::app::LoadOutcome {
            kind: SourceKind::Website,
            label: "https://example.com".into(),
            result: Ok(Document::from_fragments(["Hello World"]).unwrap()),
        });
        app.show_provider_picker = true;
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let buffer = terminal.backend().buffer();
        let content: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(content.contains("VeritAI"));
        assert!(content.contains("Select Provider"));
    }
}
