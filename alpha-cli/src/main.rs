mod animator;
mod client;
mod controller;
mod teach;
mod transcript;

use alpha_shared::{MessageRole, PROFILES};
use anyhow::Result;
use client::{DEFAULT_BACKEND_URL, HttpRelay};
use controller::{Activity, InputBox, InputController, NoticeKind};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teach::{FileStorage, TeachStore};
use tokio::sync::mpsc;
use tracing::{error, info};
use transcript::EntryState;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const WELCOME: &str = "Welcome to Alpha AI! 👋 I'm here to help you with anything. \
Press Ctrl-P to pick a profile for more personalized responses.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeachField {
    Question,
    AnswerType,
    Answer,
}

impl TeachField {
    fn next(self) -> Self {
        match self {
            TeachField::Question => TeachField::AnswerType,
            TeachField::AnswerType => TeachField::Answer,
            TeachField::Answer => TeachField::Question,
        }
    }

    fn previous(self) -> Self {
        self.next().next()
    }
}

struct TeachForm {
    question: String,
    answer: String,
    answer_type: usize,
    focus: TeachField,
    /// Answer types already saved for `question`, refreshed when it changes.
    taught: String,
}

impl TeachForm {
    fn new() -> Self {
        Self {
            question: String::new(),
            answer: String::new(),
            answer_type: 0,
            focus: TeachField::Question,
            taught: String::new(),
        }
    }

    fn answer_type(&self) -> &'static str {
        PROFILES[self.answer_type]
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            TeachField::Question => Some(&mut self.question),
            TeachField::Answer => Some(&mut self.answer),
            TeachField::AnswerType => None,
        }
    }
}

struct App {
    controller: InputController,
    teach_store: TeachStore,
    teach_form: Option<TeachForm>,
    scroll_offset: usize,
}

impl App {
    fn new(controller: InputController, teach_store: TeachStore) -> Self {
        let mut app = Self {
            controller,
            teach_store,
            teach_form: None,
            scroll_offset: 0,
        };
        app.controller.welcome(WELCOME);
        app
    }

    fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    fn open_teach_form(&mut self) {
        self.teach_form = Some(TeachForm::new());
    }

    fn close_teach_form(&mut self) {
        self.teach_form = None;
    }

    fn refresh_taught_summary(&mut self) {
        let Some(form) = self.teach_form.as_mut() else {
            return;
        };
        form.taught.clear();
        if form.question.trim().is_empty() {
            return;
        }

        match self.teach_store.lookup(&form.question) {
            Ok(Some(answers)) => {
                form.taught = answers.keys().cloned().collect::<Vec<_>>().join(", ");
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to read teach notes: {}", e);
                self.controller.notify(e.to_string(), NoticeKind::Error);
            }
        }
    }

    fn save_teaching(&mut self) {
        let Some(form) = &self.teach_form else {
            return;
        };

        match self
            .teach_store
            .save(&form.question, form.answer_type(), &form.answer)
        {
            Ok(()) => {
                self.controller
                    .notify("Response saved successfully!", NoticeKind::Success);
                self.close_teach_form();
            }
            Err(e) => {
                error!("Failed to save teach note: {}", e);
                self.controller.notify(e.to_string(), NoticeKind::Error);
            }
        }
    }

    /// Returns `false` when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(code, KeyCode::Char('q') | KeyCode::Char('c')) {
            return false;
        }

        if self.teach_form.is_some() {
            self.handle_teach_key(code);
            return true;
        }

        match code {
            KeyCode::Char('p') if ctrl => {
                let profile = self.controller.cycle_profile();
                info!("Profile switched to {}", profile);
            }
            KeyCode::Char('t') if ctrl => self.open_teach_form(),
            KeyCode::Char('l') if ctrl => {
                self.controller.clear_transcript();
                self.scroll_to_bottom();
            }
            KeyCode::Char(c) if !ctrl => {
                if let Some(input) = self.controller.input_mut() {
                    input.insert(c);
                }
            }
            KeyCode::Backspace => {
                if let Some(input) = self.controller.input_mut() {
                    input.backspace();
                }
            }
            KeyCode::Left => {
                if let Some(input) = self.controller.input_mut() {
                    input.move_left();
                }
            }
            KeyCode::Right => {
                if let Some(input) = self.controller.input_mut() {
                    input.move_right();
                }
            }
            KeyCode::Home => {
                if let Some(input) = self.controller.input_mut() {
                    input.home();
                }
            }
            KeyCode::End => {
                if let Some(input) = self.controller.input_mut() {
                    input.end();
                }
            }
            KeyCode::Enter => {
                if self.controller.send().is_some() {
                    self.scroll_to_bottom();
                }
            }
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(10),
            KeyCode::PageDown => self.scroll_down(10),
            _ => {}
        }
        true
    }

    fn handle_teach_key(&mut self, code: KeyCode) {
        let Some(form) = self.teach_form.as_mut() else {
            return;
        };

        let edits_question = form.focus == TeachField::Question;
        let mut edited = false;

        match code {
            KeyCode::Esc => self.close_teach_form(),
            KeyCode::Enter => self.save_teaching(),
            KeyCode::Tab | KeyCode::Down => form.focus = form.focus.next(),
            KeyCode::BackTab | KeyCode::Up => form.focus = form.focus.previous(),
            KeyCode::Left if form.focus == TeachField::AnswerType => {
                form.answer_type = (form.answer_type + PROFILES.len() - 1) % PROFILES.len();
            }
            KeyCode::Right | KeyCode::Char(' ') if form.focus == TeachField::AnswerType => {
                form.answer_type = (form.answer_type + 1) % PROFILES.len();
            }
            KeyCode::Char(c) => {
                if let Some(text) = form.focused_text() {
                    text.push(c);
                    edited = true;
                }
            }
            KeyCode::Backspace => {
                if let Some(text) = form.focused_text() {
                    edited = text.pop().is_some();
                }
            }
            _ => {}
        }

        if edited && edits_question {
            self.refresh_taught_summary();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to file instead of terminal to avoid corrupting TUI
    let log_file = std::fs::File::create("alpha-cli.log").ok();
    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    }
    dotenv::dotenv().ok();

    let backend_url =
        std::env::var("ALPHA_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
    let relay = HttpRelay::new(&backend_url)?;
    info!("Relay endpoint: {}", relay.endpoint());

    let teach_path = std::env::var("ALPHA_TEACH_FILE")
        .ok()
        .map(PathBuf::from)
        .or_else(FileStorage::default_path)
        .unwrap_or_else(|| PathBuf::from(format!("{}.json", teach::STORAGE_KEY)));
    let storage = FileStorage::new(teach_path);
    info!("Teach notes stored at {:?}", storage.path());
    let teach_store = TeachStore::new(Box::new(storage));

    let controller = InputController::new(Arc::new(relay), animator::DEFAULT_CADENCE);
    let mut app = App::new(controller, teach_store);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if ui_tx.send(event).is_err() {
                break;
            }
        }
    });

    let res = run_app(&mut terminal, &mut app, &mut ui_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    ui_rx: &mut mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    let mut housekeeping = tokio::time::interval(Duration::from_millis(250));

    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            Some(event) = ui_rx.recv() => {
                match event {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if !app.handle_key(key.code, key.modifiers) {
                            return Ok(());
                        }
                    }
                    Event::Mouse(mouse) => {
                        match mouse.kind {
                            event::MouseEventKind::ScrollUp => app.scroll_up(3),
                            event::MouseEventKind::ScrollDown => app.scroll_down(3),
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            Some(event) = app.controller.next_event() => {
                app.controller.handle(event);
                // Auto-scroll to bottom while a reply is revealed
                app.scroll_to_bottom();
            }
            _ = housekeeping.tick() => {
                app.controller.expire_notice(Instant::now());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Profile and status
            Constraint::Min(1),    // Chat area takes remaining space
            Constraint::Length(1), // Notice
            Constraint::Length(3), // Input box
        ])
        .split(area);

    render_status(f, app, chunks[0]);
    render_chat(f, app, chunks[1]);
    render_notice(f, app, chunks[2]);
    render_input(f, app, chunks[3]);

    if let Some(form) = &app.teach_form {
        render_teach_form(f, form, area);
    }
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let (status_text, status_color) = match app.controller.activity() {
        Activity::Idle => ("● Ready", Color::Green),
        Activity::AwaitingReply => ("● Waiting for reply...", Color::Yellow),
        Activity::Revealing => ("● Typing...", Color::Yellow),
    };

    let line = Line::from(vec![
        Span::styled("Alpha AI", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  profile: "),
        Span::styled(app.controller.profile(), Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::styled(
            format!("  {} messages", app.controller.transcript().len()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

/// Breaks `text` into rows no wider than `width` terminal columns.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for line in text.lines() {
        let mut row = String::new();
        let mut row_width = 0;
        for c in line.chars() {
            let w = c.width().unwrap_or(0);
            if row_width + w > width && !row.is_empty() {
                rows.push(std::mem::take(&mut row));
                row_width = 0;
            }
            row.push(c);
            row_width += w;
        }
        rows.push(row);
    }
    rows
}

/// Every transcript row as it will appear on screen, already wrapped.
fn chat_rows(app: &App, width: usize) -> Vec<Line<'static>> {
    let mut rows: Vec<Line> = Vec::new();

    if app.controller.transcript().is_empty() {
        rows.push(Line::from(Span::styled(
            "Conversation cleared. Ask me anything.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for msg in app.controller.transcript().entries() {
        let (prefix, style) = match (msg.role, msg.state) {
            (_, EntryState::Failed) => ("Alpha AI", Style::default().fg(Color::Red)),
            (MessageRole::User, _) => ("You", Style::default().fg(Color::Cyan)),
            (MessageRole::Assistant, _) => ("Alpha AI", Style::default().fg(Color::Green)),
        };

        // header is short and gets truncated rather than wrapped
        rows.push(Line::from(vec![
            Span::styled(format!("{}:", prefix), style.add_modifier(Modifier::BOLD)),
            Span::styled(
                format!(" {}", msg.created_at.format("%H:%M")),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

        let content = match msg.state {
            EntryState::Pending => "●●●".to_string(),
            EntryState::Revealing(_) if !msg.is_fully_rendered() => {
                format!("{}▌", msg.visible_text())
            }
            EntryState::Revealing(_) | EntryState::Settled | EntryState::Failed => {
                msg.visible_text().to_string()
            }
        };
        for row in wrap_text(&content, width) {
            rows.push(Line::from(Span::styled(row, style)));
        }

        rows.push(Line::from(""));
    }

    rows
}

fn render_chat(f: &mut Frame, app: &App, area: Rect) {
    let all_lines = chat_rows(app, area.width as usize);

    let total_lines = all_lines.len();
    let visible_height = area.height as usize;

    let start_line = if total_lines > visible_height {
        let max_scroll = total_lines.saturating_sub(visible_height);
        let actual_scroll = app.scroll_offset.min(max_scroll);
        max_scroll.saturating_sub(actual_scroll)
    } else {
        0
    };

    let end_line = (start_line + visible_height).min(total_lines);
    let visible_lines: Vec<Line> = all_lines[start_line..end_line].to_vec();

    let chat = Paragraph::new(visible_lines).block(Block::default().borders(Borders::NONE));

    f.render_widget(chat, area);
}

fn render_notice(f: &mut Frame, app: &App, area: Rect) {
    let Some(notice) = app.controller.notice() else {
        return;
    };

    let color = match notice.kind {
        NoticeKind::Success => Color::Green,
        NoticeKind::Error => Color::Red,
    };
    let notice = Paragraph::new(notice.message.as_str()).style(Style::default().fg(color));
    f.render_widget(notice, area);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let input = app.controller.input();
    let enabled = !app.controller.is_busy();

    let (input_text, style) = if !enabled {
        ("Waiting for Alpha AI...", Style::default().fg(Color::DarkGray))
    } else if input.is_empty() {
        ("Type your message...", Style::default().fg(Color::DarkGray))
    } else {
        (input.text(), Style::default())
    };

    let widget = Paragraph::new(input_text)
        .style(style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Input (Enter send, Ctrl-P profile, Ctrl-T teach, Ctrl-L clear, Ctrl-Q quit)")
                .border_style(Style::default().fg(if enabled { Color::White } else { Color::DarkGray })),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(widget, area);

    if enabled && app.teach_form.is_none() {
        let cursor_x = area
            .x
            .saturating_add(cursor_column(input))
            .saturating_add(1);
        let cursor_y = area.y + 1;
        f.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), cursor_y));
    }
}

/// Display column of the input cursor, counting wide characters as two.
fn cursor_column(input: &InputBox) -> u16 {
    let before: String = input.text().chars().take(input.cursor()).collect();
    u16::try_from(before.width()).unwrap_or(u16::MAX)
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn render_teach_form(f: &mut Frame, form: &TeachForm, area: Rect) {
    let popup = centered(area, 64, 12);
    f.render_widget(Clear, popup);

    let field_style = |field: TeachField| {
        if form.focus == field {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    };

    let lines = vec![
        Line::from(Span::styled("Question:", field_style(TeachField::Question))),
        Line::from(form.question.as_str()),
        Line::from(vec![
            Span::styled("Answer type: ", field_style(TeachField::AnswerType)),
            Span::raw(format!("< {} >", form.answer_type())),
        ]),
        Line::from(Span::styled("Answer:", field_style(TeachField::Answer))),
        Line::from(form.answer.as_str()),
        Line::from(""),
        Line::from(Span::styled(
            if form.taught.is_empty() {
                String::new()
            } else {
                format!("Already taught: {}", form.taught)
            },
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Tab next field, ←/→ answer type, Enter save, Esc close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Teach Alpha AI"))
        .wrap(Wrap { trim: false });
    f.render_widget(widget, popup);
}
