use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use unicode_width::UnicodeWidthChar;

use postfeed::models::Post;
use postfeed::session::FeedSession;

const TICK: Duration = Duration::from_millis(100);
const BODY_LINES: usize = 3;

/// Runs the interactive post list until the user quits
pub fn run_browser(mut session: FeedSession) -> Result<()> {
    session.load_initial();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = BrowserApp {
        session,
        selected: 0,
        mode: InputMode::Browsing,
    };

    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Browsing,
    Searching,
}

struct BrowserApp {
    session: FeedSession,
    selected: usize,
    mode: InputMode,
}

impl BrowserApp {
    /// Returns true when the user asked to quit
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match self.mode {
            InputMode::Searching => match code {
                KeyCode::Enter => self.mode = InputMode::Browsing,
                KeyCode::Esc => {
                    self.session.feed_mut().clear_query();
                    self.mode = InputMode::Browsing;
                    self.selected = 0;
                }
                KeyCode::Backspace => {
                    let mut query = self.session.feed().query().to_string();
                    query.pop();
                    self.session.feed_mut().set_query(query);
                    self.selected = 0;
                }
                KeyCode::Char(c) => {
                    let mut query = self.session.feed().query().to_string();
                    query.push(c);
                    self.session.feed_mut().set_query(query);
                    self.selected = 0;
                }
                _ => {}
            },
            InputMode::Browsing => match code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc => {
                    if self.session.feed().query().is_empty() {
                        return true;
                    }
                    self.session.feed_mut().clear_query();
                    self.selected = 0;
                }
                KeyCode::Char('/') => self.mode = InputMode::Searching,
                KeyCode::Char('r') => {
                    self.session.refresh();
                    self.selected = 0;
                }
                KeyCode::Char('j') | KeyCode::Down => self.select(self.selected.saturating_add(1)),
                KeyCode::Char('k') | KeyCode::Up => self.select(self.selected.saturating_sub(1)),
                KeyCode::PageDown | KeyCode::Char(' ') => self.select(self.selected + 10),
                KeyCode::PageUp => self.select(self.selected.saturating_sub(10)),
                KeyCode::Char('g') | KeyCode::Home => self.select(0),
                KeyCode::Char('G') | KeyCode::End => self.select(usize::MAX),
                _ => {}
            },
        }
        false
    }

    /// Moves the cursor, revealing the next page once it lands on the last row
    fn select(&mut self, index: usize) {
        let len = self.session.feed().visible_len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        self.selected = index.min(len - 1);
        if self.selected == len - 1 {
            self.session.feed_mut().load_more();
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.session.feed().visible_len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut BrowserApp,
) -> io::Result<()> {
    loop {
        if app.session.poll_completions() > 0 {
            app.clamp_selection();
        }

        terminal.draw(|f| ui(f, app))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && app.handle_key(key.code) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &BrowserApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Search
            Constraint::Min(5),    // Posts
            Constraint::Length(3), // Footer
        ])
        .split(f.size());

    render_search(f, chunks[0], app);
    render_posts(f, chunks[1], app);
    render_footer(f, chunks[2], app);
}

fn render_search(f: &mut Frame, area: Rect, app: &BrowserApp) {
    let feed = app.session.feed();

    let query_style = if app.mode == InputMode::Searching {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };
    let query_line = if feed.query().is_empty() && app.mode == InputMode::Browsing {
        Line::from(Span::styled(
            "Press / to search posts...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(vec![
            Span::raw("Search: "),
            Span::styled(feed.query().to_string(), query_style),
        ])
    };

    let status = match feed.match_count() {
        Some(count) => format!("Found {} posts", count),
        None if feed.is_initial_loading() => "Loading...".to_string(),
        None if feed.is_refreshing() => "Refreshing...".to_string(),
        None => match feed.last_fetched() {
            Some(at) => format!(
                "{} posts, updated {}",
                feed.all_items().len(),
                at.with_timezone(&chrono::Local).format("%H:%M:%S")
            ),
            None => String::new(),
        },
    };

    let search = Paragraph::new(vec![
        query_line,
        Line::from(Span::styled(status, Style::default().fg(Color::Gray))),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title(" Posts ")
            .title_alignment(Alignment::Center),
    );

    f.render_widget(search, area);
}

fn render_posts(f: &mut Frame, area: Rect, app: &BrowserApp) {
    let feed = app.session.feed();
    let block = Block::default()
        .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
        .border_style(Style::default().fg(Color::Gray));

    if let Some(empty) = feed.empty_state() {
        let message = Paragraph::new(empty.message())
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(block);
        f.render_widget(message, area);
        return;
    }

    let width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = feed
        .visible_items()
        .into_iter()
        .map(|post| post_item(post, width))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn post_item(post: &Post, width: usize) -> ListItem<'static> {
    let mut lines = vec![Line::from(Span::styled(
        truncate_to_width(&post.title, width),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];

    lines.extend(
        textwrap::wrap(&post.body, width.max(1))
            .into_iter()
            .take(BODY_LINES)
            .map(|l| Line::from(l.into_owned())),
    );

    lines.push(Line::from(Span::styled(
        format!("User ID: {}   Post ID: {}", post.author_id, post.id),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::default());

    ListItem::new(lines)
}

fn truncate_to_width(s: &str, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            out.pop();
            out.push('…');
            return out;
        }
        used += w;
        out.push(c);
    }
    out
}

fn render_footer(f: &mut Frame, area: Rect, app: &BrowserApp) {
    let feed = app.session.feed();
    let key = |k: &'static str| Span::styled(k, Style::default().bg(Color::DarkGray).fg(Color::White));

    let footer_text = if feed.is_loading_more() {
        Line::from(Span::styled("Loading more...", Style::default().fg(Color::Blue)))
    } else if let Some(err) = feed.last_error() {
        Line::from(vec![
            Span::styled(format!("✗ {}", err), Style::default().fg(Color::Red)),
            Span::raw("  "),
            key(" r "),
            Span::raw(" Retry "),
        ])
    } else if app.mode == InputMode::Searching {
        Line::from(vec![
            key(" Enter "),
            Span::raw(" Keep  "),
            key(" Esc "),
            Span::raw(" Clear  "),
        ])
    } else {
        Line::from(vec![
            key(" q "),
            Span::raw(" Quit  "),
            key(" / "),
            Span::raw(" Search  "),
            key(" r "),
            Span::raw(" Refresh  "),
            key(" j/k "),
            Span::raw(" Scroll  "),
        ])
    };

    let footer = Paragraph::new(footer_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
        )
        .alignment(Alignment::Center);

    f.render_widget(footer, area);
}
