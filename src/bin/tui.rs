use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind}, execute, terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{backend::CrosstermBackend, Frame, Terminal, widgets::{Block, Borders, List, ListItem, Paragraph, ListState, Wrap}, layout::{Layout, Constraint, Direction}, style::{Style, Modifier, Color}};
use tracing_subscriber::EnvFilter;

use todos::{
    config::{prepare_sqlite_file, AppConfig},
    domain::repository::KeyValueStore,
    infrastructure::sqlite_kv::SqliteKeyValueStore,
    Priority, TodoDraft, TodoError, TodoId, TodoItem, TodoStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env();
    init_tracing(&config.log_file)?;

    prepare_sqlite_file(&config.database_url)?;
    let kv = SqliteKeyValueStore::connect(&config.database_url).await?;
    kv.init().await?;
    let store = TodoStore::open(kv, config.write_policy).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, App::new(store, config.database_url.clone())).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    res
}

/// The terminal belongs to the UI, so logs go to a file.
fn init_tracing(path: &Path) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode { View, Create, Edit }

#[derive(Clone, Copy, PartialEq, Eq)]
enum Filter { All, Pending, Done }

impl Filter {
    fn label(self) -> &'static str { match self { Filter::All => "All", Filter::Pending => "Pending", Filter::Done => "Done" } }
    fn admits(self, item: &TodoItem) -> bool {
        match self { Filter::All => true, Filter::Pending => !item.completed, Filter::Done => item.completed }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ActiveField { Title, Description, Priority }

impl ActiveField {
    fn next(self) -> Self {
        match self { ActiveField::Title => ActiveField::Description, ActiveField::Description => ActiveField::Priority, ActiveField::Priority => ActiveField::Title }
    }
}

struct App<S: KeyValueStore> {
    store: TodoStore<S>,
    database_url: String,
    selected: usize,
    last_tick: Instant,
    mode: Mode,
    list_state: ListState,
    filter: Filter,
    filtered_indices: Vec<usize>,
    field: ActiveField,
    draft: TodoDraft,
    editing: Option<TodoId>,
    status: Option<String>,
}

impl<S: KeyValueStore> App<S> {
    fn new(store: TodoStore<S>, database_url: String) -> Self {
        let mut app = App {
            store,
            database_url,
            selected: 0,
            last_tick: Instant::now(),
            mode: Mode::View,
            list_state: ListState::default(),
            filter: Filter::All,
            filtered_indices: Vec::new(),
            field: ActiveField::Title,
            draft: TodoDraft::default(),
            editing: None,
            status: None,
        };
        app.refresh(Ok(()));
        app
    }

    fn selected_item(&self) -> Option<&TodoItem> {
        self.filtered_indices.get(self.selected).and_then(|&idx| self.store.items().get(idx))
    }

    fn selected_id(&self) -> Option<TodoId> { self.selected_item().map(|i| i.id.clone()) }

    /// Called after every store operation: picks up warnings and re-filters.
    fn refresh<T>(&mut self, outcome: Result<T, TodoError>) {
        if let Err(e) = outcome { self.status = Some(e.to_string()); }
        if let Some(w) = self.store.take_warning() { self.status = Some(w.to_string()); }
        self.recompute_filtered();
    }

    fn recompute_filtered(&mut self) {
        self.filtered_indices = self.store.items().iter().enumerate().filter(|(_, e)| self.filter.admits(e)).map(|(i, _)| i).collect();
        // Clamp selection within filtered bounds
        let len = self.filtered_indices.len();
        if len == 0 { self.selected = 0; self.list_state.select(None); }
        else { if self.selected >= len { self.selected = len - 1; } self.list_state.select(Some(self.selected)); }
    }

    fn open_form(&mut self, mode: Mode, draft: TodoDraft, editing: Option<TodoId>) {
        self.mode = mode;
        self.field = ActiveField::Title;
        self.draft = draft;
        self.editing = editing;
    }

    fn close_form(&mut self) {
        self.mode = Mode::View;
        self.draft = TodoDraft::default();
        self.editing = None;
    }

    async fn submit_form(&mut self) {
        let draft = TodoDraft {
            title: self.draft.title.trim().to_string(),
            description: self.draft.description.trim().to_string(),
            priority: self.draft.priority,
        };
        match (self.mode, self.editing.clone()) {
            (Mode::Create, _) => { let res = self.store.create(draft).await; self.refresh(res); }
            (Mode::Edit, Some(id)) => { let res = self.store.edit(&id, draft).await; self.refresh(res); }
            _ => {}
        }
        self.close_form();
    }

    fn edit_field(&mut self, key: KeyCode) {
        match (self.field, key) {
            (ActiveField::Title, KeyCode::Backspace) => { self.draft.title.pop(); }
            (ActiveField::Title, KeyCode::Char(c)) => self.draft.title.push(c),
            (ActiveField::Description, KeyCode::Backspace) => { self.draft.description.pop(); }
            (ActiveField::Description, KeyCode::Char(c)) => self.draft.description.push(c),
            (ActiveField::Priority, KeyCode::Char('1')) => self.draft.priority = Priority::High,
            (ActiveField::Priority, KeyCode::Char('2')) => self.draft.priority = Priority::Moderate,
            (ActiveField::Priority, KeyCode::Char('3')) => self.draft.priority = Priority::Low,
            (ActiveField::Priority, KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right) => self.draft.priority = self.draft.priority.cycle(),
            _ => {}
        }
    }
}

fn priority_color(priority: Priority) -> Color {
    match priority { Priority::High => Color::LightRed, Priority::Moderate => Color::LightYellow, Priority::Low => Color::Reset }
}

fn draw<S: KeyValueStore>(f: &mut Frame, app: &mut App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(f.size());

    let header = Paragraph::new("Todos (Enter: toggle, n: new, e: edit, d: delete, f: filter, q: quit)  |  Form: Tab to switch field, Enter to save, Esc to cancel")
        .block(Block::default().borders(Borders::ALL).title("todos"));
    f.render_widget(header, chunks[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    let list_items: Vec<ListItem> = app.filtered_indices.iter().filter_map(|&idx| app.store.items().get(idx)).map(|e| {
        let mark = if e.completed { "[x]" } else { "[ ]" };
        ListItem::new(format!("{} {}", mark, e.title)).style(Style::default().fg(priority_color(e.priority)))
    }).collect();
    let list = List::new(list_items)
        .block(Block::default().borders(Borders::ALL).title(format!("items [{}]", app.filter.label())))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::REVERSED))
        .highlight_symbol(">> ");
    f.render_stateful_widget(list, middle[0], &mut app.list_state);

    // Details pane for the highlighted item
    let detail = match app.selected_item() {
        Some(e) => {
            let desc = if e.description.is_empty() { "(no description)" } else { e.description.as_str() };
            format!("Title:\n{}\n\nStatus: {}\nPriority: {}\n\nDescription:\n{}", e.title, if e.completed { "Done" } else { "Pending" }, e.priority.label(), desc)
        }
        None => String::new(),
    };
    let details = Paragraph::new(detail)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("details"));
    f.render_widget(details, middle[1]);

    let footer_text = match app.mode {
        Mode::View => match &app.status {
            Some(status) => format!("! {}", status),
            None => {
                let saved = app.store.last_saved_at().map(|t| t.format("%H:%M:%S").to_string()).unwrap_or_else(|| "-".to_string());
                format!("DATABASE_URL={}  |  Filter=[{}]  |  last saved {}", app.database_url, app.filter.label(), saved)
            }
        },
        Mode::Create | Mode::Edit => {
            let verb = if app.mode == Mode::Create { "Create" } else { "Edit" };
            match app.field {
                ActiveField::Title => format!("{} - Title: {}_", verb, app.draft.title),
                ActiveField::Description => format!("{} - Desc: {}_", verb, app.draft.description),
                ActiveField::Priority => format!("{} - Priority: < {} >  (1/2/3 or Space)", verb, app.draft.priority.label()),
            }
        }
    };
    let footer = Paragraph::new(footer_text)
        .block(Block::default().borders(Borders::ALL).title(match app.mode { Mode::View => "info", Mode::Create => "create", Mode::Edit => "edit" }));
    f.render_widget(footer, chunks[2]);
}

async fn run_app<S: KeyValueStore>(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, mut app: App<S>) -> Result<()> {
    let tick_rate = Duration::from_millis(200);

    loop {
        terminal.draw(|f| draw(f, &mut app))?;

        let timeout = tick_rate.saturating_sub(app.last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                // Only act on key presses; ignore repeats and releases to prevent duplicate input
                if key.kind != KeyEventKind::Press { continue; }
                match app.mode {
                    Mode::View => {
                        app.status = None;
                        match key.code {
                            KeyCode::Char('q') => break,
                            KeyCode::Up => { if app.selected > 0 { app.selected -= 1; } app.recompute_filtered(); }
                            KeyCode::Down => { let len = app.filtered_indices.len(); if app.selected + 1 < len { app.selected += 1; } app.recompute_filtered(); }
                            KeyCode::Enter => {
                                if let Some(id) = app.selected_id() {
                                    let res = app.store.toggle_complete(&id).await;
                                    app.refresh(res);
                                }
                            }
                            KeyCode::Char('n') => app.open_form(Mode::Create, TodoDraft::default(), None),
                            KeyCode::Char('e') => {
                                if let Some(item) = app.selected_item() {
                                    let (draft, id) = (TodoDraft::from(item), item.id.clone());
                                    app.open_form(Mode::Edit, draft, Some(id));
                                }
                            }
                            KeyCode::Char('d') => {
                                if let Some(id) = app.selected_id() {
                                    let res = app.store.delete(&id).await;
                                    if app.selected > 0 { app.selected -= 1; }
                                    app.refresh(res);
                                }
                            }
                            KeyCode::Char('f') => {
                                app.filter = match app.filter { Filter::All => Filter::Pending, Filter::Pending => Filter::Done, Filter::Done => Filter::All };
                                app.recompute_filtered();
                            }
                            _ => {}
                        }
                    }
                    Mode::Create | Mode::Edit => match key.code {
                        KeyCode::Esc => app.close_form(),
                        KeyCode::Enter => app.submit_form().await,
                        KeyCode::Tab => app.field = app.field.next(),
                        code => app.edit_field(code),
                    },
                }
            }
        }
        if app.last_tick.elapsed() >= tick_rate {
            app.last_tick = Instant::now();
        }
    }
    Ok(())
}
