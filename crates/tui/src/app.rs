use std::{cmp, future::Future, io, thread, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gamevault_core::{
    validate::{format_rating, MAX_COMMENT_LEN},
    CatalogError, FieldErrors, Game, GameDraft, GamePatch, PageOutcome, PageRequest, PageResponse,
    Pager, PagerState, ResultMerger, Source, Sources,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::{spawn, sync::mpsc};
use tracing::{debug, error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);
const MAX_SEARCH_LEN: usize = 64;
const MAX_INPUT_LEN: usize = 120;
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormField {
    Name,
    Released,
    Rating,
    Comment,
}

impl FormField {
    const ALL: [FormField; 4] = [
        FormField::Name,
        FormField::Released,
        FormField::Rating,
        FormField::Comment,
    ];

    fn label(self) -> &'static str {
        match self {
            FormField::Name => "Name",
            FormField::Released => "Released",
            FormField::Rating => "Rating",
            FormField::Comment => "Comment",
        }
    }

    fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|field| *field == self)
            .unwrap_or_default()
    }

    fn locked_by_identity(self) -> bool {
        matches!(self, FormField::Name | FormField::Released)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormAction {
    Create,
    Edit(i64),
}

#[derive(Debug, Clone)]
struct FormModal {
    draft: GameDraft,
    action: FormAction,
    focus: FormField,
    errors: FieldErrors,
}

impl FormModal {
    fn create(draft: GameDraft) -> Self {
        let focus = if draft.identity_locked() {
            FormField::Rating
        } else {
            FormField::Name
        };
        Self {
            draft,
            action: FormAction::Create,
            focus,
            errors: FieldErrors::default(),
        }
    }

    fn edit(game: &Game) -> Self {
        Self {
            draft: GameDraft::from_game(game),
            action: FormAction::Edit(game.id),
            focus: FormField::Rating,
            errors: FieldErrors::default(),
        }
    }

    fn title(&self) -> String {
        match (self.action, self.draft.base()) {
            (FormAction::Edit(_), Some(game)) => format!("Edit {}", game.name),
            (FormAction::Create, Some(game)) => format!("Add {} to My games", game.name),
            _ => "New game".to_string(),
        }
    }

    fn is_locked(&self, field: FormField) -> bool {
        self.draft.identity_locked() && field.locked_by_identity()
    }

    fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Name => &self.draft.name,
            FormField::Released => &self.draft.released,
            FormField::Rating => &self.draft.rating,
            FormField::Comment => &self.draft.comment,
        }
    }

    fn error(&self, field: FormField) -> Option<&str> {
        match field {
            FormField::Name => self.errors.name.as_deref(),
            FormField::Released => self.errors.released.as_deref(),
            FormField::Rating => self.errors.rating.as_deref(),
            FormField::Comment => self.errors.comment.as_deref(),
        }
    }

    fn focused_input(&mut self) -> Option<&mut String> {
        if self.is_locked(self.focus) {
            return None;
        }
        Some(match self.focus {
            FormField::Name => &mut self.draft.name,
            FormField::Released => &mut self.draft.released,
            FormField::Rating => &mut self.draft.rating,
            FormField::Comment => &mut self.draft.comment,
        })
    }

    fn move_focus(&mut self, delta: isize) {
        let len = FormField::ALL.len() as isize;
        let mut idx = self.focus.index() as isize;
        for _ in 0..len {
            idx = (idx + delta).rem_euclid(len);
            let candidate = FormField::ALL[idx as usize];
            if !self.is_locked(candidate) {
                self.focus = candidate;
                return;
            }
        }
    }

    fn insert(&mut self, ch: char) {
        if let Some(input) = self.focused_input() {
            if input.chars().count() < MAX_INPUT_LEN {
                input.push(ch);
            }
        }
    }

    fn backspace(&mut self) {
        if let Some(input) = self.focused_input() {
            input.pop();
        }
    }
}

#[derive(Debug, Clone)]
struct ConfirmDelete {
    id: i64,
    name: String,
}

#[derive(Debug, Clone)]
enum MutationKind {
    Added(String),
    Updated(String),
    Removed(String),
}

impl MutationKind {
    fn success_message(&self) -> String {
        match self {
            MutationKind::Added(name) => format!("Added {name} to My games"),
            MutationKind::Updated(name) => format!("Updated {name}"),
            MutationKind::Removed(name) => format!("Removed {name} from My games"),
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            MutationKind::Added(_) => "Add",
            MutationKind::Updated(_) => "Update",
            MutationKind::Removed(_) => "Remove",
        }
    }

    fn name(&self) -> &str {
        match self {
            MutationKind::Added(name) | MutationKind::Updated(name) | MutationKind::Removed(name) => {
                name
            }
        }
    }
}

struct MutationResult {
    kind: MutationKind,
    result: Result<(), CatalogError>,
}

enum AppEvent {
    Input(Event),
    Tick,
    PageLoaded(PageResponse),
    Mutated(MutationResult),
}

/// Terminal front end over the remote catalog and the local collection.
pub struct GameVaultApp {
    sources: Sources,
    merger: ResultMerger,
    pager: Pager,
    tab: Source,
    search: String,
    state: UiState,
    form: Option<FormModal>,
    confirm: Option<ConfirmDelete>,
    mutation_in_flight: bool,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    theme: Theme,
}

impl GameVaultApp {
    pub fn new(sources: Sources) -> Self {
        Self {
            sources,
            merger: ResultMerger::new(Source::Remote),
            pager: Pager::new(),
            tab: Source::Remote,
            search: String::new(),
            state: UiState::default(),
            form: None,
            confirm: None,
            mutation_in_flight: false,
            event_tx: None,
            theme: Theme::default(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        self.load_context();
        self.state.set_status("Loading games...".to_string());

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) {
                break;
            }

            if self.state.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    error!(?err, "Input handling failed");
                    self.state.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Tick) => {
                self.handle_tick();
                true
            }
            Some(AppEvent::PageLoaded(response)) => {
                self.handle_page_loaded(response);
                true
            }
            Some(AppEvent::Mutated(result)) => {
                self.handle_mutation(result);
                true
            }
            None => false,
        }
    }

    fn handle_tick(&mut self) {
        if self.pager.is_loading() || self.mutation_in_flight {
            self.state.spinner = (self.state.spinner + 1) % SPINNER.len();
        }
    }

    /// Start over at page 1 of the current tab and search.
    fn load_context(&mut self) {
        let request = self.merger.begin(self.tab, &self.search, 1);
        self.pager.on_context_change();
        self.state.reset_cursor();
        self.dispatch(request);
    }

    fn dispatch(&mut self, request: PageRequest) {
        self.pager.track(&request);
        let Some(sender) = self.event_tx.clone() else {
            warn!(page = request.tag.page, "event loop not running; request dropped");
            self.pager.on_context_change();
            return;
        };
        debug!(
            source = %request.tag.context.source,
            search = %request.tag.context.search,
            page = request.tag.page,
            "Fetching page"
        );
        let sources = self.sources.clone();
        spawn(async move {
            let response = sources.fetch(request).await;
            if sender.send(AppEvent::PageLoaded(response)).await.is_err() {
                debug!("page response dropped; event loop closed");
            }
        });
    }

    fn handle_page_loaded(&mut self, response: PageResponse) {
        let tag = response.tag.clone();
        let outcome = self.merger.apply(response);
        self.pager.on_outcome(&tag, &outcome);

        match &outcome {
            PageOutcome::Merged(report) => {
                if report.replaced {
                    self.state.reset_cursor();
                }
                let mut status = format!(
                    "{} games in {} (page {})",
                    self.merger.len(),
                    self.merger.active_source().label(),
                    self.merger.current_page()
                );
                if report.rejected > 0 {
                    status.push_str(&format!(" • skipped {} invalid", report.rejected));
                }
                self.state.set_status(status);
                // Keep filling the viewport while pages bring new rows.
                if report.added > 0 {
                    self.check_sentinel();
                }
            }
            PageOutcome::Exhausted(report) => {
                let message = if self.merger.is_empty() && report.replaced {
                    if self.search.is_empty() {
                        "My games is empty. Add games from All games with 'a'".to_string()
                    } else {
                        format!("No games in My games match \"{}\"", self.search)
                    }
                } else {
                    "No more games to load".to_string()
                };
                if report.replaced {
                    self.state.reset_cursor();
                }
                self.state.set_status(message);
            }
            PageOutcome::Failed(err) => {
                error!(%err, page = tag.page, "Page load failed");
                self.state
                    .set_status(format!("Failed to fetch games (press r to retry): {err}"));
            }
            PageOutcome::Stale => {
                debug!(page = tag.page, "Ignoring stale page");
            }
        }
        self.state.clamp_cursor(self.merger.len());
    }

    fn sentinel_visible(&self) -> bool {
        let len = self.merger.len();
        len == 0
            || self.state.cursor + 1 >= len
            || self.state.offset + self.state.list_height > len
    }

    fn check_sentinel(&mut self) {
        if !self.sentinel_visible() || self.merger.last_error().is_some() {
            return;
        }
        if let Some(request) = self.pager.on_sentinel_visible(&mut self.merger) {
            self.dispatch(request);
        }
    }

    fn retry(&mut self) {
        match self.pager.state() {
            PagerState::Loading => self.state.set_status("Still loading...".to_string()),
            PagerState::Exhausted => self.state.set_status("No more games to load".to_string()),
            PagerState::Idle => {
                if let Some(request) = self.pager.on_sentinel_visible(&mut self.merger) {
                    self.state
                        .set_status(format!("Loading page {}...", request.tag.page));
                    self.dispatch(request);
                }
            }
        }
    }

    fn switch_tab(&mut self) {
        self.tab = self.tab.toggle();
        info!(tab = %self.tab, "Switched tab");
        self.load_context();
        self.state
            .set_status(format!("Loading {}...", self.tab.label()));
    }

    fn submit_search(&mut self) {
        self.state.mode = Mode::Browse;
        let search = self.state.search_input.trim().to_string();
        if search == self.search && self.merger.last_error().is_none() {
            self.state.set_status(format!("Search unchanged: {search}"));
            return;
        }
        self.search = search;
        self.load_context();
        if self.search.is_empty() {
            self.state.set_status("Search cleared".to_string());
        } else {
            self.state
                .set_status(format!("Searching for \"{}\"...", self.search));
        }
    }

    fn current_game(&self) -> Option<&Game> {
        self.merger.games().get(self.state.cursor)
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Key(key) => self.handle_key(key)?,
            Event::Resize(_, _) => {}
            Event::Mouse(_) => {}
            Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.state.should_quit = true;
            return Ok(());
        }
        if self.confirm.is_some() {
            return self.handle_confirm_key(key);
        }
        if self.form.is_some() {
            return self.handle_form_key(key);
        }
        match self.state.mode {
            Mode::Search => self.handle_search_key(key),
            Mode::Browse => self.handle_browse_key(key),
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.state.mode = Mode::Browse;
                self.state.search_input = self.search.clone();
                self.state.set_status("Search cancelled".to_string());
            }
            KeyCode::Enter => self.submit_search(),
            KeyCode::Backspace => {
                self.state.search_input.pop();
            }
            KeyCode::Char(ch) => {
                if (key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT)
                    && self.state.search_input.chars().count() < MAX_SEARCH_LEN
                {
                    self.state.search_input.push(ch);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_browse_key(&mut self, key: KeyEvent) -> Result<()> {
        let len = self.merger.len();
        match key.code {
            KeyCode::Char('q') if key.modifiers.is_empty() => self.state.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => {
                self.state.move_cursor(1, len);
                self.check_sentinel();
            }
            KeyCode::Char('k') | KeyCode::Up => self.state.move_cursor(-1, len),
            KeyCode::Char('g') if key.modifiers.is_empty() => self.state.move_to(0, len),
            KeyCode::Char('G') => {
                self.state.move_to_end(len);
                self.check_sentinel();
            }
            KeyCode::Home => self.state.move_to(0, len),
            KeyCode::End => {
                self.state.move_to_end(len);
                self.check_sentinel();
            }
            KeyCode::PageDown => {
                self.state.page_down(len);
                self.check_sentinel();
            }
            KeyCode::PageUp => self.state.page_up(len),
            KeyCode::Tab | KeyCode::BackTab => self.switch_tab(),
            KeyCode::Char('/') => {
                self.state.mode = Mode::Search;
                self.state.search_input = self.search.clone();
                self.state
                    .set_status("Type a search and press Enter".to_string());
            }
            KeyCode::Esc if !self.search.is_empty() => {
                self.state.search_input.clear();
                self.submit_search();
            }
            KeyCode::Char('r') if key.modifiers.is_empty() => self.retry(),
            KeyCode::Char('a') if key.modifiers.is_empty() => self.open_add_form(),
            KeyCode::Char('n') if key.modifiers.is_empty() => {
                self.form = Some(FormModal::create(GameDraft::blank()));
            }
            KeyCode::Char('e') | KeyCode::Enter if self.tab == Source::Local => {
                self.open_edit_form()
            }
            KeyCode::Char('e') if key.modifiers.is_empty() => self
                .state
                .set_status("Only games in My games can be edited".to_string()),
            KeyCode::Char('d') if key.modifiers.is_empty() => self.open_delete_confirm(),
            KeyCode::Enter => self.open_add_form(),
            _ => {}
        }
        Ok(())
    }

    fn open_add_form(&mut self) {
        if self.tab == Source::Local {
            self.state
                .set_status("Already in My games. Press e to edit".to_string());
            return;
        }
        let Some(game) = self.current_game() else {
            self.state.set_status("No game selected".to_string());
            return;
        };
        self.form = Some(FormModal::create(GameDraft::from_game(game)));
    }

    fn open_edit_form(&mut self) {
        let Some(game) = self.current_game() else {
            self.state.set_status("No game selected".to_string());
            return;
        };
        self.form = Some(FormModal::edit(game));
    }

    fn open_delete_confirm(&mut self) {
        if self.tab != Source::Local {
            self.state
                .set_status("Only games in My games can be removed".to_string());
            return;
        }
        let Some(game) = self.current_game() else {
            self.state.set_status("No game selected".to_string());
            return;
        };
        self.confirm = Some(ConfirmDelete {
            id: game.id,
            name: game.name.clone(),
        });
    }

    fn handle_form_key(&mut self, key: KeyEvent) -> Result<()> {
        let Some(form) = self.form.as_mut() else {
            return Ok(());
        };
        match key.code {
            KeyCode::Esc => {
                self.form = None;
                self.state.set_status("Edit cancelled".to_string());
            }
            KeyCode::Enter => self.submit_form(),
            KeyCode::Tab | KeyCode::Down => form.move_focus(1),
            KeyCode::BackTab | KeyCode::Up => form.move_focus(-1),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(ch) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    form.insert(ch);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn submit_form(&mut self) {
        if self.mutation_in_flight {
            self.state
                .set_status("Another change is still being saved".to_string());
            return;
        }
        let Some(form) = self.form.as_mut() else {
            return;
        };
        let game = match form.draft.validate() {
            Ok(game) => game,
            Err(errors) => {
                form.errors = errors;
                self.state
                    .set_status("Fix the highlighted fields".to_string());
                return;
            }
        };
        let action = form.action;
        self.form = None;

        let sources = self.sources.clone();
        match action {
            FormAction::Create => {
                let kind = MutationKind::Added(game.name.clone());
                self.spawn_mutation(kind, async move {
                    sources.local().create(game).await.map(|_| ())
                });
            }
            FormAction::Edit(id) => {
                let kind = MutationKind::Updated(game.name.clone());
                let patch = GamePatch::from_game(&game);
                self.spawn_mutation(kind, async move {
                    sources.local().update(id, patch).await.map(|_| ())
                });
            }
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                let Some(confirm) = self.confirm.take() else {
                    return Ok(());
                };
                if self.mutation_in_flight {
                    self.state
                        .set_status("Another change is still being saved".to_string());
                    return Ok(());
                }
                let sources = self.sources.clone();
                let id = confirm.id;
                self.spawn_mutation(MutationKind::Removed(confirm.name), async move {
                    sources.local().delete(id).await
                });
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.confirm = None;
                self.state.set_status("Nothing removed".to_string());
            }
            _ => {}
        }
        Ok(())
    }

    fn spawn_mutation<F>(&mut self, kind: MutationKind, task: F)
    where
        F: Future<Output = Result<(), CatalogError>> + Send + 'static,
    {
        let Some(sender) = self.event_tx.clone() else {
            warn!(action = kind.verb(), "event loop not running; change dropped");
            return;
        };
        self.mutation_in_flight = true;
        self.state.set_status(format!("Saving {}...", kind.name()));
        spawn(async move {
            let result = task.await;
            let event = AppEvent::Mutated(MutationResult { kind, result });
            if sender.send(event).await.is_err() {
                debug!("mutation result dropped; event loop closed");
            }
        });
    }

    fn handle_mutation(&mut self, outcome: MutationResult) {
        self.mutation_in_flight = false;
        let MutationResult { kind, result } = outcome;
        match result {
            Ok(()) => {
                info!(action = kind.verb(), game = kind.name(), "Collection changed");
                self.state.set_status(kind.success_message());
                let request = self.merger.notify_mutation();
                self.pager.on_context_change();
                self.state.reset_cursor();
                self.dispatch(request);
            }
            Err(CatalogError::DuplicateRecord { id }) => {
                warn!(id, "Game already in collection");
                self.state
                    .set_status(format!("{} is already in My games", kind.name()));
            }
            Err(err) => {
                error!(%err, action = kind.verb(), "Collection change failed");
                self.state
                    .set_status(format!("{} failed: {err}", kind.verb()));
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(size);

        let body_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(chunks[1]);

        self.render_header(frame, chunks[0]);
        self.render_game_list(frame, body_chunks[0]);
        self.render_game_info(frame, body_chunks[1]);
        self.render_status(frame, chunks[2]);

        if let Some(form) = &self.form {
            self.render_form(frame, form);
        }
        if let Some(confirm) = &self.confirm {
            self.render_confirm(frame, confirm);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let mut spans = Vec::new();
        for source in [Source::Remote, Source::Local] {
            let style = if source == self.tab {
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD | Modifier::REVERSED)
            } else {
                Style::default().fg(self.theme.muted)
            };
            spans.push(Span::styled(format!(" {} ", source.label()), style));
            spans.push(Span::raw("  "));
        }
        let search = if self.state.mode == Mode::Search {
            Span::styled(
                format!("Search: {}_", self.state.search_input),
                Style::default().fg(self.theme.warning),
            )
        } else if self.search.is_empty() {
            Span::styled("Search: (none)", Style::default().fg(self.theme.muted))
        } else {
            Span::raw(format!("Search: {}", self.search))
        };
        spans.push(search);

        let paragraph = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL).title("GameVault"));
        frame.render_widget(paragraph, area);
    }

    fn sentinel_line(&self) -> Line<'static> {
        match self.pager.state() {
            PagerState::Loading => Line::from(Span::styled(
                format!("  {} Loading more games...", SPINNER[self.state.spinner]),
                Style::default().fg(self.theme.warning),
            )),
            PagerState::Exhausted => Line::from(Span::styled(
                "  No more games",
                Style::default().fg(self.theme.muted),
            )),
            PagerState::Idle if self.merger.last_error().is_some() => Line::from(Span::styled(
                "  Load failed. Press r to retry",
                Style::default().fg(self.theme.danger),
            )),
            PagerState::Idle => Line::from(Span::styled(
                "  Scroll for more",
                Style::default().fg(self.theme.muted),
            )),
        }
    }

    fn render_game_list(&mut self, frame: &mut Frame, area: Rect) {
        let len = self.merger.len();
        self.state.list_height = area.height.saturating_sub(2) as usize;
        self.state.clamp_cursor(len);
        self.state.ensure_cursor_visible(len);

        let height = self.state.list_height;
        let end = (self.state.offset + height).min(len);
        let games = &self.merger.games()[self.state.offset.min(end)..end];

        let mut list_state = ListState::default();
        if !games.is_empty() {
            let selected = self
                .state
                .cursor
                .saturating_sub(self.state.offset)
                .min(games.len().saturating_sub(1));
            list_state.select(Some(selected));
        }

        let mut items: Vec<ListItem> = games
            .iter()
            .enumerate()
            .map(|(idx, game)| {
                let global_index = self.state.offset + idx;
                let is_selected = self.state.cursor == global_index;
                let marker = if is_selected {
                    Span::styled(
                        "▶ ",
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw("  ")
                };
                let title = Span::styled(
                    game.display_name(),
                    Style::default()
                        .fg(self.theme.primary_fg)
                        .add_modifier(Modifier::BOLD),
                );
                let rating = Span::styled(
                    format!(" · {}", format_rating(game.rating)),
                    Style::default().fg(self.theme.muted),
                );
                ListItem::new(Line::from(vec![marker, title, rating]))
            })
            .collect();
        if games.len() < height {
            items.push(ListItem::new(self.sentinel_line()));
        }

        let title = format!("{} ({})", self.merger.active_source().label(), len);
        let block = Block::default().borders(Borders::ALL).title(title);
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_game_info(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Game Details");
        let Some(game) = self.current_game() else {
            let message = if self.pager.is_loading() {
                "Loading..."
            } else {
                "No games to show"
            };
            frame.render_widget(Paragraph::new(message).block(block), area);
            return;
        };

        let mut lines = vec![Line::from(Span::styled(
            game.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ))];
        lines.push(Line::from(Span::styled(
            game.slug.clone(),
            Style::default().fg(self.theme.muted),
        )));
        if !game.released.is_empty() {
            lines.push(Line::from(format!("Released: {}", game.released)));
        }
        lines.push(Line::from(format!(
            "Rating: {} / {}",
            format_rating(game.rating),
            format_rating(game.rating_top)
        )));
        if !game.platforms.is_empty() {
            lines.push(Line::from(format!("Platforms: {}", game.platform_names())));
        }
        if let Some(comment) = &game.comment {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("\"{comment}\""),
                Style::default().fg(self.theme.success),
            )));
        }
        if !game.background_image.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                game.background_image.clone(),
                Style::default().fg(self.theme.muted),
            )));
        }
        let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let primary = match self.merger.last_error() {
            Some(err) if err.is_banner() => Line::from(Span::styled(
                format!("{} • {err}", self.state.status),
                Style::default().fg(self.theme.danger),
            )),
            _ => Line::from(self.state.status.clone()),
        };
        let hints = match (self.state.mode, self.tab) {
            (Mode::Search, _) => "Enter search  Esc cancel",
            (Mode::Browse, Source::Remote) => {
                "j/k move  Tab switch  / search  a add  n new  r retry  q quit"
            }
            (Mode::Browse, Source::Local) => {
                "j/k move  Tab switch  / search  e edit  d remove  n new  r retry  q quit"
            }
        };
        let secondary = Line::from(Span::styled(hints, Style::default().fg(self.theme.muted)));
        let paragraph = Paragraph::new(vec![primary, secondary])
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_form(&self, frame: &mut Frame, form: &FormModal) {
        let frame_area = frame.size();
        let width = cmp::max(cmp::min(64_u16, frame_area.width.saturating_sub(4)), 30_u16);
        let height = 14_u16.min(frame_area.height.saturating_sub(2)).max(8_u16);
        let area = centered(frame_area, width, height);

        frame.render_widget(Clear, area);

        let mut lines = Vec::new();
        for field in FormField::ALL {
            let focused = field == form.focus;
            let marker = if focused {
                Span::styled("> ", Style::default().fg(self.theme.accent))
            } else {
                Span::raw("  ")
            };
            let label_style = if focused {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mut value = form.value(field).to_string();
            if focused {
                value.push('_');
            }
            let value_style = if form.is_locked(field) {
                Style::default().fg(self.theme.muted)
            } else {
                Style::default().fg(self.theme.primary_fg)
            };
            let mut spans = vec![
                marker,
                Span::styled(format!("{:<9}", field.label()), label_style),
                Span::styled(value, value_style),
            ];
            if field == FormField::Comment {
                spans.push(Span::styled(
                    format!(
                        "  {}/{}",
                        form.draft.comment.chars().count(),
                        MAX_COMMENT_LEN
                    ),
                    Style::default().fg(self.theme.muted),
                ));
            }
            lines.push(Line::from(spans));
            if let Some(message) = form.error(field) {
                lines.push(Line::from(Span::styled(
                    format!("    {message}"),
                    Style::default().fg(self.theme.danger),
                )));
            }
        }
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" save  "),
            Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" next field  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ]));

        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(form.title()))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_confirm(&self, frame: &mut Frame, confirm: &ConfirmDelete) {
        let frame_area = frame.size();
        let width = cmp::max(cmp::min(56_u16, frame_area.width.saturating_sub(4)), 24_u16);
        let area = centered(frame_area, width, 5);

        frame.render_widget(Clear, area);
        let paragraph = Paragraph::new(vec![
            Line::from(format!("Remove {} from My games?", confirm.name)),
            Line::from(vec![
                Span::styled("y", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" remove  "),
                Span::styled("n", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" keep"),
            ]),
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Remove game")
                .border_style(Style::default().fg(self.theme.danger)),
        )
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn centered(frame_area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(frame_area.width);
    let height = height.min(frame_area.height);
    let x = frame_area.x + (frame_area.width.saturating_sub(width)) / 2;
    let y = frame_area.y + (frame_area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

/// Cursor and viewport over the merged list, which lives in the merger.
struct UiState {
    cursor: usize,
    offset: usize,
    list_height: usize,
    search_input: String,
    status: String,
    mode: Mode,
    should_quit: bool,
    spinner: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            cursor: 0,
            offset: 0,
            list_height: 1,
            search_input: String::new(),
            status: "Ready".to_string(),
            mode: Mode::Browse,
            should_quit: false,
            spinner: 0,
        }
    }
}

impl UiState {
    fn reset_cursor(&mut self) {
        self.cursor = 0;
        self.offset = 0;
    }

    fn move_cursor(&mut self, delta: isize, len: usize) {
        if len == 0 {
            return;
        }
        let idx = (self.cursor as isize + delta).clamp(0, len as isize - 1);
        self.cursor = idx as usize;
        self.ensure_cursor_visible(len);
    }

    fn move_to(&mut self, index: usize, len: usize) {
        if len == 0 {
            return;
        }
        self.cursor = index.min(len - 1);
        self.ensure_cursor_visible(len);
    }

    fn move_to_end(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.cursor = len - 1;
        self.ensure_cursor_visible(len);
    }

    fn page_down(&mut self, len: usize) {
        if len == 0 || self.list_height == 0 {
            return;
        }
        let delta = self.list_height.min(len);
        self.move_cursor(delta as isize, len);
    }

    fn page_up(&mut self, len: usize) {
        if len == 0 || self.list_height == 0 {
            return;
        }
        let delta = self.list_height.min(len);
        self.move_cursor(-(delta as isize), len);
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }

    fn clamp_cursor(&mut self, len: usize) {
        if len == 0 {
            self.cursor = 0;
            self.offset = 0;
        } else if self.cursor >= len {
            self.cursor = len - 1;
        }
    }

    /// Keep the cursor on screen. The sentinel row counts as one extra row.
    fn ensure_cursor_visible(&mut self, len: usize) {
        if len == 0 || self.list_height == 0 {
            self.offset = 0;
            return;
        }
        let rows = len + 1;
        let max_offset = rows.saturating_sub(self.list_height);
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + self.list_height {
            self.offset = self.cursor + 1 - self.list_height;
        }
        self.offset = self.offset.min(max_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(id: i64) -> Game {
        Game {
            id,
            slug: "celeste".to_string(),
            name: "Celeste".to_string(),
            released: "2018-01-25".to_string(),
            background_image: String::new(),
            rating: 4.5,
            rating_top: 5.0,
            comment: None,
            platforms: Vec::new(),
        }
    }

    #[test]
    fn blank_form_edits_every_field() {
        let mut form = FormModal::create(GameDraft::blank());
        assert_eq!(form.focus, FormField::Name);
        for ch in "Hades".chars() {
            form.insert(ch);
        }
        form.move_focus(1);
        assert_eq!(form.focus, FormField::Released);
        form.move_focus(-1);
        form.backspace();
        assert_eq!(form.draft.name, "Hade");
    }

    #[test]
    fn prefilled_form_skips_locked_fields() {
        let mut form = FormModal::edit(&game(7));
        assert_eq!(form.focus, FormField::Rating);
        form.move_focus(1);
        assert_eq!(form.focus, FormField::Comment);
        form.move_focus(1);
        assert_eq!(form.focus, FormField::Rating);
        form.move_focus(-1);
        assert_eq!(form.focus, FormField::Comment);

        form.focus = FormField::Name;
        form.insert('x');
        assert_eq!(form.draft.name, "Celeste");
        assert_eq!(form.action, FormAction::Edit(7));
    }

    #[test]
    fn cursor_scrolls_to_reveal_sentinel_row() {
        let mut state = UiState {
            list_height: 3,
            ..UiState::default()
        };
        state.move_to_end(5);
        assert_eq!(state.cursor, 4);
        assert_eq!(state.offset, 2);
        assert!(state.offset + state.list_height > 4);

        state.move_cursor(-10, 5);
        assert_eq!((state.cursor, state.offset), (0, 0));
        state.clamp_cursor(0);
        assert_eq!((state.cursor, state.offset), (0, 0));
    }
}
