// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;
use tabgrid_app::{
    AppCommand, AppEvent, AppState, PreferenceKey, ProfileKey, ProfilePayload, ViewMode,
};
use tabgrid_engine::{
    AccordionView, BusyIndicator, Engine, GroupLevel, HeaderCell, HostSurface, PassOutcome,
    Preferences, RenderBody, RenderedCell, RenderedRow, TIER_FIELD, TableView, TargetHandle,
    ViewState,
};

const TICK: Duration = Duration::from_millis(30);
const STATUS_TTL: Duration = Duration::from_secs(4);
const CELL_SEPARATOR: &str = " │ ";
const OPEN_MARK: &str = "▾";
const CLOSED_MARK: &str = "▸";

/// Where profile data comes from. The engine owns everything after load.
pub trait AppRuntime {
    fn profile_keys(&mut self) -> Result<Vec<ProfileKey>>;
    fn load_profile(&mut self, profile: &ProfileKey) -> Result<ProfilePayload>;
}

/// Host surface for the terminal: holds whatever the engine mounted last and
/// whether the busy indicator is up. Drawn every tick.
#[derive(Debug, Default)]
pub struct TerminalHost {
    mounted: Option<TargetHandle>,
    highlighted: Option<ProfileKey>,
    busy: bool,
}

impl TerminalHost {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn mounted(&self) -> Option<&TargetHandle> {
        self.mounted.as_ref()
    }

    pub fn highlighted(&self) -> Option<&ProfileKey> {
        self.highlighted.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

impl HostSurface for TerminalHost {
    fn mount(&mut self, target: TargetHandle) {
        self.mounted = Some(target);
    }

    fn highlight_tab(&mut self, profile: &ProfileKey) {
        self.highlighted = Some(profile.clone());
    }
}

impl BusyIndicator for TerminalHost {
    fn show(&mut self) {
        self.busy = true;
    }

    fn hide(&mut self) {
        self.busy = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InternalEvent {
    Status(String),
    ClearStatus { token: u64 },
}

#[derive(Debug, Default)]
struct ViewData {
    search_input: Option<String>,
    help_visible: bool,
    status_token: u64,
    group_cursor: Option<String>,
    filter_summary: Option<String>,
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    engine: &Engine,
    host: &Rc<RefCell<TerminalHost>>,
) -> Result<()> {
    let tokio_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build async runtime")?;
    let local = tokio::task::LocalSet::new();

    if state.tabs.is_empty() {
        state.tabs = runtime.profile_keys().context("list profiles")?;
    }

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let result = match Terminal::new(backend).context("create terminal") {
        Ok(mut terminal) => local.block_on(
            &tokio_runtime,
            event_loop(state, runtime, engine, host, &mut terminal),
        ),
        Err(error) => Err(error),
    };

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

async fn event_loop<R: AppRuntime, B: Backend>(
    state: &mut AppState,
    runtime: &mut R,
    engine: &Engine,
    host: &Rc<RefCell<TerminalHost>>,
    terminal: &mut Terminal<B>,
) -> Result<()> {
    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    if let Some(first) = state.active_profile().cloned() {
        open_tab(runtime, engine, &internal_tx, first);
    }

    loop {
        process_internal_events(state, &mut view_data, &internal_tx, &internal_rx);
        sync_from_engine(state, &mut view_data, engine);

        terminal
            .draw(|frame| render(frame, state, &view_data, &host.borrow()))
            .context("draw frame")?;

        while event::poll(Duration::ZERO).context("poll event")? {
            if let Event::Key(key) = event::read().context("read event")?
                && handle_key_event(state, runtime, engine, &mut view_data, &internal_tx, key)
            {
                return Ok(());
            }
        }

        tokio::time::sleep(TICK).await;
    }
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::Status(message) => {
                state.status_line = Some(message);
                schedule_status_clear(view_data, tx);
            }
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

fn schedule_status_clear(view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    view_data.status_token = view_data.status_token.saturating_add(1);
    let token = view_data.status_token;
    let sender = tx.clone();
    tokio::task::spawn_local(async move {
        tokio::time::sleep(STATUS_TTL).await;
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

/// Mirrors engine state the keyboard cursor depends on: the active tab, the
/// column count and the groups selectable at the current accordion depth.
fn sync_from_engine(state: &mut AppState, view_data: &mut ViewData, engine: &Engine) {
    let session = engine.session();
    if let Some(active) = &session.active {
        state.sync_active(active);
    }
    let Some(view) = session.active_view() else {
        state.set_column_count(0);
        state.set_group_count(0);
        view_data.group_cursor = None;
        view_data.filter_summary = None;
        return;
    };

    state.set_column_count(view.columns.len());
    let groups = match view.mode {
        ViewMode::Accordion => view.selectable_groups(),
        ViewMode::Table => Vec::new(),
    };
    state.set_group_count(groups.len());
    view_data.group_cursor = groups
        .get(state.selected_group)
        .map(|key| format!("{key} ({}/{})", state.selected_group + 1, groups.len()));
    view_data.filter_summary = filter_summary(view);
}

fn filter_summary(view: &ViewState) -> Option<String> {
    let filters = &view.filters;
    if !filters.is_active() {
        return None;
    }
    let mut parts = Vec::new();
    if let Some(search) = &filters.search {
        parts.push(format!("/{search}"));
    }
    if !filters.hidden_groups.is_empty() {
        parts.push(format!("{} hidden", filters.hidden_groups.len()));
    }
    if let Some(tier) = &filters.hidden_tier {
        parts.push(format!("-{tier}"));
    }
    Some(parts.join(" "))
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    engine: &Engine,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if view_data.search_input.is_some() {
        handle_search_key(engine, view_data, tx, key);
        return false;
    }
    if view_data.help_visible {
        view_data.help_visible = false;
        return false;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            return false;
        }
        KeyCode::Char('/') => {
            view_data.search_input = Some(String::new());
            return false;
        }
        KeyCode::Char('r') => {
            reload_active(state, runtime, engine, tx);
            return false;
        }
        KeyCode::Char('w') => {
            close_active(state, engine, tx);
            return false;
        }
        KeyCode::Char('x') => {
            hide_selected_group(state, engine, tx);
            return false;
        }
        KeyCode::Char('X') => {
            spawn_edit(engine, tx, ViewState::show_all_groups);
            return false;
        }
        _ => {}
    }

    let Some(command) = command_for_key(key) else {
        return false;
    };
    for app_event in state.dispatch(command) {
        apply_event(runtime, engine, view_data, tx, app_event);
    }
    false
}

fn handle_search_key(
    engine: &Engine,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => view_data.search_input = None,
        KeyCode::Enter => {
            let query = view_data.search_input.take();
            spawn_edit(engine, tx, move |view| view.set_search(query));
        }
        KeyCode::Backspace => {
            if let Some(input) = view_data.search_input.as_mut() {
                input.pop();
            }
        }
        KeyCode::Char(ch) => {
            if let Some(input) = view_data.search_input.as_mut() {
                input.push(ch);
            }
        }
        _ => {}
    }
}

fn command_for_key(key: KeyEvent) -> Option<AppCommand> {
    match key.code {
        KeyCode::Tab | KeyCode::Char(']') => Some(AppCommand::NextTab),
        KeyCode::BackTab | KeyCode::Char('[') => Some(AppCommand::PrevTab),
        KeyCode::Right | KeyCode::Char('l') => Some(AppCommand::NextColumn),
        KeyCode::Left | KeyCode::Char('h') => Some(AppCommand::PrevColumn),
        KeyCode::Down | KeyCode::Char('j') => Some(AppCommand::NextGroup),
        KeyCode::Up | KeyCode::Char('k') => Some(AppCommand::PrevGroup),
        KeyCode::Char('s') => Some(AppCommand::SortSelected),
        KeyCode::Char('g') => Some(AppCommand::GroupBySelected),
        KeyCode::Char('G') => Some(AppCommand::PopGrouping),
        KeyCode::Char('v') => Some(AppCommand::ToggleMode),
        KeyCode::Enter => Some(AppCommand::OpenSelectedGroup),
        KeyCode::Backspace => Some(AppCommand::CloseGroup),
        KeyCode::Char('b') => Some(AppCommand::TogglePreference(
            PreferenceKey::IncludeSideBySide,
        )),
        KeyCode::Char('a') => Some(AppCommand::TogglePreference(PreferenceKey::AutoEnrich)),
        KeyCode::Char('t') => Some(AppCommand::TogglePreference(PreferenceKey::HiddenTier)),
        _ => None,
    }
}

fn apply_event<R: AppRuntime>(
    runtime: &mut R,
    engine: &Engine,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    app_event: AppEvent,
) {
    match app_event {
        AppEvent::TabChanged(profile) => open_tab(runtime, engine, tx, profile),
        AppEvent::SortRequested(index) => spawn_edit(engine, tx, move |view| {
            if let Some(column) = view.column_at(index).cloned() {
                view.cycle_sort(&column);
            }
        }),
        AppEvent::GroupByRequested(index) => spawn_edit(engine, tx, move |view| {
            if let Some(column) = view.column_at(index).cloned() {
                view.push_grouping(column);
            }
        }),
        AppEvent::GroupingPopped => spawn_edit(engine, tx, |view| {
            view.pop_grouping();
        }),
        AppEvent::ModeToggled => spawn_edit(engine, tx, ViewState::toggle_mode),
        AppEvent::GroupOpened(index) => {
            let key = engine
                .active_view()
                .and_then(|view| view.selectable_groups().get(index).cloned());
            if let Some(key) = key {
                spawn_edit(engine, tx, move |view| view.open_group(key));
            }
        }
        AppEvent::GroupClosed => spawn_edit(engine, tx, |view| {
            view.close_group();
        }),
        AppEvent::PreferenceToggled(key) => {
            let tiers = engine
                .active_view()
                .map(|view| tier_values(&view))
                .unwrap_or_default();
            let value = toggled_preference(&engine.preferences(), key, &tiers);
            let engine = engine.clone();
            let sender = tx.clone();
            spawn_pass(tx, async move {
                match engine.set_preference(key, &value).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        tracing::warn!(key = key.as_str(), "preference not saved: {error:#}");
                        let _ = sender.send(InternalEvent::Status(format!(
                            "could not save {}: {error}",
                            key.as_str()
                        )));
                        PassOutcome::Idle
                    }
                }
            });
        }
        AppEvent::StatusUpdated(_) => schedule_status_clear(view_data, tx),
        AppEvent::ColumnSelected(_) | AppEvent::GroupSelected(_) | AppEvent::StatusCleared => {}
    }
}

fn open_tab<R: AppRuntime>(
    runtime: &mut R,
    engine: &Engine,
    tx: &Sender<InternalEvent>,
    profile: ProfileKey,
) {
    let engine = engine.clone();
    if engine.session().cache.contains(&profile) {
        spawn_pass(tx, async move { engine.switch_profile(profile, None).await });
        return;
    }
    match runtime.load_profile(&profile) {
        Ok(payload) => spawn_pass(tx, async move { engine.load_profile(profile, payload).await }),
        Err(error) => {
            tracing::warn!(%profile, "profile load failed: {error:#}");
            let _ = tx.send(InternalEvent::Status(format!("load {profile} failed: {error}")));
        }
    }
}

fn reload_active<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    engine: &Engine,
    tx: &Sender<InternalEvent>,
) {
    let Some(profile) = state.active_profile().cloned() else {
        return;
    };
    match runtime.load_profile(&profile) {
        Ok(payload) => {
            let engine = engine.clone();
            spawn_pass(tx, async move {
                engine.switch_profile(profile, Some(payload)).await
            });
        }
        Err(error) => {
            let _ = tx.send(InternalEvent::Status(format!(
                "reload {profile} failed: {error}"
            )));
        }
    }
}

fn close_active(state: &mut AppState, engine: &Engine, tx: &Sender<InternalEvent>) {
    let Some(profile) = state.active_profile().cloned() else {
        return;
    };
    state.tabs.retain(|tab| tab != &profile);
    state.active_tab = state.active_tab.min(state.tabs.len().saturating_sub(1));
    let engine = engine.clone();
    spawn_pass(tx, async move { engine.close_profile(&profile).await });
}

fn hide_selected_group(state: &AppState, engine: &Engine, tx: &Sender<InternalEvent>) {
    let Some(view) = engine.active_view() else {
        return;
    };
    if view.mode != ViewMode::Accordion {
        return;
    }
    let column = view.grouping.get(view.group_keys.len()).cloned();
    let key = view.selectable_groups().get(state.selected_group).cloned();
    if let (Some(column), Some(key)) = (column, key) {
        spawn_edit(engine, tx, move |view| view.hide_group(column, key));
    }
}

fn spawn_edit(
    engine: &Engine,
    tx: &Sender<InternalEvent>,
    edit: impl FnOnce(&mut ViewState) + 'static,
) {
    let engine = engine.clone();
    spawn_pass(tx, async move { engine.edit_view(edit).await });
}

/// Runs a pass in the background so the next key can supersede it.
fn spawn_pass(tx: &Sender<InternalEvent>, pass: impl Future<Output = PassOutcome> + 'static) {
    let sender = tx.clone();
    tokio::task::spawn_local(async move {
        let outcome = pass.await;
        if let Some(message) = describe_outcome(&outcome) {
            let _ = sender.send(InternalEvent::Status(message));
        }
    });
}

fn describe_outcome(outcome: &PassOutcome) -> Option<String> {
    match outcome {
        PassOutcome::Stale | PassOutcome::Reused(_) => None,
        PassOutcome::Idle => Some("nothing to show".to_owned()),
        PassOutcome::Committed(report) if !report.diagnostics.is_empty() => {
            Some(report.diagnostics.join("; "))
        }
        PassOutcome::Committed(report) if report.demoted => {
            Some("no grouping, showing table".to_owned())
        }
        PassOutcome::Committed(_) => None,
    }
}

fn tier_values(view: &ViewState) -> Vec<String> {
    view.rows
        .iter()
        .map(|row| row.cell(TIER_FIELD))
        .filter(|value| !value.is_null())
        .map(|value| value.display())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn toggled_preference(prefs: &Preferences, key: PreferenceKey, tiers: &[String]) -> String {
    match key {
        PreferenceKey::IncludeSideBySide => (!prefs.include_side_by_side).to_string(),
        PreferenceKey::AutoEnrich => (!prefs.auto_enrich).to_string(),
        PreferenceKey::HiddenTier => next_hidden_tier(prefs.hidden_tier.as_deref(), tiers),
    }
}

/// Cycles the hidden tier through `tiers` and back to none (empty string).
fn next_hidden_tier(current: Option<&str>, tiers: &[String]) -> String {
    let next = match current {
        None => tiers.first(),
        Some(current) => tiers
            .iter()
            .position(|tier| tier.eq_ignore_ascii_case(current))
            .and_then(|index| tiers.get(index + 1)),
    };
    next.cloned().unwrap_or_default()
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData, host: &TerminalHost) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let tab_titles = state
        .tabs
        .iter()
        .map(|profile| tab_title(profile, host.highlighted()))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(tab_titles)
        .block(Block::default().title("tabgrid").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(state.active_tab);
    frame.render_widget(tabs, layout[0]);

    match host.mounted() {
        Some(target) => {
            let target = target.borrow();
            match &target.body {
                RenderBody::Table(table) => {
                    render_table(frame, layout[1], table, &target.profile, state.selected_col);
                }
                RenderBody::Accordion(accordion) => {
                    let body = Paragraph::new(accordion_lines(accordion).join("\n")).block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title(format!("{} · grouped", target.profile)),
                    );
                    frame.render_widget(body, layout[1]);
                }
                RenderBody::Empty => {
                    let body = Paragraph::new("no rows").block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title(target.profile.to_string()),
                    );
                    frame.render_widget(body, layout[1]);
                }
            }
        }
        None => {
            let empty = Paragraph::new(String::new())
                .block(Block::default().borders(Borders::ALL));
            frame.render_widget(empty, layout[1]);
        }
    }

    let status = Paragraph::new(status_text(state, view_data, host.is_busy()))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    if view_data.help_visible {
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    table: &TableView,
    profile: &ProfileKey,
    selected_col: usize,
) {
    let widths = vec![Constraint::Min(6); table.header.len().max(1)];
    let header = Row::new(table.header.iter().enumerate().map(|(index, cell)| {
        let mut style = Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD);
        if index == selected_col {
            style = style.fg(Color::Black).bg(Color::Cyan);
        }
        Cell::from(header_label(cell)).style(style)
    }));
    let rows = table
        .rows
        .iter()
        .map(|row| Row::new(row.cells.iter().map(|cell| Cell::from(cell.display()))));

    let widget = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(profile, table))
                .borders(Borders::ALL),
        );
    frame.render_widget(widget, area);
}

fn header_label(cell: &HeaderCell) -> String {
    match cell.sort {
        Some(direction) => format!("{} {}", cell.label, direction.arrow()),
        None => cell.label.clone(),
    }
}

fn table_title(profile: &ProfileKey, table: &TableView) -> String {
    if table.is_complete() {
        format!("{profile} · {} rows", table.rows.len())
    } else {
        format!("{profile} · {}/{} rows", table.rows.len(), table.expected_rows)
    }
}

fn tab_title(profile: &ProfileKey, highlighted: Option<&ProfileKey>) -> String {
    if highlighted == Some(profile) {
        format!("● {profile}")
    } else {
        profile.to_string()
    }
}

fn accordion_lines(accordion: &AccordionView) -> Vec<String> {
    let mut lines = Vec::new();
    push_level_lines(&mut lines, &accordion.root);
    lines
}

fn push_level_lines(lines: &mut Vec<String>, level: &GroupLevel) {
    let indent = "  ".repeat(level.depth);
    for group in &level.groups {
        let mark = if group.open { OPEN_MARK } else { CLOSED_MARK };
        lines.push(format!("{indent}{mark} {} ({})", group.key, group.count));
        if !group.open {
            continue;
        }
        if let Some(children) = &group.children {
            push_level_lines(lines, children);
        }
        for row in &group.rows {
            lines.push(format!("{indent}    {}", row_text(row)));
        }
    }
}

fn row_text(row: &RenderedRow) -> String {
    row.cells
        .iter()
        .map(RenderedCell::display)
        .collect::<Vec<_>>()
        .join(CELL_SEPARATOR)
}

fn status_text(state: &AppState, view_data: &ViewData, busy: bool) -> String {
    if let Some(input) = &view_data.search_input {
        return format!("search: {input}▏ | enter apply | esc cancel");
    }

    let mut parts = Vec::new();
    if busy {
        parts.push("computing b2b…".to_owned());
    }
    if let Some(status) = &state.status_line {
        parts.push(status.clone());
    }
    if let Some(cursor) = &view_data.group_cursor {
        parts.push(format!("group {cursor}"));
    }
    if let Some(filters) = &view_data.filter_summary {
        parts.push(format!("filter {filters}"));
    }
    parts.push("tab/[ ] h/l s g/G v enter/bksp / x/X b a t r w ? q".to_owned());
    parts.join(" | ")
}

fn help_overlay_text() -> &'static str {
    "tab / [ ]   switch profile tab\n\
     h / l       select column\n\
     s           cycle sort on column (asc, desc, original)\n\
     g / G       group by column / drop innermost grouping\n\
     v           toggle table and accordion\n\
     j / k       select group\n\
     enter       open selected group\n\
     backspace   close innermost group\n\
     /           search\n\
     x / X       hide selected group / show all groups\n\
     b           toggle side-by-side chains in b2b depth\n\
     a           toggle automatic b2b depth\n\
     t           cycle hidden tier\n\
     r           reload profile data\n\
     w           close tab\n\
     q           quit"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, InternalEvent, TerminalHost, ViewData, accordion_lines, command_for_key,
        describe_outcome, handle_key_event, header_label, next_hidden_tier, render,
        status_text, sync_from_engine, table_title, toggled_preference,
    };
    use anyhow::{Result, anyhow};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::collections::HashMap;
    use std::sync::mpsc;
    use tabgrid_app::{
        AppCommand, AppState, ColumnKey, PreferenceKey, ProfileKey, ProfilePayload, RowId,
        SortDirection, ViewMode,
    };
    use tabgrid_engine::{
        AccordionView, Engine, EngineBuilder, GroupLevel, GroupNode, HeaderCell, PassOutcome,
        Preferences, RenderedCell, RenderedRow, TableView,
    };
    use tabgrid_testkit::{OfferFaker, ScriptedDepthEngine};
    use tokio::task::LocalSet;

    #[derive(Debug, Default)]
    struct TestRuntime {
        payloads: HashMap<ProfileKey, ProfilePayload>,
        loads: Vec<ProfileKey>,
    }

    impl TestRuntime {
        fn with_profiles(names: &[&str]) -> Self {
            let payloads = names
                .iter()
                .enumerate()
                .map(|(seed, name)| {
                    (
                        ProfileKey::from(*name),
                        OfferFaker::new(seed as u64 + 1).payload(6),
                    )
                })
                .collect();
            Self {
                payloads,
                loads: Vec::new(),
            }
        }
    }

    impl AppRuntime for TestRuntime {
        fn profile_keys(&mut self) -> Result<Vec<ProfileKey>> {
            let mut keys = self.payloads.keys().cloned().collect::<Vec<_>>();
            keys.sort();
            Ok(keys)
        }

        fn load_profile(&mut self, profile: &ProfileKey) -> Result<ProfilePayload> {
            self.loads.push(profile.clone());
            self.payloads
                .get(profile)
                .cloned()
                .ok_or_else(|| anyhow!("no profile {profile}"))
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn engine_with_host() -> (Engine, std::rc::Rc<std::cell::RefCell<TerminalHost>>) {
        let host = TerminalHost::shared();
        let engine = EngineBuilder::new(host.clone(), host.clone())
            .depth_engine(std::rc::Rc::new(ScriptedDepthEngine::new().with_fallback(1)))
            .build();
        (engine, host)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn row(id: i64, text: &str) -> RenderedRow {
        RenderedRow {
            id: RowId::new(id),
            cells: vec![
                RenderedCell::Text(text.to_owned()),
                RenderedCell::Depth(Some(2)),
            ],
        }
    }

    #[test]
    fn keys_map_to_app_commands() {
        assert_eq!(command_for_key(key(KeyCode::Tab)), Some(AppCommand::NextTab));
        assert_eq!(command_for_key(key(KeyCode::Char('s'))), Some(AppCommand::SortSelected));
        assert_eq!(command_for_key(key(KeyCode::Char('G'))), Some(AppCommand::PopGrouping));
        assert_eq!(
            command_for_key(key(KeyCode::Char('t'))),
            Some(AppCommand::TogglePreference(PreferenceKey::HiddenTier))
        );
        assert_eq!(command_for_key(key(KeyCode::Char('z'))), None);
    }

    #[test]
    fn hidden_tier_cycles_back_to_none() {
        let tiers = vec!["balcony".to_owned(), "suite".to_owned()];
        assert_eq!(next_hidden_tier(None, &tiers), "balcony");
        assert_eq!(next_hidden_tier(Some("Balcony"), &tiers), "suite");
        assert_eq!(next_hidden_tier(Some("suite"), &tiers), "");
        assert_eq!(next_hidden_tier(Some("gone"), &tiers), "");
        assert_eq!(next_hidden_tier(None, &[]), "");
    }

    #[test]
    fn flags_toggle_from_current_preferences() {
        let prefs = Preferences::default();
        assert_eq!(
            toggled_preference(&prefs, PreferenceKey::IncludeSideBySide, &[]),
            "false"
        );
        let prefs = Preferences {
            auto_enrich: false,
            ..Preferences::default()
        };
        assert_eq!(toggled_preference(&prefs, PreferenceKey::AutoEnrich, &[]), "true");
    }

    #[test]
    fn header_shows_sort_arrow() {
        let mut cell = HeaderCell {
            label: "Ship".to_owned(),
            column: ColumnKey::field("ship"),
            sort: None,
        };
        assert_eq!(header_label(&cell), "Ship");
        cell.sort = Some(SortDirection::Desc);
        assert_eq!(header_label(&cell), "Ship ↓");
    }

    #[test]
    fn table_title_reports_progress() {
        let table = TableView {
            header: Vec::new(),
            rows: vec![row(1, "a")],
            expected_rows: 3,
        };
        assert_eq!(table_title(&ProfileKey::from("p"), &table), "p · 1/3 rows");
    }

    #[test]
    fn accordion_lines_indent_open_groups() {
        let accordion = AccordionView {
            header: Vec::new(),
            root: GroupLevel {
                column: ColumnKey::field("ship"),
                depth: 0,
                groups: vec![
                    GroupNode {
                        key: "Nova".to_owned(),
                        path: "Nova".to_owned(),
                        count: 1,
                        open: true,
                        children: None,
                        rows: vec![row(1, "Miami")],
                    },
                    GroupNode {
                        key: "Atlas".to_owned(),
                        path: "Atlas".to_owned(),
                        count: 4,
                        open: false,
                        children: None,
                        rows: Vec::new(),
                    },
                ],
            },
        };
        assert_eq!(
            accordion_lines(&accordion),
            vec![
                "▾ Nova (1)".to_owned(),
                "    Miami │ 2".to_owned(),
                "▸ Atlas (4)".to_owned(),
            ]
        );
    }

    #[test]
    fn status_text_prefers_search_prompt() {
        let state = AppState::default();
        let mut view_data = ViewData::default();
        assert!(status_text(&state, &view_data, true).starts_with("computing b2b"));

        view_data.search_input = Some("nov".to_owned());
        assert!(status_text(&state, &view_data, true).starts_with("search: nov"));
    }

    #[test]
    fn quiet_outcomes_leave_status_alone() {
        assert_eq!(describe_outcome(&PassOutcome::Stale), None);
        assert_eq!(
            describe_outcome(&PassOutcome::Idle),
            Some("nothing to show".to_owned())
        );
    }

    #[tokio::test]
    async fn tab_keys_load_then_switch_profiles() {
        LocalSet::new()
            .run_until(async {
                let (engine, host) = engine_with_host();
                let mut runtime = TestRuntime::with_profiles(&["a", "b"]);
                let mut state = AppState::with_tabs(runtime.profile_keys().expect("keys"));
                let mut view_data = ViewData::default();
                let (tx, _rx) = mpsc::channel::<InternalEvent>();

                for _ in 0..3 {
                    let quit = handle_key_event(
                        &mut state,
                        &mut runtime,
                        &engine,
                        &mut view_data,
                        &tx,
                        key(KeyCode::Tab),
                    );
                    assert!(!quit);
                    settle().await;
                }

                assert_eq!(
                    runtime.loads,
                    vec![ProfileKey::from("b"), ProfileKey::from("a")]
                );
                assert_eq!(engine.active_profile(), Some(ProfileKey::from("b")));
                assert_eq!(host.borrow().highlighted(), Some(&ProfileKey::from("b")));
            })
            .await;
    }

    #[tokio::test]
    async fn grouping_keys_drive_accordion() {
        LocalSet::new()
            .run_until(async {
                let (engine, host) = engine_with_host();
                let mut runtime = TestRuntime::with_profiles(&["a"]);
                let mut state = AppState::with_tabs(vec![ProfileKey::from("a")]);
                let mut view_data = ViewData::default();
                let (tx, _rx) = mpsc::channel::<InternalEvent>();
                let payload = runtime.load_profile(&ProfileKey::from("a")).expect("payload");
                let _ = engine.load_profile(ProfileKey::from("a"), payload).await;
                sync_from_engine(&mut state, &mut view_data, &engine);

                for code in [KeyCode::Char('g'), KeyCode::Enter] {
                    handle_key_event(&mut state, &mut runtime, &engine, &mut view_data, &tx, key(code));
                    settle().await;
                    sync_from_engine(&mut state, &mut view_data, &engine);
                }

                let view = engine.active_view().expect("active view");
                assert_eq!(view.mode, ViewMode::Accordion);
                assert_eq!(view.grouping, vec![ColumnKey::field("ship")]);
                assert_eq!(view.group_keys.len(), 1);

                let backend = TestBackend::new(100, 20);
                let mut terminal = Terminal::new(backend).expect("terminal");
                terminal
                    .draw(|frame| render(frame, &state, &view_data, &host.borrow()))
                    .expect("draw");
                let screen = terminal
                    .backend()
                    .buffer()
                    .content()
                    .iter()
                    .map(|cell| cell.symbol())
                    .collect::<String>();
                assert!(screen.contains("grouped"));
                assert!(screen.contains("▾"));

                assert!(handle_key_event(
                    &mut state,
                    &mut runtime,
                    &engine,
                    &mut view_data,
                    &tx,
                    key(KeyCode::Char('q')),
                ));
            })
            .await;
    }
}
