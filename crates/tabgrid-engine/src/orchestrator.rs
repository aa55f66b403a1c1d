// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! The render pass. Every UI action ends in [`Engine::update_view`], which
//! validates its token, filters, sorts, commits a table or accordion body to
//! the view's render target, and leaves background tasks (progressive rows,
//! depth patches) that re-check the token before touching the target.

use anyhow::{Context, Result};
use std::cell::{Ref, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;
use tabgrid_app::{PreferenceKey, ProfileKey, ProfilePayload, Row, RowId, SwitchToken, ViewMode};
use tokio::task::JoinHandle;

use crate::busy::{BusyIndicator, BusyIndicatorSession, DEFAULT_BUSY_TIMEOUT};
use crate::enrichment::{
    DEFAULT_DEPTH, DepthEngine, DepthTable, EnrichmentCoordinator, EnrichmentOutcome,
    EnrichmentRequest, SkipReason,
};
use crate::filter::{RowFilter, StandardFilter};
use crate::grouping::{GroupRequest, prune_group_keys, render_level};
use crate::prefs::{MemoryPreferences, PreferenceStore, Preferences};
use crate::profile::RebuildPolicy;
use crate::render::{
    AccordionView, HostSurface, RenderBody, TableView, TargetHandle, build_header, render_rows,
};
use crate::session::{Admission, SessionContext};
use crate::view::ViewState;

pub const DEFAULT_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub busy_timeout: Duration,
    /// Rows committed synchronously in table mode; the rest are appended in
    /// batches of this size.
    pub batch_size: usize,
    pub rebuild_policy: RebuildPolicy,
    pub enrichment_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            rebuild_policy: RebuildPolicy::default(),
            enrichment_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStage {
    Validating,
    Filtering,
    Sorting,
    Rendering(ViewMode),
    Enriching,
    Highlighting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchReport {
    Patched { rows: usize },
    /// The token or the target moved on before the depths arrived.
    Discarded,
    Skipped(SkipReason),
}

#[derive(Debug)]
pub struct CommitReport {
    pub token: SwitchToken,
    pub profile: ProfileKey,
    pub mode: ViewMode,
    pub adopted: bool,
    pub demoted: bool,
    pub rows_rendered: usize,
    pub rows_total: usize,
    pub opened: Vec<String>,
    pub highlighted: bool,
    pub diagnostics: Vec<String>,
    /// Remaining table batches; resolves to the number of rows appended.
    pub progressive: Option<JoinHandle<usize>>,
    pub enrichment: JoinHandle<PatchReport>,
}

#[derive(Debug)]
pub enum PassOutcome {
    /// Dropped at validation or at the pre-commit recheck.
    Stale,
    Committed(CommitReport),
    /// A cached target was remounted without a pass.
    Reused(ProfileKey),
    /// No active view to act on.
    Idle,
}

impl PassOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn into_report(self) -> Option<CommitReport> {
        match self {
            Self::Committed(report) => Some(report),
            Self::Stale | Self::Reused(_) | Self::Idle => None,
        }
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    host: Rc<RefCell<dyn HostSurface>>,
    busy: Rc<RefCell<dyn BusyIndicator>>,
    filter: Option<Rc<dyn RowFilter>>,
    preferences: Option<Rc<RefCell<dyn PreferenceStore>>>,
    depth_engine: Option<Rc<dyn DepthEngine>>,
}

impl EngineBuilder {
    pub fn new(host: Rc<RefCell<dyn HostSurface>>, busy: Rc<RefCell<dyn BusyIndicator>>) -> Self {
        Self {
            config: EngineConfig::default(),
            host,
            busy,
            filter: None,
            preferences: None,
            depth_engine: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn filter(mut self, filter: Rc<dyn RowFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn preferences(mut self, store: Rc<RefCell<dyn PreferenceStore>>) -> Self {
        self.preferences = Some(store);
        self
    }

    pub fn depth_engine(mut self, engine: Rc<dyn DepthEngine>) -> Self {
        self.depth_engine = Some(engine);
        self
    }

    pub fn build(self) -> Engine {
        let depth_engine = self.depth_engine.filter(|_| self.config.enrichment_enabled);
        if depth_engine.is_none() {
            tracing::info!("b2b depth enrichment unavailable");
        }
        let preferences = self
            .preferences
            .unwrap_or_else(|| Rc::new(RefCell::new(MemoryPreferences::new())));
        Engine {
            inner: Rc::new(EngineInner {
                busy: BusyIndicatorSession::new(self.busy, self.config.busy_timeout),
                config: self.config,
                session: RefCell::new(SessionContext::new()),
                filter: self.filter.unwrap_or_else(|| Rc::new(StandardFilter)),
                enrichment: EnrichmentCoordinator::new(depth_engine),
                host: self.host,
                preferences,
            }),
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    session: RefCell<SessionContext>,
    filter: Rc<dyn RowFilter>,
    enrichment: EnrichmentCoordinator,
    busy: BusyIndicatorSession,
    host: Rc<RefCell<dyn HostSurface>>,
    preferences: Rc<RefCell<dyn PreferenceStore>>,
}

/// Handle to the view engine. Cheap to clone; every clone drives the same
/// session. Passes spawn local tasks and must run inside a
/// [`tokio::task::LocalSet`].
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn session(&self) -> Ref<'_, SessionContext> {
        self.inner.session.borrow()
    }

    pub fn enrichment(&self) -> &EnrichmentCoordinator {
        &self.inner.enrichment
    }

    pub fn busy(&self) -> &BusyIndicatorSession {
        &self.inner.busy
    }

    pub fn preferences(&self) -> Preferences {
        Preferences::load(&*self.inner.preferences.borrow())
    }

    pub fn active_profile(&self) -> Option<ProfileKey> {
        self.session().active.clone()
    }

    pub fn active_view(&self) -> Option<ViewState> {
        self.session().active_view().cloned()
    }

    pub fn active_target(&self) -> Option<TargetHandle> {
        self.session()
            .active_view()
            .map(|view| Rc::clone(&view.target))
    }

    pub fn tabs(&self) -> Vec<ProfileKey> {
        self.session().tabs.clone()
    }

    pub fn current_token(&self) -> Option<SwitchToken> {
        self.session().authority.current()
    }

    pub fn is_current(&self, token: &SwitchToken) -> bool {
        self.session().authority.is_current(token)
    }

    /// Opens (or re-opens) `profile` with fresh data. A cached view lends its
    /// sort, grouping and filters; if that fails the view is built fresh.
    pub async fn load_profile(&self, profile: ProfileKey, payload: ProfilePayload) -> PassOutcome {
        let (view, token) = {
            let mut session = self.inner.session.borrow_mut();
            let token = session.authority.mint();
            session.stash_active();
            session.open_tab(&profile);
            session.set_active(&profile);
            let view = match session.cache.get(&profile) {
                Some(entry) => view_from_cache(&entry.view, &payload),
                None => ViewState::from_payload(profile.clone(), &payload),
            };
            session.stage(&view);
            (view, token)
        };
        self.update_view(view, token).await
    }

    /// Switches to an open profile. Without a payload the cached view is
    /// re-rendered (or its target remounted under
    /// [`RebuildPolicy::ReuseIfFresh`]).
    pub async fn switch_profile(
        &self,
        profile: ProfileKey,
        payload: Option<ProfilePayload>,
    ) -> PassOutcome {
        let (view, token) = {
            let mut session = self.inner.session.borrow_mut();
            let Some(entry) = session.cache.get(&profile).cloned() else {
                drop(session);
                return match payload {
                    Some(payload) => self.load_profile(profile, payload).await,
                    None => {
                        tracing::warn!(%profile, "switch to a profile that was never loaded");
                        PassOutcome::Idle
                    }
                };
            };

            let token = session.authority.mint();
            session.stash_active();
            session.open_tab(&profile);
            session.set_active(&profile);

            if self.inner.config.rebuild_policy == RebuildPolicy::ReuseIfFresh
                && payload.is_none()
                && entry.is_fresh()
            {
                tracing::debug!(%profile, "remounting cached target");
                session.pending = None;
                session.view = Some(entry.view);
                drop(session);
                let mut host = self.inner.host.borrow_mut();
                host.mount(entry.target);
                host.highlight_tab(&profile);
                return PassOutcome::Reused(profile);
            }

            let view = match &payload {
                Some(payload) => view_from_cache(&entry.view, payload),
                None => entry.view.rebuilt(),
            };
            session.stage(&view);
            (view, token)
        };
        self.update_view(view, token).await
    }

    /// Re-renders the active view under the current token.
    pub async fn refresh(&self) -> PassOutcome {
        let pending = {
            let mut session = self.inner.session.borrow_mut();
            let token = match session.authority.current() {
                Some(token) => token,
                None => session.authority.mint(),
            };
            session.active_view().cloned().map(|view| (view, token))
        };
        match pending {
            Some((view, token)) => self.update_view(view, token).await,
            None => PassOutcome::Idle,
        }
    }

    /// Applies a UI edit to a copy of the active view and renders it under a
    /// fresh token, superseding any pass still in flight.
    pub async fn edit_view(&self, edit: impl FnOnce(&mut ViewState)) -> PassOutcome {
        let pending = {
            let mut session = self.inner.session.borrow_mut();
            match session.active_view().cloned() {
                Some(mut view) => {
                    edit(&mut view);
                    session.stage(&view);
                    Some((view, session.authority.mint()))
                }
                None => None,
            }
        };
        match pending {
            Some((view, token)) => self.update_view(view, token).await,
            None => PassOutcome::Idle,
        }
    }

    /// Closes a tab. When it was the active one, the next active profile is
    /// rendered from its cached view.
    pub async fn close_profile(&self, profile: &ProfileKey) -> PassOutcome {
        let (was_active, next) = {
            let mut session = self.inner.session.borrow_mut();
            let was_active = session.active.as_ref() == Some(profile);
            (was_active, session.close_tab(profile))
        };
        match next {
            Some(next) if was_active => self.switch_profile(next, None).await,
            _ => PassOutcome::Idle,
        }
    }

    /// Persists a preference, drops every depth computed under the old value
    /// and re-renders the active view.
    pub async fn set_preference(&self, key: PreferenceKey, value: &str) -> Result<PassOutcome> {
        self.inner
            .preferences
            .borrow_mut()
            .set(key, value)
            .with_context(|| format!("saving preference {}", key.as_str()))?;
        self.inner.enrichment.reset();

        let pending = {
            let mut guard = self.inner.session.borrow_mut();
            let session = &mut *guard;
            let token = session.authority.mint();
            session.cache.clear_depths();
            for view in [session.view.as_mut(), session.pending.as_mut()]
                .into_iter()
                .flatten()
            {
                view.clear_depths();
            }
            match session.active_view().cloned() {
                Some(view) => {
                    session.stage(&view);
                    Some((view, token))
                }
                None => None,
            }
        };
        Ok(match pending {
            Some((view, token)) => self.update_view(view, token).await,
            None => PassOutcome::Idle,
        })
    }

    /// One render pass for `view` under `token`.
    pub async fn update_view(&self, mut view: ViewState, token: SwitchToken) -> PassOutcome {
        trace_stage(PassStage::Validating, &token);
        let admission = self.inner.session.borrow_mut().admit(&view, &token);
        if admission == Admission::Stale {
            tracing::debug!(%token, profile = %view.profile, "stale pass dropped");
            return PassOutcome::Stale;
        }

        // An accordion with nothing to group by restarts once as a table pass;
        // admission already passed and does not depend on the mode.
        let demoted = view.mode == ViewMode::Accordion && view.grouping.is_empty();
        if demoted {
            tracing::debug!(%token, "accordion without grouping, rendering as table");
            view.mode = ViewMode::Table;
        }

        trace_stage(PassStage::Filtering, &token);
        let prefs = self.preferences();
        view.filters.hidden_tier = prefs.hidden_tier.clone();
        view.filtered = self.inner.filter.filter_rows(&view);
        let context = view
            .rows
            .iter()
            .filter(|row| !self.inner.filter.is_row_hidden(row, &view))
            .cloned()
            .collect::<Vec<_>>();

        trace_stage(PassStage::Sorting, &token);
        if view
            .sort
            .as_ref()
            .is_some_and(|sort| sort.column.requires_enrichment())
        {
            let request = EnrichmentRequest::new(
                token,
                context.iter().map(|row| row.id),
                &view.depths,
                context.clone(),
                prefs.depth_options(),
                prefs.auto_enrich,
            );
            let targets = request.targets.clone();
            let outcome = {
                let _busy = self.inner.busy.guard();
                self.inner.enrichment.ensure(request).await
            };
            match outcome {
                EnrichmentOutcome::Computed(computed) => {
                    view.merge_depths(&complete_depths(&targets, &computed));
                }
                EnrichmentOutcome::Skipped(SkipReason::Unavailable) => {
                    view.merge_depths(&complete_depths(&targets, &DepthTable::new()));
                }
                EnrichmentOutcome::Skipped(_) => {}
            }
        }
        view.sorted = view.sort_cache.sorted_view(
            &view.rows,
            &view.filtered,
            view.sort.as_ref(),
            &view.depths,
        );

        if view.mode == ViewMode::Accordion {
            let dropped = prune_group_keys(
                &view.rows,
                &view.sorted,
                &view.grouping,
                &mut view.group_keys,
                &view.depths,
            );
            if dropped > 0 {
                tracing::debug!(%token, dropped, "pruned group keys");
                self.inner.session.borrow_mut().resolve_active_profile();
            }
        }

        if !self.is_current(&token) {
            tracing::debug!(%token, profile = %view.profile, "pass superseded before commit");
            return PassOutcome::Stale;
        }

        trace_stage(PassStage::Rendering(view.mode), &token);
        let target = Rc::clone(&view.target);
        let header = build_header(&view);
        let rows_total = view.sorted.len();
        let mut opened = Vec::new();
        let mut progressive = None;
        let rows_rendered = match view.mode {
            ViewMode::Table => {
                let first = rows_total.min(self.inner.config.batch_size.max(1));
                let rows = render_rows(&view.rows, &view.sorted[..first], &view.columns, &view.depths);
                let revision = target.borrow_mut().commit(
                    RenderBody::Table(TableView {
                        header,
                        rows,
                        expected_rows: rows_total,
                    }),
                    token,
                );
                if first < rows_total {
                    progressive = Some(self.spawn_progressive(&view, first, revision, token));
                }
                first
            }
            ViewMode::Accordion => {
                let request = GroupRequest {
                    rows: &view.rows,
                    grouping: &view.grouping,
                    group_keys: &view.group_keys,
                    open_paths: &view.open_paths,
                    group_sorts: &view.group_sorts,
                    columns: &view.columns,
                    depths: &view.depths,
                };
                let (body, leaf_rows) = match render_level(&request, &view.sorted, 0, "") {
                    Some(render) => {
                        opened = render.opened;
                        (
                            RenderBody::Accordion(AccordionView {
                                header,
                                root: render.level,
                            }),
                            render.leaf_rows,
                        )
                    }
                    None => (RenderBody::Empty, 0),
                };
                target.borrow_mut().commit(body, token);
                leaf_rows
            }
        };
        view.committed = Some(token);

        let profile = view.profile.clone();
        let mode = view.mode;
        let request = EnrichmentRequest::new(
            token,
            view.sorted.iter().map(|index| view.rows[*index].id),
            &view.depths,
            context,
            prefs.depth_options(),
            prefs.auto_enrich,
        );
        self.inner.session.borrow_mut().commit_view(view);
        self.inner.host.borrow_mut().mount(Rc::clone(&target));

        trace_stage(PassStage::Enriching, &token);
        let enrichment = self.spawn_enrichment(request, Rc::clone(&target), profile.clone());

        let mut highlighted = false;
        let mut diagnostics = Vec::new();
        if self.is_current(&token) {
            trace_stage(PassStage::Highlighting, &token);
            self.inner.host.borrow_mut().highlight_tab(&profile);
            highlighted = true;
            diagnostics = diagnose(&target, rows_rendered);
            for message in &diagnostics {
                tracing::warn!(%token, %profile, "render diagnostic: {message}");
            }
        }

        PassOutcome::Committed(CommitReport {
            token,
            profile,
            mode,
            adopted: admission == Admission::Adopted,
            demoted,
            rows_rendered,
            rows_total,
            opened,
            highlighted,
            diagnostics,
            progressive,
            enrichment,
        })
    }

    fn spawn_progressive(
        &self,
        view: &ViewState,
        start: usize,
        revision: u64,
        token: SwitchToken,
    ) -> JoinHandle<usize> {
        let engine = self.clone();
        let target = Rc::clone(&view.target);
        let rows: Rc<[Row]> = Rc::clone(&view.rows);
        let remaining = view.sorted[start..].to_vec();
        let columns = view.columns.clone();
        let depths = view.depths.clone();
        let batch_size = self.inner.config.batch_size.max(1);

        tokio::task::spawn_local(async move {
            let mut appended = 0;
            for batch in remaining.chunks(batch_size) {
                tokio::task::yield_now().await;
                if !engine.is_current(&token) || target.borrow().revision != revision {
                    tracing::debug!(%token, appended, "progressive render superseded");
                    break;
                }
                let rendered = render_rows(&rows, batch, &columns, &depths);
                appended += target.borrow_mut().append_rows(rendered);
            }
            appended
        })
    }

    fn spawn_enrichment(
        &self,
        request: EnrichmentRequest,
        target: TargetHandle,
        profile: ProfileKey,
    ) -> JoinHandle<PatchReport> {
        let engine = self.clone();
        tokio::task::spawn_local(async move {
            let token = request.token;
            let targets = request.targets.clone();
            // Without an engine every row shows the default depth.
            let (computed, skipped) = match engine.inner.enrichment.ensure(request).await {
                EnrichmentOutcome::Computed(computed) => (computed, None),
                EnrichmentOutcome::Skipped(SkipReason::Unavailable) => (
                    Rc::new(DepthTable::new()),
                    Some(SkipReason::Unavailable),
                ),
                EnrichmentOutcome::Skipped(reason) => return PatchReport::Skipped(reason),
            };
            if !engine.is_current(&token) || !target.borrow().is_committed_under(&token) {
                tracing::debug!(%token, %profile, "discarding stale depth patch");
                return PatchReport::Discarded;
            }
            let depths = Rc::new(complete_depths(&targets, &computed));
            let rows = target.borrow_mut().patch_depths(Rc::clone(&depths));
            engine
                .inner
                .session
                .borrow_mut()
                .merge_depths(&profile, &depths);
            match skipped {
                Some(reason) => {
                    tracing::debug!(%token, %profile, rows, "filled default b2b depths");
                    PatchReport::Skipped(reason)
                }
                None => {
                    tracing::debug!(%token, %profile, rows, "patched b2b depths");
                    PatchReport::Patched { rows }
                }
            }
        })
    }
}

fn trace_stage(stage: PassStage, token: &SwitchToken) {
    tracing::debug!(?stage, %token, "render pass");
}

fn view_from_cache(cached: &ViewState, payload: &ProfilePayload) -> ViewState {
    ViewState::rebuild_from_cached(cached, payload).unwrap_or_else(|error| {
        tracing::warn!(profile = %cached.profile, "cached view unusable, building fresh: {error:#}");
        ViewState::from_payload(cached.profile.clone(), payload)
    })
}

/// Computed depths for `targets`, with [`DEFAULT_DEPTH`] for any the engine
/// left out.
fn complete_depths(targets: &[RowId], computed: &DepthTable) -> DepthTable {
    let mut depths = computed.clone();
    for id in targets {
        depths.entry(*id).or_insert(DEFAULT_DEPTH);
    }
    depths
}

fn diagnose(target: &TargetHandle, expected: usize) -> Vec<String> {
    let target = target.borrow();
    let rows = target.rows();
    let mut diagnostics = Vec::new();
    let mut seen = HashSet::new();
    let duplicates = rows.iter().filter(|row| !seen.insert(row.id)).count();
    if duplicates > 0 {
        diagnostics.push(format!("{duplicates} duplicate row ids in committed body"));
    }
    if rows.len() != expected {
        diagnostics.push(format!(
            "committed {} rows but rendered {expected}",
            rows.len()
        ));
    }
    diagnostics
}
