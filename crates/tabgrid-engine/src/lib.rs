// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! View synchronization and computation-cache engine for the tabbed grid.
//!
//! Everything here runs on one thread inside a [`tokio::task::LocalSet`]:
//! state is shared through `Rc<RefCell<_>>` and no borrow is held across an
//! `.await`. Stale work is never cancelled; it is discarded at commit time by
//! comparing [`SwitchToken`]s.

pub mod busy;
pub mod enrichment;
pub mod filter;
pub mod grouping;
pub mod orchestrator;
pub mod prefs;
pub mod profile;
pub mod render;
pub mod session;
pub mod sort;
pub mod token;
pub mod view;

pub use busy::{
    BusyGuard, BusyIndicator, BusyIndicatorSession, BusySessionId, DEFAULT_BUSY_TIMEOUT,
};
pub use enrichment::{
    DEFAULT_DEPTH, DepthEngine, DepthOptions, DepthTable, EnrichmentCoordinator,
    EnrichmentLease, EnrichmentOutcome, EnrichmentRequest, SkipReason,
};
pub use filter::{FilterState, RowFilter, StandardFilter, TIER_FIELD};
pub use grouping::{GroupRender, GroupRequest, RowGroup, group_rows, prune_group_keys};
pub use orchestrator::{
    CommitReport, DEFAULT_BATCH_SIZE, Engine, EngineBuilder, EngineConfig, PassOutcome, PassStage,
    PatchReport,
};
pub use prefs::{MemoryPreferences, PreferenceStore, Preferences};
pub use profile::{ProfileCache, ProfileCacheEntry, RebuildPolicy};
pub use render::{
    AccordionView, GroupLevel, GroupNode, HeaderCell, HostSurface, RenderBody, RenderTarget,
    RenderedCell, RenderedRow, TableView, TargetHandle,
};
pub use session::{Admission, SessionContext};
pub use sort::SortCache;
pub use tabgrid_app::SwitchToken;
pub use token::TokenAuthority;
pub use view::ViewState;
