// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tabgrid_app::{
    CellValue, ColumnKey, PreferenceKey, ProfilePayload, RowId, SortDirection, SortSpec, ViewMode,
};
use tabgrid_engine::{
    CommitReport, DEFAULT_DEPTH, Engine, EngineBuilder, EngineConfig, PassOutcome, PatchReport, RebuildPolicy,
    RenderBody, SkipReason, TargetHandle,
};
use tabgrid_testkit::{OfferFaker, RecordingHost, ScriptedDepthEngine, profile};
use tokio::task::LocalSet;

struct Harness {
    engine: Engine,
    host: Rc<RefCell<RecordingHost>>,
    depths: ScriptedDepthEngine,
}

fn harness(config: EngineConfig) -> Harness {
    let host = RecordingHost::shared();
    let depths = ScriptedDepthEngine::new().with_fallback(2);
    let engine = EngineBuilder::new(host.clone(), host.clone())
        .config(config)
        .depth_engine(Rc::new(depths.clone()))
        .build();
    Harness {
        engine,
        host,
        depths,
    }
}

fn offers(seed: u64, count: usize, id_offset: i64) -> ProfilePayload {
    let mut payload = OfferFaker::new(seed).payload(count);
    for row in &mut payload.rows {
        row.id = RowId::new(row.id.get() + id_offset);
    }
    payload
}

fn committed(outcome: PassOutcome) -> CommitReport {
    match outcome {
        PassOutcome::Committed(report) => report,
        other => panic!("expected a committed pass, got {other:?}"),
    }
}

fn mounted(host: &Rc<RefCell<RecordingHost>>) -> TargetHandle {
    match &host.borrow().mounted {
        Some(target) => Rc::clone(target),
        None => panic!("nothing mounted"),
    }
}

fn row_ids(target: &TargetHandle) -> Vec<i64> {
    target.borrow().rows().iter().map(|row| row.id.get()).collect()
}

async fn settle(report: CommitReport) -> PatchReport {
    if let Some(progressive) = report.progressive {
        progressive.await.expect("progressive task");
    }
    report.enrichment.await.expect("enrichment task")
}

#[tokio::test]
async fn switching_back_renders_only_the_original_profile() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            let a = offers(1, 10, 0);
            let b = offers(2, 6, 1_000);

            settle(committed(h.engine.load_profile(profile("a"), a.clone()).await)).await;
            let report = committed(
                h.engine
                    .edit_view(|view| {
                        view.sort = Some(SortSpec::desc(ColumnKey::field("sail_date")));
                    })
                    .await,
            );
            settle(report).await;
            let first_target = mounted(&h.host);

            settle(committed(h.engine.load_profile(profile("b"), b).await)).await;
            assert_eq!(h.host.borrow().mounted_profile(), Some(profile("b")));

            let report = committed(h.engine.switch_profile(profile("a"), None).await);
            assert_eq!(report.profile, profile("a"));
            settle(report).await;

            let target = mounted(&h.host);
            assert!(!Rc::ptr_eq(&target, &first_target));
            let ids = row_ids(&target);
            assert_eq!(ids.len(), 10);
            assert!(ids.iter().all(|id| *id <= 10));

            let dates = ids
                .iter()
                .map(|id| a.rows[(*id - 1) as usize].cell("sail_date").clone())
                .collect::<Vec<_>>();
            assert!(dates.windows(2).all(|pair| pair[0].cmp_value(&pair[1]).is_ge()));
            let header_sort = target
                .borrow()
                .header()
                .iter()
                .find(|cell| cell.column == ColumnKey::field("sail_date"))
                .and_then(|cell| cell.sort);
            assert_eq!(header_sort, Some(SortDirection::Desc));
            assert_eq!(h.host.borrow().highlights.last(), Some(&profile("a")));
        })
        .await;
}

#[tokio::test]
async fn rapid_resort_commits_only_the_latest_sort() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            settle(committed(h.engine.load_profile(profile("a"), offers(3, 12, 0)).await)).await;
            h.depths.hold();

            let engine = h.engine.clone();
            let by_depth = tokio::task::spawn_local(async move {
                engine
                    .edit_view(|view| {
                        view.clear_depths();
                        view.cycle_sort(&ColumnKey::B2bDepth);
                    })
                    .await
            });
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            assert!(h.host.borrow().busy_visible);

            let report = committed(
                h.engine
                    .edit_view(|view| view.cycle_sort(&ColumnKey::field("ship")))
                    .await,
            );
            let ship_token = report.token;

            h.depths.release();
            let stale = by_depth.await.expect("depth sort task");
            assert!(matches!(stale, PassOutcome::Stale));
            assert!(!h.host.borrow().busy_visible);

            let target = mounted(&h.host);
            assert!(target.borrow().is_committed_under(&ship_token));
            let sorted_on = target
                .borrow()
                .header()
                .iter()
                .find(|cell| cell.sort.is_some())
                .map(|cell| cell.column.clone());
            assert_eq!(sorted_on, Some(ColumnKey::field("ship")));
        })
        .await;
}

#[tokio::test]
async fn passes_under_one_token_share_one_computation() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            h.depths.hold();

            let load = committed(h.engine.load_profile(profile("a"), offers(4, 8, 0)).await);
            let first = committed(h.engine.refresh().await);
            let second = committed(h.engine.refresh().await);
            assert_eq!(load.token, first.token);
            assert_eq!(first.token, second.token);

            h.depths.release();
            for report in [load, first, second] {
                assert!(matches!(settle(report).await, PatchReport::Patched { .. }));
            }
            assert_eq!(h.depths.calls(), 1);
            assert_eq!(h.engine.enrichment().in_flight(), 0);

            let target = mounted(&h.host);
            assert!(target.borrow().rows().iter().all(|row| row.depth() == Some(2)));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn hung_depth_sort_clears_busy_indicator_after_timeout() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig {
                busy_timeout: Duration::from_millis(1500),
                ..EngineConfig::default()
            });
            settle(committed(h.engine.load_profile(profile("a"), offers(5, 5, 0)).await)).await;
            h.depths.hold();

            let engine = h.engine.clone();
            let _pending = tokio::task::spawn_local(async move {
                engine
                    .edit_view(|view| {
                        view.clear_depths();
                        view.cycle_sort(&ColumnKey::B2bDepth);
                    })
                    .await
            });

            tokio::time::sleep(Duration::from_millis(1400)).await;
            assert!(h.host.borrow().busy_visible);
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(!h.host.borrow().busy_visible);
            assert_eq!(h.engine.busy().owner(), None);
            assert_eq!(h.engine.enrichment().in_flight(), 1);
        })
        .await;
}

#[tokio::test]
async fn depth_patch_for_abandoned_tab_is_discarded() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            h.depths.hold();

            let a = committed(h.engine.load_profile(profile("a"), offers(6, 6, 0)).await);
            let a_target = mounted(&h.host);
            let b = committed(h.engine.load_profile(profile("b"), offers(7, 6, 100)).await);

            h.depths.release();
            assert_eq!(settle(a).await, PatchReport::Discarded);
            assert!(matches!(settle(b).await, PatchReport::Patched { rows: 6 }));
            assert!(a_target.borrow().rows().iter().all(|row| row.depth().is_none()));
            assert_eq!(h.host.borrow().mounted_profile(), Some(profile("b")));
        })
        .await;
}

#[tokio::test]
async fn progressive_batches_receive_depths() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig {
                batch_size: 4,
                ..EngineConfig::default()
            });
            h.depths.set_depth(RowId::new(9), 5);

            let report = committed(h.engine.load_profile(profile("a"), offers(8, 10, 0)).await);
            assert_eq!(report.rows_rendered, 4);
            assert_eq!(report.rows_total, 10);
            assert!(report.progressive.is_some());
            assert!(report.diagnostics.is_empty());
            settle(report).await;

            let target = mounted(&h.host);
            let target = target.borrow();
            assert_eq!(target.rows().len(), 10);
            assert_eq!(target.row(RowId::new(9)).and_then(|row| row.depth()), Some(5));
            assert!(target.rows().iter().all(|row| row.depth().is_some()));
            let RenderBody::Table(table) = &target.body else {
                panic!("table mode");
            };
            assert!(table.is_complete());
        })
        .await;
}

#[tokio::test]
async fn accordion_without_grouping_renders_as_table() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            settle(committed(h.engine.load_profile(profile("a"), offers(9, 5, 0)).await)).await;

            let report = committed(
                h.engine
                    .edit_view(|view| view.set_mode(ViewMode::Accordion))
                    .await,
            );
            assert!(report.demoted);
            assert_eq!(report.mode, ViewMode::Table);
            assert!(matches!(mounted(&h.host).borrow().body, RenderBody::Table(_)));
            assert_eq!(
                h.engine.active_view().map(|view| view.mode),
                Some(ViewMode::Table)
            );
        })
        .await;
}

#[tokio::test]
async fn hiding_selected_group_prunes_key_stack() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            settle(committed(h.engine.load_profile(profile("a"), offers(10, 30, 0)).await)).await;

            settle(committed(
                h.engine
                    .edit_view(|view| {
                        view.push_grouping(ColumnKey::field("ship"));
                        view.push_grouping(ColumnKey::field("tier"));
                    })
                    .await,
            ))
            .await;
            let Some(ship) = h
                .engine
                .active_view()
                .and_then(|view| view.selectable_groups().first().cloned())
            else {
                panic!("offers have ships");
            };

            let opened = ship.clone();
            let report = committed(
                h.engine
                    .edit_view(move |view| view.open_group(opened))
                    .await,
            );
            assert_eq!(report.opened, vec![ship.clone()]);
            assert_eq!(report.mode, ViewMode::Accordion);
            settle(report).await;

            let hidden = ship.clone();
            let report = committed(
                h.engine
                    .edit_view(move |view| view.hide_group(ColumnKey::field("ship"), hidden))
                    .await,
            );
            assert!(report.opened.is_empty());
            assert_eq!(report.rows_rendered, 0);
            let view = h.engine.active_view().expect("active view");
            assert!(view.group_keys.is_empty());
            assert_eq!(h.engine.active_profile(), Some(profile("a")));
        })
        .await;
}

#[tokio::test]
async fn stale_tokens_never_commit_except_grouping_adoption() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            let load = committed(h.engine.load_profile(profile("a"), offers(11, 8, 0)).await);
            let old_token = load.token;
            settle(load).await;

            let table_view = h.engine.active_view().expect("active view");
            let target = mounted(&h.host);
            settle(committed(
                h.engine
                    .edit_view(|view| view.cycle_sort(&ColumnKey::field("port")))
                    .await,
            ))
            .await;
            let revision = target.borrow().revision;

            let outcome = h.engine.update_view(table_view.clone(), old_token).await;
            assert!(matches!(outcome, PassOutcome::Stale));
            assert_eq!(target.borrow().revision, revision);

            let mut grouped = table_view;
            grouped.push_grouping(ColumnKey::field("tier"));
            let report = committed(h.engine.update_view(grouped, old_token).await);
            assert!(report.adopted);
            assert_eq!(h.engine.current_token(), Some(old_token));
        })
        .await;
}

#[tokio::test]
async fn reload_with_incompatible_payload_builds_fresh() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            settle(committed(h.engine.load_profile(profile("a"), offers(12, 6, 0)).await)).await;
            settle(committed(
                h.engine
                    .edit_view(|view| view.cycle_sort(&ColumnKey::field("port")))
                    .await,
            ))
            .await;

            let mut reduced = offers(12, 6, 0);
            reduced
                .columns
                .retain(|spec| spec.key != ColumnKey::field("port"));
            let report = committed(h.engine.load_profile(profile("a"), reduced).await);
            assert!(report.diagnostics.is_empty());
            let view = h.engine.active_view().expect("active view");
            assert_eq!(view.sort, None);
            assert_eq!(h.engine.tabs(), vec![profile("a")]);
        })
        .await;
}

#[tokio::test]
async fn preference_change_recomputes_with_new_options() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            let payload = offers(13, 20, 0);
            settle(committed(h.engine.load_profile(profile("a"), payload.clone()).await)).await;
            assert_eq!(h.depths.calls(), 1);
            assert_eq!(
                h.depths.last_options().map(|options| options.include_side_by_side),
                Some(true)
            );

            let outcome = h
                .engine
                .set_preference(PreferenceKey::IncludeSideBySide, "false")
                .await
                .expect("memory store accepts writes");
            settle(committed(outcome)).await;
            assert_eq!(h.depths.calls(), 2);
            assert_eq!(
                h.depths.last_options().map(|options| options.include_side_by_side),
                Some(false)
            );

            let hidden = payload
                .rows
                .iter()
                .filter(|row| row.cell("tier") == &CellValue::Text("suite".to_owned()))
                .count();
            let outcome = h
                .engine
                .set_preference(PreferenceKey::HiddenTier, "suite")
                .await
                .expect("memory store accepts writes");
            let report = committed(outcome);
            assert_eq!(report.rows_total, 20 - hidden);
            settle(report).await;
            assert_eq!(h.depths.last_rows().len(), 20 - hidden);

            let outcome = h
                .engine
                .set_preference(PreferenceKey::AutoEnrich, "false")
                .await
                .expect("memory store accepts writes");
            assert_eq!(
                settle(committed(outcome)).await,
                PatchReport::Skipped(SkipReason::Disabled)
            );
        })
        .await;
}

#[tokio::test]
async fn reuse_policy_remounts_fresh_target() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig {
                rebuild_policy: RebuildPolicy::ReuseIfFresh,
                ..EngineConfig::default()
            });
            settle(committed(h.engine.load_profile(profile("a"), offers(14, 4, 0)).await)).await;
            let a_target = mounted(&h.host);
            settle(committed(h.engine.load_profile(profile("b"), offers(15, 4, 100)).await)).await;

            let outcome = h.engine.switch_profile(profile("a"), None).await;
            assert!(matches!(outcome, PassOutcome::Reused(ref key) if key == &profile("a")));
            assert!(Rc::ptr_eq(&mounted(&h.host), &a_target));
            assert_eq!(h.engine.active_profile(), Some(profile("a")));
        })
        .await;
}

#[tokio::test]
async fn closing_active_tab_renders_next_profile() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            settle(committed(h.engine.load_profile(profile("a"), offers(16, 4, 0)).await)).await;
            settle(committed(h.engine.load_profile(profile("b"), offers(17, 4, 100)).await)).await;

            let report = committed(h.engine.close_profile(&profile("b")).await);
            assert_eq!(report.profile, profile("a"));
            assert_eq!(h.engine.tabs(), vec![profile("a")]);
            assert_eq!(h.host.borrow().mounted_profile(), Some(profile("a")));

            let outcome = h.engine.close_profile(&profile("zzz")).await;
            assert!(matches!(outcome, PassOutcome::Idle));
        })
        .await;
}

#[tokio::test]
async fn engine_without_depth_engine_skips_enrichment() {
    LocalSet::new()
        .run_until(async {
            let host = RecordingHost::shared();
            let engine = EngineBuilder::new(host.clone(), host.clone()).build();
            let report = committed(engine.load_profile(profile("a"), offers(18, 3, 0)).await);
            assert_eq!(
                settle(report).await,
                PatchReport::Skipped(SkipReason::Unavailable)
            );
            let target = mounted(&host);
            assert!(
                target
                    .borrow()
                    .rows()
                    .iter()
                    .all(|row| row.depth() == Some(DEFAULT_DEPTH))
            );

            let report = committed(
                engine
                    .edit_view(|view| view.cycle_sort(&ColumnKey::B2bDepth))
                    .await,
            );
            assert_eq!(report.rows_rendered, 3);
            assert_eq!(
                settle(report).await,
                PatchReport::Skipped(SkipReason::Complete)
            );
        })
        .await;
}

#[tokio::test]
async fn depth_sort_without_depth_engine_renders_default_depths() {
    LocalSet::new()
        .run_until(async {
            let host = RecordingHost::shared();
            let engine = EngineBuilder::new(host.clone(), host.clone())
                .config(EngineConfig {
                    enrichment_enabled: false,
                    ..EngineConfig::default()
                })
                .depth_engine(Rc::new(ScriptedDepthEngine::new().with_fallback(4)))
                .build();
            let _load = engine.load_profile(profile("a"), offers(19, 5, 0)).await;

            let report = committed(
                engine
                    .edit_view(|view| view.cycle_sort(&ColumnKey::B2bDepth))
                    .await,
            );
            let target = mounted(&host);
            assert_eq!(target.borrow().rows().len(), 5);
            assert!(
                target
                    .borrow()
                    .rows()
                    .iter()
                    .all(|row| row.depth() == Some(DEFAULT_DEPTH))
            );
            assert_eq!(
                settle(report).await,
                PatchReport::Skipped(SkipReason::Complete)
            );
        })
        .await;
}

#[tokio::test]
async fn edit_during_pending_switch_applies_to_the_incoming_profile() {
    LocalSet::new()
        .run_until(async {
            let h = harness(EngineConfig::default());
            let b_payload = offers(20, 6, 100);
            settle(committed(h.engine.load_profile(profile("a"), offers(21, 6, 0)).await)).await;
            settle(committed(h.engine.load_profile(profile("b"), b_payload.clone()).await)).await;
            settle(committed(
                h.engine
                    .edit_view(|view| view.cycle_sort(&ColumnKey::B2bDepth))
                    .await,
            ))
            .await;
            settle(committed(h.engine.switch_profile(profile("a"), None).await)).await;
            assert_eq!(h.engine.active_profile(), Some(profile("a")));

            h.depths.hold();
            let engine = h.engine.clone();
            let switch = tokio::task::spawn_local(async move {
                engine.switch_profile(profile("b"), Some(b_payload)).await
            });
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            assert_eq!(h.engine.active_profile(), Some(profile("b")));

            let engine = h.engine.clone();
            let edit = tokio::task::spawn_local(async move {
                engine
                    .edit_view(|view| view.cycle_sort(&ColumnKey::B2bDepth))
                    .await
            });
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            h.depths.release();

            let switched = switch.await.expect("switch task");
            assert!(matches!(switched, PassOutcome::Stale));
            let report = committed(edit.await.expect("edit task"));
            assert_eq!(report.profile, profile("b"));
            settle(report).await;

            assert_eq!(h.engine.active_profile(), Some(profile("b")));
            assert_eq!(h.host.borrow().mounted_profile(), Some(profile("b")));
            let target = mounted(&h.host);
            let depth_sort = target
                .borrow()
                .header()
                .iter()
                .find(|cell| cell.column == ColumnKey::B2bDepth)
                .and_then(|cell| cell.sort);
            assert_eq!(depth_sort, Some(SortDirection::Desc));
            assert!(row_ids(&target).iter().all(|id| *id > 100));
        })
        .await;
}
