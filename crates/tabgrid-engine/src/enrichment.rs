// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Coalescing coordinator for the background B2B depth computation.
//!
//! Callers for the same [`SwitchToken`] share one engine invocation through a
//! memoized [`Shared`] future. A reference count of outstanding callers backs
//! [`EnrichmentCoordinator::wait_for`], which resolves once the last caller
//! has released its [`EnrichmentLease`].

use anyhow::Result;
use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tabgrid_app::{Row, RowId, SwitchToken};

/// Depth shown for rows the engine returned nothing for.
pub const DEFAULT_DEPTH: u32 = 1;

pub type DepthTable = HashMap<RowId, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthOptions {
    pub include_side_by_side: bool,
}

impl Default for DepthOptions {
    fn default() -> Self {
        Self {
            include_side_by_side: true,
        }
    }
}

/// The chain-depth algorithm. Returns depths keyed by index into `rows`.
pub trait DepthEngine {
    fn compute_depths(
        &self,
        rows: Vec<Row>,
        options: DepthOptions,
    ) -> LocalBoxFuture<'static, Result<HashMap<usize, u32>>>;
}

#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub token: SwitchToken,
    /// Rows that still lack a depth. Empty means there is nothing to do.
    pub targets: Vec<RowId>,
    /// Rows the engine sees. Hidden rows are excluded, search filters are not.
    pub context: Vec<Row>,
    pub options: DepthOptions,
    pub enabled: bool,
}

impl EnrichmentRequest {
    pub fn new(
        token: SwitchToken,
        targets: impl IntoIterator<Item = RowId>,
        known: &DepthTable,
        context: Vec<Row>,
        options: DepthOptions,
        enabled: bool,
    ) -> Self {
        Self {
            token,
            targets: targets
                .into_iter()
                .filter(|id| !known.contains_key(id))
                .collect(),
            context,
            options,
            enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Complete,
    Disabled,
    Unavailable,
}

#[derive(Debug, Clone)]
pub enum EnrichmentOutcome {
    Skipped(SkipReason),
    Computed(Rc<DepthTable>),
}

type SharedDepths = Shared<LocalBoxFuture<'static, Rc<DepthTable>>>;
type Signal = Shared<oneshot::Receiver<()>>;

struct Completion {
    sender: oneshot::Sender<()>,
    signal: Signal,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: usize,
    completion: Option<Completion>,
    memo: Option<(SwitchToken, SharedDepths)>,
    computations: usize,
}

#[derive(Clone)]
pub struct EnrichmentCoordinator {
    engine: Option<Rc<dyn DepthEngine>>,
    state: Rc<RefCell<CoordinatorState>>,
}

impl EnrichmentCoordinator {
    pub fn new(engine: Option<Rc<dyn DepthEngine>>) -> Self {
        Self {
            engine,
            state: Rc::new(RefCell::new(CoordinatorState::default())),
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Registers one caller. Dropping the lease releases it; the last release
    /// resolves the completion signal.
    pub fn begin(&self) -> EnrichmentLease {
        let mut state = self.state.borrow_mut();
        state.in_flight += 1;
        if state.completion.is_none() {
            let (sender, receiver) = oneshot::channel();
            state.completion = Some(Completion {
                sender,
                signal: receiver.shared(),
            });
        }
        EnrichmentLease {
            state: Rc::clone(&self.state),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.borrow().in_flight
    }

    /// Number of engine invocations started so far.
    pub fn computations(&self) -> usize {
        self.state.borrow().computations
    }

    /// Resolves when no caller is in flight. Never starts a computation.
    pub fn wait_for(&self) -> LocalBoxFuture<'static, ()> {
        match &self.state.borrow().completion {
            Some(completion) => {
                let signal = completion.signal.clone();
                async move {
                    let _ = signal.await;
                }
                .boxed_local()
            }
            None => future::ready(()).boxed_local(),
        }
    }

    /// Forgets the memoized result so the next request recomputes.
    pub fn reset(&self) {
        self.state.borrow_mut().memo = None;
    }

    pub async fn ensure(&self, request: EnrichmentRequest) -> EnrichmentOutcome {
        if request.targets.is_empty() {
            return EnrichmentOutcome::Skipped(SkipReason::Complete);
        }
        if !request.enabled {
            return EnrichmentOutcome::Skipped(SkipReason::Disabled);
        }
        let Some(engine) = self.engine.clone() else {
            return EnrichmentOutcome::Skipped(SkipReason::Unavailable);
        };

        let _lease = self.begin();
        let depths = self.computation_for(engine.as_ref(), request).await;
        EnrichmentOutcome::Computed(depths)
    }

    fn computation_for(&self, engine: &dyn DepthEngine, request: EnrichmentRequest) -> SharedDepths {
        if let Some((token, shared)) = &self.state.borrow().memo
            && *token == request.token
        {
            return shared.clone();
        }

        let token = request.token;
        let ids = request.context.iter().map(|row| row.id).collect::<Vec<_>>();
        tracing::debug!(%token, rows = ids.len(), "starting b2b depth computation");
        let pending = engine.compute_depths(request.context, request.options);
        let shared = async move {
            match pending.await {
                Ok(by_index) => {
                    let table = by_index
                        .into_iter()
                        .filter_map(|(index, depth)| ids.get(index).map(|id| (*id, depth)))
                        .collect::<DepthTable>();
                    Rc::new(table)
                }
                Err(error) => {
                    tracing::warn!(%token, "b2b depth computation failed: {error:#}");
                    Rc::new(DepthTable::new())
                }
            }
        }
        .boxed_local()
        .shared();

        let mut state = self.state.borrow_mut();
        state.computations += 1;
        state.memo = Some((token, shared.clone()));
        shared
    }
}

/// Release handle for one [`EnrichmentCoordinator::begin`] call.
pub struct EnrichmentLease {
    state: Rc<RefCell<CoordinatorState>>,
}

impl Drop for EnrichmentLease {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0
            && let Some(completion) = state.completion.take()
        {
            let _ = completion.sender.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DepthEngine, DepthOptions, DepthTable, EnrichmentCoordinator, EnrichmentOutcome,
        EnrichmentRequest, SkipReason,
    };
    use anyhow::{Result, anyhow};
    use futures::FutureExt;
    use futures::future::{LocalBoxFuture, join_all};
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use tabgrid_app::{Row, RowId, SwitchToken};

    struct CountingEngine {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl DepthEngine for CountingEngine {
        fn compute_depths(
            &self,
            rows: Vec<Row>,
            _options: DepthOptions,
        ) -> LocalBoxFuture<'static, Result<HashMap<usize, u32>>> {
            self.calls.set(self.calls.get() + 1);
            let fail = self.fail;
            async move {
                tokio::task::yield_now().await;
                if fail {
                    return Err(anyhow!("chain detector unavailable"));
                }
                Ok((0..rows.len()).map(|index| (index, index as u32 + 2)).collect())
            }
            .boxed_local()
        }
    }

    fn coordinator(fail: bool) -> (EnrichmentCoordinator, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let engine = CountingEngine {
            calls: Rc::clone(&calls),
            fail,
        };
        (EnrichmentCoordinator::new(Some(Rc::new(engine))), calls)
    }

    fn request(token: SwitchToken, known: &DepthTable) -> EnrichmentRequest {
        let rows = (1..=3).map(|id| Row::new(RowId::new(id))).collect::<Vec<_>>();
        let ids = rows.iter().map(|row| row.id).collect::<Vec<_>>();
        EnrichmentRequest::new(
            token,
            ids,
            known,
            rows,
            DepthOptions::default(),
            true,
        )
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_computation() {
        let (coordinator, calls) = coordinator(false);
        let token = SwitchToken::random();

        let outcomes = join_all((0..5).map(|_| coordinator.ensure(request(token, &DepthTable::new())))).await;
        assert_eq!(calls.get(), 1);
        assert_eq!(coordinator.computations(), 1);
        for outcome in outcomes {
            let EnrichmentOutcome::Computed(depths) = outcome else {
                panic!("expected computed depths");
            };
            assert_eq!(depths.get(&RowId::new(1)), Some(&2));
            assert_eq!(depths.get(&RowId::new(3)), Some(&4));
        }
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn new_token_recomputes_and_reset_drops_memo() {
        let (coordinator, calls) = coordinator(false);
        let token = SwitchToken::random();

        coordinator.ensure(request(token, &DepthTable::new())).await;
        coordinator.ensure(request(token, &DepthTable::new())).await;
        assert_eq!(calls.get(), 1);

        coordinator.ensure(request(SwitchToken::random(), &DepthTable::new())).await;
        assert_eq!(calls.get(), 2);

        coordinator.reset();
        coordinator.ensure(request(token, &DepthTable::new())).await;
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn skips_when_complete_disabled_or_unavailable() {
        let (coordinator, calls) = coordinator(false);
        let token = SwitchToken::random();
        let known = (1..=3).map(|id| (RowId::new(id), 1)).collect::<DepthTable>();

        let outcome = coordinator.ensure(request(token, &known)).await;
        assert!(matches!(outcome, EnrichmentOutcome::Skipped(SkipReason::Complete)));

        let mut disabled = request(token, &DepthTable::new());
        disabled.enabled = false;
        let outcome = coordinator.ensure(disabled).await;
        assert!(matches!(outcome, EnrichmentOutcome::Skipped(SkipReason::Disabled)));
        assert_eq!(calls.get(), 0);

        let absent = EnrichmentCoordinator::new(None);
        assert!(!absent.is_available());
        let outcome = absent.ensure(request(token, &DepthTable::new())).await;
        assert!(matches!(outcome, EnrichmentOutcome::Skipped(SkipReason::Unavailable)));
        assert_eq!(absent.in_flight(), 0);
    }

    #[tokio::test]
    async fn failure_yields_empty_table_and_releases() {
        let (coordinator, calls) = coordinator(true);
        let outcome = coordinator
            .ensure(request(SwitchToken::random(), &DepthTable::new()))
            .await;
        let EnrichmentOutcome::Computed(depths) = outcome else {
            panic!("failure should still complete");
        };
        assert!(depths.is_empty());
        assert_eq!(calls.get(), 1);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn leases_resolve_signal_once_at_zero() {
        let (coordinator, _calls) = coordinator(false);
        coordinator.wait_for().await;

        let leases = (0..3).map(|_| coordinator.begin()).collect::<Vec<_>>();
        assert_eq!(coordinator.in_flight(), 3);

        let waiter = coordinator.wait_for();
        let second_waiter = coordinator.wait_for();
        let mut leases = leases.into_iter();
        drop(leases.next());
        drop(leases.next());
        assert_eq!(coordinator.in_flight(), 1);
        assert!(waiter.now_or_never().is_none());

        drop(leases.next());
        assert_eq!(coordinator.in_flight(), 0);
        second_waiter.await;
        coordinator.wait_for().await;
    }
}
