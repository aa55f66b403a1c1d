// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// The shared "working" indicator drawn by the host.
pub trait BusyIndicator {
    fn show(&mut self);
    fn hide(&mut self);
}

pub type BusySessionId = u64;

#[derive(Debug, Default)]
struct BusyState {
    owner: Option<BusySessionId>,
    next_id: BusySessionId,
}

/// Single-slot owner of the busy indicator. A newer [`begin`](Self::begin)
/// displaces the previous owner, whose later [`end`](Self::end) is a no-op.
/// Every session is force-cleared after the timeout.
///
/// `begin` spawns its timeout with [`tokio::task::spawn_local`] and must run
/// inside a `LocalSet`.
#[derive(Clone)]
pub struct BusyIndicatorSession {
    state: Rc<RefCell<BusyState>>,
    indicator: Rc<RefCell<dyn BusyIndicator>>,
    timeout: Duration,
}

impl BusyIndicatorSession {
    pub fn new(indicator: Rc<RefCell<dyn BusyIndicator>>, timeout: Duration) -> Self {
        Self {
            state: Rc::new(RefCell::new(BusyState::default())),
            indicator,
            timeout,
        }
    }

    pub fn begin(&self) -> BusySessionId {
        let id = {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            state.owner = Some(state.next_id);
            state.next_id
        };
        self.indicator.borrow_mut().show();

        let session = self.clone();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(session.timeout).await;
            if session.release(id) {
                tracing::debug!(id, "busy indicator timed out");
            }
        });
        id
    }

    pub fn end(&self, id: BusySessionId) {
        self.release(id);
    }

    /// Starts a session that ends when the guard is dropped.
    pub fn guard(&self) -> BusyGuard {
        BusyGuard {
            session: self.clone(),
            id: self.begin(),
        }
    }

    pub fn owner(&self) -> Option<BusySessionId> {
        self.state.borrow().owner
    }

    fn release(&self, id: BusySessionId) -> bool {
        let owned = {
            let mut state = self.state.borrow_mut();
            if state.owner == Some(id) {
                state.owner = None;
                true
            } else {
                false
            }
        };
        if owned {
            self.indicator.borrow_mut().hide();
        }
        owned
    }
}

pub struct BusyGuard {
    session: BusyIndicatorSession,
    id: BusySessionId,
}

impl BusyGuard {
    pub fn id(&self) -> BusySessionId {
        self.id
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.session.end(self.id);
    }
}
