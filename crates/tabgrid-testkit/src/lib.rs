// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use tabgrid_app::{CellKind, CellValue, ColumnSpec, ProfileKey, ProfilePayload, Row, RowId};
use tabgrid_engine::{BusyIndicator, DepthEngine, DepthOptions, HostSurface, TargetHandle};
use time::{Date, Duration};
use time::macros::date;

const SHIPS: [&str; 10] = [
    "Allure", "Brilliance", "Enchantment", "Freedom", "Harmony", "Jewel", "Navigator", "Odyssey",
    "Radiance", "Wonder",
];

const PORTS: [&str; 8] = [
    "Miami",
    "Fort Lauderdale",
    "Galveston",
    "Port Canaveral",
    "Seattle",
    "Tampa",
    "Barcelona",
    "Southampton",
];

const TIERS: [&str; 4] = ["inside", "oceanview", "balcony", "suite"];
const NIGHTS: [i64; 6] = [3, 4, 5, 7, 8, 10];
const OFFER_PREFIXES: [&str; 5] = ["CLB", "MXP", "FRE", "SLV", "PRM"];

const REFERENCE_DATE: Date = date!(2026 - 01 - 01);

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn chance(&mut self, percent: u64) -> bool {
        self.next_u64() % 100 < percent
    }
}

/// Deterministic cruise-offer rows. About a third of offers are booked as a
/// back-to-back continuation of the previous one.
#[derive(Debug, Clone)]
pub struct OfferFaker {
    rng: DeterministicRng,
    next_id: i64,
}

impl OfferFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::field("ship", "Ship", CellKind::Text),
            ColumnSpec::field("sail_date", "Sails", CellKind::Date),
            ColumnSpec::field("nights", "Nights", CellKind::Integer),
            ColumnSpec::field("port", "Port", CellKind::Text),
            ColumnSpec::field("tier", "Tier", CellKind::Text),
            ColumnSpec::field("price", "Price", CellKind::Money),
            ColumnSpec::field("offer_code", "Offer", CellKind::Text),
        ]
    }

    pub fn offer(&mut self) -> Row {
        let ship = self.pick(&SHIPS);
        let port = self.pick(&PORTS);
        let sail_date = REFERENCE_DATE + Duration::days(self.rng.int_n(365) as i64);
        self.offer_on(ship, port, sail_date)
    }

    /// An offer on the same ship that departs the day `previous` returns.
    pub fn continuation(&mut self, previous: &Row) -> Row {
        let ship = previous.cell("ship").display();
        let port = previous.cell("port").display();
        let (CellValue::Date(sailed), CellValue::Integer(nights)) =
            (previous.cell("sail_date"), previous.cell("nights"))
        else {
            return self.offer();
        };
        self.offer_on(&ship, &port, *sailed + Duration::days(*nights))
    }

    pub fn rows(&mut self, count: usize) -> Vec<Row> {
        let mut rows: Vec<Row> = Vec::with_capacity(count);
        for _ in 0..count {
            let row = match rows.last() {
                Some(previous) if self.rng.chance(35) => self.continuation(previous),
                _ => self.offer(),
            };
            rows.push(row);
        }
        rows
    }

    pub fn payload(&mut self, count: usize) -> ProfilePayload {
        ProfilePayload {
            columns: Self::columns(),
            rows: self.rows(count),
        }
    }

    fn offer_on(&mut self, ship: &str, port: &str, sail_date: Date) -> Row {
        let id = RowId::new(self.next_id);
        self.next_id += 1;
        let nights = NIGHTS[self.rng.int_n(NIGHTS.len())];
        let tier = self.pick(&TIERS);
        let per_night = 6_000 + self.rng.int_n(24_000) as i64;
        let code = format!(
            "{}{:04}",
            self.pick(&OFFER_PREFIXES),
            self.rng.int_n(10_000)
        );
        Row::new(id)
            .with("ship", CellValue::Text(ship.to_owned()))
            .with("sail_date", CellValue::Date(sail_date))
            .with("nights", CellValue::Integer(nights))
            .with("port", CellValue::Text(port.to_owned()))
            .with("tier", CellValue::Text(tier.to_owned()))
            .with("price", CellValue::Money(per_night * nights))
            .with("offer_code", CellValue::Text(code))
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

pub fn profile(name: &str) -> ProfileKey {
    ProfileKey::from(name)
}

/// A scratch directory and a path inside it named `file_name`.
pub fn temp_file_path(file_name: &str) -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join(file_name);
    Ok((dir, path))
}

type Gate = (oneshot::Sender<()>, Shared<oneshot::Receiver<()>>);

#[derive(Default)]
struct ScriptState {
    depths: HashMap<RowId, u32>,
    fallback: Option<u32>,
    failing: bool,
    gate: Option<Gate>,
    calls: usize,
    last_rows: Vec<RowId>,
    last_options: Option<DepthOptions>,
}

/// Depth engine with canned answers. Computations can be held open with
/// [`hold`](Self::hold) until the test calls [`release`](Self::release).
#[derive(Clone, Default)]
pub struct ScriptedDepthEngine {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedDepthEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row not set explicitly gets `depth`.
    pub fn with_fallback(self, depth: u32) -> Self {
        self.state.borrow_mut().fallback = Some(depth);
        self
    }

    pub fn set_depth(&self, id: RowId, depth: u32) {
        self.state.borrow_mut().depths.insert(id, depth);
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    pub fn hold(&self) {
        let mut state = self.state.borrow_mut();
        if state.gate.is_none() {
            let (sender, receiver) = oneshot::channel();
            state.gate = Some((sender, receiver.shared()));
        }
    }

    pub fn release(&self) {
        if let Some((sender, _)) = self.state.borrow_mut().gate.take() {
            let _ = sender.send(());
        }
    }

    pub fn calls(&self) -> usize {
        self.state.borrow().calls
    }

    pub fn last_rows(&self) -> Vec<RowId> {
        self.state.borrow().last_rows.clone()
    }

    pub fn last_options(&self) -> Option<DepthOptions> {
        self.state.borrow().last_options
    }
}

impl DepthEngine for ScriptedDepthEngine {
    fn compute_depths(
        &self,
        rows: Vec<Row>,
        options: DepthOptions,
    ) -> LocalBoxFuture<'static, Result<HashMap<usize, u32>>> {
        let (gate, depths, fallback, failing) = {
            let mut state = self.state.borrow_mut();
            state.calls += 1;
            state.last_rows = rows.iter().map(|row| row.id).collect();
            state.last_options = Some(options);
            (
                state.gate.as_ref().map(|(_, signal)| signal.clone()),
                state.depths.clone(),
                state.fallback,
                state.failing,
            )
        };
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if failing {
                return Err(anyhow!("scripted depth failure"));
            }
            Ok(rows
                .iter()
                .enumerate()
                .filter_map(|(index, row)| {
                    depths
                        .get(&row.id)
                        .copied()
                        .or(fallback)
                        .map(|depth| (index, depth))
                })
                .collect())
        }
        .boxed_local()
    }
}

/// Host surface and busy indicator that record every call.
#[derive(Default)]
pub struct RecordingHost {
    pub mounted: Option<TargetHandle>,
    pub mounts: Vec<ProfileKey>,
    pub highlights: Vec<ProfileKey>,
    pub busy_visible: bool,
    pub busy_shows: usize,
    pub busy_hides: usize,
}

impl RecordingHost {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn mounted_profile(&self) -> Option<ProfileKey> {
        self.mounted
            .as_ref()
            .map(|target| target.borrow().profile.clone())
    }
}

impl HostSurface for RecordingHost {
    fn mount(&mut self, target: TargetHandle) {
        self.mounts.push(target.borrow().profile.clone());
        self.mounted = Some(target);
    }

    fn highlight_tab(&mut self, profile: &ProfileKey) {
        self.highlights.push(profile.clone());
    }
}

impl BusyIndicator for RecordingHost {
    fn show(&mut self) {
        self.busy_visible = true;
        self.busy_shows += 1;
    }

    fn hide(&mut self) {
        self.busy_visible = false;
        self.busy_hides += 1;
    }
}
