// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Back-to-back chain depth over cruise offers.
//!
//! Offer `b` continues offer `a` when it leaves from `a`'s port on the day
//! `a` returns. Same-ship continuations always count; a different ship only
//! counts when side-by-side chaining is enabled. A row's depth is the number
//! of offers in the longest chain that starts at it.

use anyhow::Result;
use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use std::collections::HashMap;
use tabgrid_app::{CellValue, Row};
use tabgrid_engine::{DepthEngine, DepthOptions};
use time::{Date, Duration};

struct Leg<'a> {
    index: usize,
    ship: &'a str,
    port: &'a str,
    sails: Date,
    returns: Date,
}

fn leg(index: usize, row: &Row) -> Option<Leg<'_>> {
    let (
        CellValue::Text(ship),
        CellValue::Date(sails),
        CellValue::Integer(nights),
        CellValue::Text(port),
    ) = (
        row.cell("ship"),
        row.cell("sail_date"),
        row.cell("nights"),
        row.cell("port"),
    )
    else {
        return None;
    };
    if *nights <= 0 {
        return None;
    }
    let returns = sails.checked_add(Duration::days(*nights))?;
    Some(Leg {
        index,
        ship,
        port,
        sails: *sails,
        returns,
    })
}

pub fn chain_depths(rows: &[Row], options: DepthOptions) -> HashMap<usize, u32> {
    let mut legs: Vec<Leg<'_>> = rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| leg(index, row))
        .collect();
    // Later departures first, so every continuation is resolved before the
    // offers that lead into it.
    legs.sort_by(|a, b| b.sails.cmp(&a.sails));

    let mut any_ship: HashMap<(Date, &str), u32> = HashMap::new();
    let mut same_ship: HashMap<(Date, &str, &str), u32> = HashMap::new();
    let mut depths = HashMap::with_capacity(legs.len());

    for leg in &legs {
        let next = if options.include_side_by_side {
            any_ship.get(&(leg.returns, leg.port))
        } else {
            same_ship.get(&(leg.returns, leg.port, leg.ship))
        };
        let depth = 1 + next.copied().unwrap_or(0);

        let slot = any_ship.entry((leg.sails, leg.port)).or_insert(0);
        *slot = (*slot).max(depth);
        let slot = same_ship.entry((leg.sails, leg.port, leg.ship)).or_insert(0);
        *slot = (*slot).max(depth);

        depths.insert(leg.index, depth);
    }
    depths
}

/// Computes chain depths in-process. Rows missing a ship, sail date, nights
/// or port get no entry; the engine shows those at the default depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainDepthEngine;

impl DepthEngine for ChainDepthEngine {
    fn compute_depths(
        &self,
        rows: Vec<Row>,
        options: DepthOptions,
    ) -> LocalBoxFuture<'static, Result<HashMap<usize, u32>>> {
        let depths = chain_depths(&rows, options);
        tracing::debug!(
            rows = rows.len(),
            resolved = depths.len(),
            side_by_side = options.include_side_by_side,
            "computed chain depths"
        );
        future::ready(Ok(depths)).boxed_local()
    }
}
