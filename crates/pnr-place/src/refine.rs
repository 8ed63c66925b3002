//! Local-search refinement.
//!
//! Each pass visits movable instances in id order and tries the free slots
//! around the centroid of everything they connect to. A move is taken only
//! when it strictly lowers `(HPWL of the instance's nets, distance to the
//! boundary centre)`, so a converged placement is a fixed point.

use rayon::prelude::*;

use pnr_core::{Coord, DesignDatabase, InstanceId, NetId, Point, Rect, RouteState, Terminal};

use crate::legalize::{slot_is_free, SlotCost};
use crate::sites::SiteGrid;

/// HPWL of `nets` with instance `moved` shifted by `delta`.
fn hpwl_with(db: &DesignDatabase, nets: &[NetId], moved: InstanceId, delta: Point) -> Coord {
    nets.iter()
        .filter_map(|n| db.net(*n).ok())
        .map(|net| {
            let points: Vec<Point> = net
                .terminals
                .iter()
                .filter_map(|t| {
                    let p = db.terminal_location(t)?;
                    Some(match t {
                        Terminal::Pin { instance, .. } if *instance == moved => {
                            p.translate(delta.x, delta.y)
                        }
                        _ => p,
                    })
                })
                .collect();
            Rect::from_points(&points).map_or(0, |r| r.half_perimeter())
        })
        .sum()
}

/// Mean location of the terminals `id` connects to, excluding its own pins.
fn connectivity_centroid(db: &DesignDatabase, id: InstanceId, nets: &[NetId]) -> Option<Point> {
    let (mut sx, mut sy, mut k) = (0i128, 0i128, 0i128);
    for net in nets.iter().filter_map(|n| db.net(*n).ok()) {
        for t in &net.terminals {
            if matches!(t, Terminal::Pin { instance, .. } if *instance == id) {
                continue;
            }
            if let Some(p) = db.terminal_location(t) {
                sx += p.x as i128;
                sy += p.y as i128;
                k += 1;
            }
        }
    }
    (k > 0).then(|| Point::new((sx / k) as Coord, (sy / k) as Coord))
}

/// Run up to `max_passes` refinement passes. Returns the number of moves.
pub fn refine(
    db: &mut DesignDatabase,
    grid: &SiteGrid,
    movable: &[InstanceId],
    radius: Coord,
    max_passes: usize,
) -> usize {
    let mut total = 0;
    for pass in 0..max_passes {
        let mut moved = 0;
        for &id in movable {
            if let Some(pos) = best_move(db, grid, id, radius) {
                let orientation = db.instance(id).map(|i| i.orientation).unwrap_or_default();
                match db.set_position(id, pos, orientation) {
                    Ok(()) => moved += 1,
                    Err(e) => log::debug!("Refinement move of {id} rejected: {e}"),
                }
            }
        }
        log::debug!("Refinement pass {pass}: {moved} moves");
        total += moved;
        if moved == 0 {
            break;
        }
    }
    if total > 0 {
        log::info!("Refinement moved {total} instances, HPWL now {}", db.total_hpwl());
    }
    total
}

fn best_move(db: &DesignDatabase, grid: &SiteGrid, id: InstanceId, radius: Coord) -> Option<Point> {
    let inst = db.instance(id).ok()?;
    if !inst.is_placed() || inst.is_fixed() {
        return None;
    }
    let nets = db.nets_of_instance(id);
    if nets.is_empty()
        || nets
            .iter()
            .any(|n| db.net(*n).map_or(true, |n| n.route.state != RouteState::Unrouted))
    {
        return None;
    }
    let here = inst.position;
    let footprint = inst.footprint_at(here, inst.orientation);
    let (w, h) = (footprint.width(), footprint.height());

    let cost_at = |pos: Point| -> SlotCost {
        let delta = Point::new(pos.x - here.x, pos.y - here.y);
        let centre = Rect::from_origin_size(pos, w, h).center();
        (
            hpwl_with(db, nets, id, delta),
            centre.distance_squared(&grid.center),
        )
    };
    let current = cost_at(here);

    let centroid = connectivity_centroid(db, id, nets)?;
    let (col, row) = grid.nearest(Point::new(centroid.x - w / 2, centroid.y - h / 2));
    let candidates: Vec<Point> = (0..=radius)
        .flat_map(|r| grid.ring(col, row, r))
        .map(|(c, r)| grid.slot(c, r))
        .filter(|p| *p != here)
        .collect();

    candidates
        .par_iter()
        .enumerate()
        .filter_map(|(order, &pos)| {
            let rect = Rect::from_origin_size(pos, w, h);
            slot_is_free(db, &rect, Some(id)).then(|| (cost_at(pos), order, pos))
        })
        .min_by_key(|(cost, order, _)| (*cost, *order))
        .filter(|(cost, _, _)| *cost < current)
        .map(|(_, _, pos)| pos)
}
