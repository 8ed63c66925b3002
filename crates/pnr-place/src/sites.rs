//! Placement site grid anchored at the lower-left of the boundary.

use pnr_core::technology::SiteClass;
use pnr_core::{Coord, PnrError, Point, Rect, Result, RoutingDirection, Technology};

use crate::config::FloorplannerConfig;

/// A slot is addressed by `(col, row)`; its lower-left corner is
/// `origin + (col * site_width, row * row_height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteGrid {
    pub origin: Point,
    pub site_width: Coord,
    pub row_height: Coord,
    pub cols: Coord,
    pub rows: Coord,
    pub center: Point,
}

impl SiteGrid {
    pub fn new(tech: &Technology, config: &FloorplannerConfig, boundary: Rect) -> Result<Self> {
        let (site_width, row_height) = Self::site_size(tech, config)?;
        if site_width <= 0 || row_height <= 0 {
            return Err(PnrError::InvalidState(format!(
                "placement site {site_width}x{row_height} is empty"
            )));
        }
        Ok(Self {
            origin: boundary.min,
            site_width,
            row_height,
            cols: boundary.width() / site_width,
            rows: boundary.height() / row_height,
            center: boundary.center(),
        })
    }

    fn site_size(tech: &Technology, config: &FloorplannerConfig) -> Result<(Coord, Coord)> {
        if let Some(name) = &config.site {
            let site = tech
                .site(name)
                .ok_or_else(|| PnrError::InvalidState(format!("unknown site '{name}'")))?;
            return Ok((site.width, site.height));
        }
        if let (Some(w), Some(h)) = (config.site_width, config.row_height) {
            return Ok((w, h));
        }
        if let Some(site) = tech.sites().find(|s| s.class == SiteClass::Core) {
            return Ok((
                config.site_width.unwrap_or(site.width),
                config.row_height.unwrap_or(site.height),
            ));
        }
        // vertical wires set the x pitch, horizontal wires the row pitch
        let any = tech.routing_layers().iter().map(|l| l.pitch).min().unwrap_or(1);
        let w = tech.min_pitch(RoutingDirection::Vertical).unwrap_or(any);
        let h = tech.min_pitch(RoutingDirection::Horizontal).unwrap_or(any);
        Ok((config.site_width.unwrap_or(w), config.row_height.unwrap_or(h)))
    }

    pub fn slot_count(&self) -> usize {
        (self.cols.max(0) * self.rows.max(0)) as usize
    }

    pub fn contains(&self, col: Coord, row: Coord) -> bool {
        (0..self.cols).contains(&col) && (0..self.rows).contains(&row)
    }

    /// Lower-left corner of a slot.
    pub fn slot(&self, col: Coord, row: Coord) -> Point {
        Point::new(
            self.origin.x + col * self.site_width,
            self.origin.y + row * self.row_height,
        )
    }

    /// Slot whose corner is nearest to `p`, clamped into the grid.
    pub fn nearest(&self, p: Point) -> (Coord, Coord) {
        let round = |v: Coord, step: Coord| (v + step / 2).div_euclid(step);
        let col = round(p.x - self.origin.x, self.site_width).clamp(0, (self.cols - 1).max(0));
        let row = round(p.y - self.origin.y, self.row_height).clamp(0, (self.rows - 1).max(0));
        (col, row)
    }

    pub fn is_on_grid(&self, p: Point) -> bool {
        (p.x - self.origin.x).rem_euclid(self.site_width) == 0
            && (p.y - self.origin.y).rem_euclid(self.row_height) == 0
    }

    /// Slots on the square ring at Chebyshev distance `radius` around
    /// `(col, row)`, clipped to the grid, in row-major order.
    pub fn ring(&self, col: Coord, row: Coord, radius: Coord) -> Vec<(Coord, Coord)> {
        let mut out = Vec::new();
        for r in row - radius..=row + radius {
            for c in col - radius..=col + radius {
                let on_ring = (c - col).abs() == radius || (r - row).abs() == radius;
                if on_ring && self.contains(c, r) {
                    out.push((c, r));
                }
            }
        }
        out
    }

    /// Largest ring radius that can still reach a slot from `(col, row)`.
    pub fn max_radius(&self, col: Coord, row: Coord) -> Coord {
        [col, self.cols - 1 - col, row, self.rows - 1 - row]
            .into_iter()
            .max()
            .unwrap_or(0)
            .max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnr_core::technology::{LayerSpec, SiteSpec, TechnologySpec};

    fn tech(sites: Vec<SiteSpec>) -> Technology {
        Technology::load(&TechnologySpec {
            layers: vec![
                LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4),
                LayerSpec::routing("M2", RoutingDirection::Vertical, 20, 4),
            ],
            sites,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_site_from_pitches() {
        let grid = SiteGrid::new(
            &tech(vec![]),
            &FloorplannerConfig::default(),
            Rect::new(0, 0, 100, 100),
        )
        .unwrap();
        assert_eq!((grid.site_width, grid.row_height), (20, 10));
        assert_eq!((grid.cols, grid.rows), (5, 10));
        assert_eq!(grid.slot(2, 3), Point::new(40, 30));
    }

    #[test]
    fn test_named_site_and_unknown_site() {
        let t = tech(vec![SiteSpec {
            name: "core".into(),
            class: SiteClass::Core,
            width: 5,
            height: 50,
        }]);
        let grid = SiteGrid::new(&t, &FloorplannerConfig::default(), Rect::new(0, 0, 100, 100)).unwrap();
        assert_eq!((grid.site_width, grid.row_height), (5, 50));

        let cfg = FloorplannerConfig {
            site: Some("io".into()),
            ..Default::default()
        };
        assert!(SiteGrid::new(&t, &cfg, Rect::new(0, 0, 100, 100)).is_err());
    }

    #[test]
    fn test_nearest_and_ring() {
        let grid = SiteGrid::new(
            &tech(vec![]),
            &FloorplannerConfig {
                site_width: Some(10),
                row_height: Some(10),
                ..Default::default()
            },
            Rect::new(0, 0, 50, 50),
        )
        .unwrap();
        assert_eq!(grid.nearest(Point::new(14, 16)), (1, 2));
        assert_eq!(grid.nearest(Point::new(-30, 999)), (0, 4));
        assert_eq!(grid.ring(0, 0, 0), vec![(0, 0)]);
        assert_eq!(grid.ring(0, 0, 1), vec![(1, 0), (0, 1), (1, 1)]);
        assert_eq!(grid.ring(2, 2, 1).len(), 8);
        assert_eq!(grid.max_radius(0, 0), 4);
        assert!(grid.is_on_grid(Point::new(30, 40)));
        assert!(!grid.is_on_grid(Point::new(31, 40)));
    }
}
