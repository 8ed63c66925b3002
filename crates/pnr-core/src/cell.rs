use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::geometry::{Coord, Rect, Shape};
use crate::ids::LayerId;

/// Signal direction of a cell pin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
    Tristate,
    InOut,
    #[default]
    Unknown,
}

impl PinDirection {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "input" => PinDirection::Input,
            "output" => PinDirection::Output,
            "output tristate" | "tristate" => PinDirection::Tristate,
            "inout" => PinDirection::InOut,
            _ => PinDirection::Unknown,
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(
            self,
            PinDirection::Output | PinDirection::Tristate | PinDirection::InOut
        )
    }

    pub fn is_input(&self) -> bool {
        matches!(self, PinDirection::Input | PinDirection::InOut)
    }
}

/// Electrical role of a pin. Supply pins are never part of a signal net.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinUse {
    #[default]
    Signal,
    Clock,
    Power,
    Ground,
}

impl PinUse {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "CLOCK" => PinUse::Clock,
            "POWER" => PinUse::Power,
            "GROUND" => PinUse::Ground,
            _ => PinUse::Signal,
        }
    }

    pub fn is_supply(&self) -> bool {
        matches!(self, PinUse::Power | PinUse::Ground)
    }
}

/// A shape on a specific layer, in cell-local coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerShape {
    pub layer: LayerId,
    pub shape: Shape,
}

/// Physical pin of a cell master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellPin {
    pub name: String,
    pub direction: PinDirection,
    pub pin_use: PinUse,
    pub shapes: Vec<LayerShape>,
}

impl CellPin {
    pub fn new(name: &str, direction: PinDirection) -> Self {
        Self {
            name: name.to_string(),
            direction,
            pin_use: PinUse::Signal,
            shapes: Vec::new(),
        }
    }

    pub fn with_rect(mut self, layer: LayerId, rect: Rect) -> Self {
        self.shapes.push(LayerShape {
            layer,
            shape: Shape::Rect(rect),
        });
        self
    }

    /// Bounding box of all shapes of the pin.
    pub fn bbox(&self) -> Option<Rect> {
        self.shapes
            .iter()
            .filter_map(|s| s.shape.bbox())
            .reduce(|a, b| a.union(&b))
    }

    pub fn shapes_on(&self, layer: LayerId) -> impl Iterator<Item = &Shape> {
        self.shapes
            .iter()
            .filter(move |s| s.layer == layer)
            .map(|s| &s.shape)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellClass {
    #[default]
    Core,
    Pad,
    Block,
    Endcap,
    Cover,
}

impl CellClass {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PAD" => CellClass::Pad,
            "BLOCK" | "RING" => CellClass::Block,
            "ENDCAP" => CellClass::Endcap,
            "COVER" => CellClass::Cover,
            _ => CellClass::Core,
        }
    }
}

/// Allowed mirror/rotation symmetries of a master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symmetry {
    pub x: bool,
    pub y: bool,
    pub r90: bool,
}

/// Physical view of a cell, from the geometry import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellGeometry {
    pub class: CellClass,
    pub width: Coord,
    pub height: Coord,
    pub site: Option<String>,
    pub symmetry: Symmetry,
    /// Pins in declaration order.
    pub pins: Vec<CellPin>,
    /// Blockages inside the cell (LEF OBS).
    pub obstructions: Vec<LayerShape>,
}

impl CellGeometry {
    pub fn new(width: Coord, height: Coord) -> Self {
        Self {
            class: CellClass::Core,
            width,
            height,
            site: None,
            symmetry: Symmetry::default(),
            pins: Vec::new(),
            obstructions: Vec::new(),
        }
    }

    pub fn with_pin(mut self, pin: CellPin) -> Self {
        self.pins.push(pin);
        self
    }

    pub fn bbox(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

// ── Timing view ──────────────────────────────────────────────────────

/// Two-dimensional characterisation table (index_1 × index_2).
/// A one-dimensional table has an empty `index_2` and one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    pub index_1: Vec<f64>,
    pub index_2: Vec<f64>,
    /// Row-major: `values[i][j]` at `(index_1[i], index_2[j])`.
    pub values: Vec<Vec<f64>>,
}

impl LookupTable {
    pub fn scalar(value: f64) -> Self {
        Self {
            index_1: Vec::new(),
            index_2: Vec::new(),
            values: vec![vec![value]],
        }
    }

    /// Bilinear interpolation, extrapolating linearly past the table edges.
    pub fn lookup(&self, x: f64, y: f64) -> Option<f64> {
        let row_at = |i: usize| -> Option<f64> {
            let row = self.values.get(i)?;
            if self.index_2.len() < 2 {
                return row.first().copied();
            }
            let (j, t) = segment(&self.index_2, y);
            let a = *row.get(j)?;
            let b = *row.get(j + 1)?;
            Some(a + (b - a) * t)
        };
        if self.index_1.len() < 2 {
            return row_at(0);
        }
        let (i, t) = segment(&self.index_1, x);
        let a = row_at(i)?;
        let b = row_at(i + 1)?;
        Some(a + (b - a) * t)
    }
}

/// Bracketing segment of `axis` for `v` and the interpolation fraction.
fn segment(axis: &[f64], v: f64) -> (usize, f64) {
    let last = axis.len() - 2;
    let i = axis
        .windows(2)
        .position(|w| v <= w[1])
        .unwrap_or(last)
        .min(last);
    let span = axis[i + 1] - axis[i];
    let t = if span.abs() < f64::EPSILON {
        0.0
    } else {
        (v - axis[i]) / span
    };
    (i, t)
}

/// Delay arc from `related_pin` to `pin`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingArc {
    pub related_pin: String,
    pub pin: String,
    pub timing_type: Option<String>,
    pub timing_sense: Option<String>,
    pub cell_rise: Option<LookupTable>,
    pub cell_fall: Option<LookupTable>,
    pub rise_transition: Option<LookupTable>,
    pub fall_transition: Option<LookupTable>,
}

/// Internal power arc from `related_pin` to `pin`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerArc {
    pub related_pin: String,
    pub pin: String,
    pub rise_power: Option<LookupTable>,
    pub fall_power: Option<LookupTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinTiming {
    pub name: String,
    pub direction: PinDirection,
    pub capacitance: f64,
    pub max_capacitance: Option<f64>,
    pub function: Option<String>,
    pub is_clock: bool,
}

/// Timing/behaviour view of a cell, from the timing import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellTiming {
    pub name: String,
    pub area: f64,
    pub leakage_power: f64,
    pub pins: IndexMap<String, PinTiming>,
    pub arcs: Vec<TimingArc>,
    pub power: Vec<PowerArc>,
}

impl CellTiming {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn arc(&self, related_pin: &str, pin: &str) -> Option<&TimingArc> {
        self.arcs
            .iter()
            .find(|a| a.related_pin == related_pin && a.pin == pin)
    }

    pub fn power_arc(&self, related_pin: &str, pin: &str) -> Option<&PowerArc> {
        self.power
            .iter()
            .find(|a| a.related_pin == related_pin && a.pin == pin)
    }

    /// Worst rise/fall delay of an arc at the given slew and load.
    pub fn delay(&self, related_pin: &str, pin: &str, slew: f64, load: f64) -> Option<f64> {
        let arc = self.arc(related_pin, pin)?;
        let rise = arc.cell_rise.as_ref().and_then(|t| t.lookup(slew, load));
        let fall = arc.cell_fall.as_ref().and_then(|t| t.lookup(slew, load));
        match (rise, fall) {
            (Some(r), Some(f)) => Some(r.max(f)),
            (r, f) => r.or(f),
        }
    }
}

// ── Master ───────────────────────────────────────────────────────────

/// What a master can be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub has_geometry: bool,
    pub has_timing: bool,
}

/// A library cell. Either view may be missing; a master without geometry
/// is timing-only and cannot be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMaster {
    pub name: String,
    pub geometry: Option<CellGeometry>,
    pub timing: Option<CellTiming>,
}

impl CellMaster {
    pub fn with_geometry(name: &str, geometry: CellGeometry) -> Self {
        Self {
            name: name.to_string(),
            geometry: Some(geometry),
            timing: None,
        }
    }

    pub fn timing_only(timing: CellTiming) -> Self {
        Self {
            name: timing.name.clone(),
            geometry: None,
            timing: Some(timing),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_geometry: self.geometry.is_some(),
            has_timing: self.timing.is_some(),
        }
    }

    pub fn is_placeable(&self) -> bool {
        self.geometry.is_some()
    }

    /// Size of the unrotated footprint; `(0, 0)` for timing-only cells.
    pub fn size(&self) -> (Coord, Coord) {
        self.geometry
            .as_ref()
            .map_or((0, 0), |g| (g.width, g.height))
    }

    pub fn pin(&self, name: &str) -> Option<&CellPin> {
        self.geometry.as_ref()?.pins.iter().find(|p| p.name == name)
    }

    /// True if either view declares the pin.
    pub fn has_pin(&self, name: &str) -> bool {
        self.pin(name).is_some()
            || self
                .timing
                .as_ref()
                .is_some_and(|t| t.pins.contains_key(name))
    }

    /// Direction from geometry, falling back to the timing view.
    pub fn pin_direction(&self, name: &str) -> PinDirection {
        if let Some(dir) = self
            .pin(name)
            .map(|p| p.direction)
            .filter(|d| *d != PinDirection::Unknown)
        {
            return dir;
        }
        self.timing
            .as_ref()
            .and_then(|t| t.pins.get(name))
            .map_or(PinDirection::Unknown, |p| p.direction)
    }

    /// Signal pins that take part in netlist connectivity.
    pub fn signal_pins(&self) -> impl Iterator<Item = &CellPin> {
        self.geometry
            .iter()
            .flat_map(|g| g.pins.iter())
            .filter(|p| !p.pin_use.is_supply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> LookupTable {
        LookupTable {
            index_1: vec![0.0, 1.0],
            index_2: vec![0.0, 2.0],
            values: vec![vec![1.0, 3.0], vec![2.0, 4.0]],
        }
    }

    #[test]
    fn test_bilinear_lookup() {
        let t = table();
        assert_relative_eq!(t.lookup(0.0, 0.0).unwrap(), 1.0);
        assert_relative_eq!(t.lookup(1.0, 2.0).unwrap(), 4.0);
        assert_relative_eq!(t.lookup(0.5, 1.0).unwrap(), 2.5);
        // extrapolation past the last breakpoint
        assert_relative_eq!(t.lookup(2.0, 0.0).unwrap(), 3.0);
        assert_relative_eq!(LookupTable::scalar(0.7).lookup(9.0, 9.0).unwrap(), 0.7);
    }

    #[test]
    fn test_capabilities() {
        let geom = CellGeometry::new(10, 10).with_pin(CellPin::new("A", PinDirection::Input));
        let mut master = CellMaster::with_geometry("INV", geom);
        assert!(master.is_placeable());
        assert!(!master.capabilities().has_timing);

        let mut timing = CellTiming::new("INV");
        timing.pins.insert(
            "Y".into(),
            PinTiming {
                name: "Y".into(),
                direction: PinDirection::Output,
                ..Default::default()
            },
        );
        master.timing = Some(timing.clone());
        assert!(master.has_pin("Y"));
        assert_eq!(master.pin_direction("Y"), PinDirection::Output);
        assert_eq!(master.pin_direction("A"), PinDirection::Input);

        let only = CellMaster::timing_only(timing);
        assert!(!only.is_placeable());
        assert_eq!(only.size(), (0, 0));
    }

    #[test]
    fn test_arc_delay_takes_worst_edge() {
        let mut timing = CellTiming::new("INV");
        timing.arcs.push(TimingArc {
            related_pin: "A".into(),
            pin: "Y".into(),
            cell_rise: Some(LookupTable::scalar(0.2)),
            cell_fall: Some(LookupTable::scalar(0.3)),
            ..Default::default()
        });
        assert_relative_eq!(timing.delay("A", "Y", 0.1, 0.1).unwrap(), 0.3);
        assert!(timing.delay("Y", "A", 0.1, 0.1).is_none());
    }

    #[test]
    fn test_supply_pins_are_not_signal_pins() {
        let mut vdd = CellPin::new("VDD", PinDirection::InOut);
        vdd.pin_use = PinUse::Power;
        let geom = CellGeometry::new(10, 10)
            .with_pin(CellPin::new("A", PinDirection::Input))
            .with_pin(vdd);
        let master = CellMaster::with_geometry("INV", geom);
        let names: Vec<_> = master.signal_pins().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A"]);
    }
}
