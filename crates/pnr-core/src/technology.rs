//! Technology model: layer stack, per-layer rules, via rules and sites.
//!
//! A [`Technology`] is built once from a [`TechnologySpec`] and is read-only
//! afterwards, so it can be shared between floorplanner and router threads
//! behind an `Arc` without locking.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PnrError, Result};
use crate::geometry::{Coord, Point, Rect};
use crate::ids::LayerId;
use crate::layer::{FillPattern, Layer, LayerColor, LayerKind, LayerStack, RoutingDirection};

// ── Source form ──────────────────────────────────────────────────────

/// Serialisable description of a technology, as produced by the LEF
/// technology reader or written by hand as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologySpec {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_dbu_per_micron")]
    pub dbu_per_micron: Coord,
    #[serde(default = "default_grid")]
    pub manufacturing_grid: Coord,
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub vias: Vec<ViaSpec>,
    #[serde(default)]
    pub sites: Vec<SiteSpec>,
}

impl Default for TechnologySpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            dbu_per_micron: default_dbu_per_micron(),
            manufacturing_grid: default_grid(),
            layers: Vec::new(),
            vias: Vec::new(),
            sites: Vec::new(),
        }
    }
}

fn default_dbu_per_micron() -> Coord {
    1000
}

fn default_grid() -> Coord {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
    /// Stack position. Defaults to the declaration position.
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub direction: RoutingDirection,
    #[serde(default)]
    pub pitch: Coord,
    /// Track offset; half the pitch when absent.
    #[serde(default)]
    pub offset: Option<Coord>,
    #[serde(default)]
    pub width: Coord,
    #[serde(default)]
    pub spacing: Coord,
    /// Via enclosure required around cuts landing on this layer.
    #[serde(default)]
    pub enclosure: Coord,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub fill_pattern: Option<FillPattern>,
}

impl LayerSpec {
    pub fn routing(name: &str, direction: RoutingDirection, pitch: Coord, width: Coord) -> Self {
        Self {
            name: name.to_string(),
            kind: LayerKind::Routing,
            index: None,
            direction,
            pitch,
            offset: None,
            width,
            spacing: (pitch - width).max(0),
            enclosure: 0,
            color: None,
            fill_pattern: None,
        }
    }

    pub fn cut(name: &str, width: Coord) -> Self {
        Self {
            name: name.to_string(),
            kind: LayerKind::Cut,
            index: None,
            direction: RoutingDirection::None,
            pitch: 0,
            offset: None,
            width,
            spacing: 0,
            enclosure: 0,
            color: None,
            fill_pattern: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViaSpec {
    pub name: String,
    pub bottom: String,
    #[serde(default)]
    pub cut: Option<String>,
    pub top: String,
    #[serde(default)]
    pub cut_size: Coord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteClass {
    #[default]
    Core,
    Pad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSpec {
    pub name: String,
    #[serde(default)]
    pub class: SiteClass,
    pub width: Coord,
    pub height: Coord,
}

// ── Loaded form ──────────────────────────────────────────────────────

/// Geometric constraints for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpacingRule {
    pub min_spacing: Coord,
    pub min_width: Coord,
    pub enclosure: Coord,
}

/// Legal way to move between two adjacent routing layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViaRule {
    pub name: String,
    pub bottom: LayerId,
    pub cut: Option<LayerId>,
    pub top: LayerId,
    pub cut_size: Coord,
    /// True when the rule was synthesised rather than declared.
    pub derived: bool,
}

impl ViaRule {
    pub fn connects(&self, a: LayerId, b: LayerId) -> bool {
        (self.bottom == a && self.top == b) || (self.bottom == b && self.top == a)
    }

    /// Cut rectangle centred at `center`.
    pub fn cut_rect(&self, center: Point) -> Rect {
        let h = self.cut_size / 2;
        Rect::new(center.x - h, center.y - h, center.x + h, center.y + h)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub class: SiteClass,
    pub width: Coord,
    pub height: Coord,
}

/// A validated, immutable technology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    pub dbu_per_micron: Coord,
    pub manufacturing_grid: Coord,
    layers: LayerStack,
    rules: Vec<SpacingRule>,
    vias: Vec<ViaRule>,
    sites: IndexMap<String, Site>,
}

impl Technology {
    /// Validate a spec and build the technology. Any rule that names an
    /// undeclared layer, or a stack that is not strictly monotonic, fails
    /// with `MalformedTechnology`.
    pub fn load(spec: &TechnologySpec) -> Result<Self> {
        if spec.layers.is_empty() {
            return Err(PnrError::malformed("technology declares no layers"));
        }
        if spec.dbu_per_micron <= 0 {
            return Err(PnrError::malformed("dbu_per_micron must be positive"));
        }
        if spec.manufacturing_grid <= 0 {
            return Err(PnrError::malformed("manufacturing grid must be positive"));
        }

        let mut layers = LayerStack::new();
        let mut rules = Vec::with_capacity(spec.layers.len());
        let mut names = HashSet::new();
        let mut last_index: Option<u32> = None;

        for (pos, ls) in spec.layers.iter().enumerate() {
            if ls.name.is_empty() {
                return Err(PnrError::malformed(format!("layer #{pos} has no name")));
            }
            if !names.insert(ls.name.as_str()) {
                return Err(PnrError::malformed(format!(
                    "duplicate layer '{}'",
                    ls.name
                )));
            }
            let index = ls.index.unwrap_or(pos as u32);
            if let Some(prev) = last_index {
                if index <= prev {
                    return Err(PnrError::malformed(format!(
                        "layer '{}' has index {index}, not above previous index {prev}",
                        ls.name
                    )));
                }
            }
            last_index = Some(index);

            if ls.kind == LayerKind::Routing {
                if ls.pitch <= 0 || ls.width <= 0 {
                    return Err(PnrError::malformed(format!(
                        "routing layer '{}' needs positive pitch and width",
                        ls.name
                    )));
                }
                if ls.width > ls.pitch {
                    return Err(PnrError::malformed(format!(
                        "routing layer '{}' is wider than its pitch",
                        ls.name
                    )));
                }
                if ls.direction == RoutingDirection::None {
                    return Err(PnrError::malformed(format!(
                        "routing layer '{}' has no preferred direction",
                        ls.name
                    )));
                }
            }
            if ls.width < 0 || ls.spacing < 0 || ls.enclosure < 0 {
                return Err(PnrError::malformed(format!(
                    "layer '{}' has a negative rule value",
                    ls.name
                )));
            }

            let id = LayerId::from_index(pos);
            let mut layer = Layer::new(id, &ls.name, ls.kind, index);
            if ls.kind == LayerKind::Routing {
                layer = layer.with_routing(ls.direction, ls.pitch, ls.width);
                if let Some(offset) = ls.offset {
                    layer.offset = offset;
                }
            } else {
                layer.width = ls.width;
            }
            layer.spacing = ls.spacing;
            if let Some(hex) = &ls.color {
                layer.appearance.color = LayerColor::from_hex(hex).ok_or_else(|| {
                    PnrError::malformed(format!("layer '{}' has bad colour '{hex}'", ls.name))
                })?;
            }
            if let Some(pattern) = ls.fill_pattern {
                layer.appearance.fill_pattern = pattern;
            }
            layers.push(layer);
            rules.push(SpacingRule {
                min_spacing: ls.spacing,
                min_width: ls.width,
                enclosure: ls.enclosure,
            });
        }

        let mut tech = Self {
            name: spec.name.clone(),
            dbu_per_micron: spec.dbu_per_micron,
            manufacturing_grid: spec.manufacturing_grid,
            layers,
            rules,
            vias: Vec::new(),
            sites: IndexMap::new(),
        };

        for vs in &spec.vias {
            let rule = tech.resolve_via(vs)?;
            tech.vias.push(rule);
        }
        tech.derive_vias();

        for ss in &spec.sites {
            if ss.width <= 0 || ss.height <= 0 {
                return Err(PnrError::malformed(format!(
                    "site '{}' needs a positive size",
                    ss.name
                )));
            }
            let site = Site {
                name: ss.name.clone(),
                class: ss.class,
                width: ss.width,
                height: ss.height,
            };
            if tech.sites.insert(ss.name.clone(), site).is_some() {
                return Err(PnrError::malformed(format!("duplicate site '{}'", ss.name)));
            }
        }

        log::info!(
            "Loaded technology '{}': {} layers ({} routing), {} via rules, {} sites",
            tech.name,
            tech.layers.layer_count(),
            tech.layers.routing_layers().count(),
            tech.vias.len(),
            tech.sites.len()
        );
        Ok(tech)
    }

    fn resolve_via(&self, vs: &ViaSpec) -> Result<ViaRule> {
        let routing = |name: &str| -> Result<&Layer> {
            match self.layers.by_name(name) {
                Some(l) if l.is_routing() => Ok(l),
                Some(_) => Err(PnrError::malformed(format!(
                    "via '{}' lands on non-routing layer '{name}'",
                    vs.name
                ))),
                None => Err(PnrError::malformed(format!(
                    "via '{}' references undeclared layer '{name}'",
                    vs.name
                ))),
            }
        };
        let a = routing(&vs.bottom)?;
        let b = routing(&vs.top)?;
        if a.id == b.id {
            return Err(PnrError::malformed(format!(
                "via '{}' connects layer '{}' to itself",
                vs.name, a.name
            )));
        }
        let (bottom, top) = if a.index < b.index { (a, b) } else { (b, a) };

        let cut = match &vs.cut {
            Some(name) => match self.layers.by_name(name) {
                Some(l) if l.kind == LayerKind::Cut => Some(l.id),
                Some(_) => {
                    return Err(PnrError::malformed(format!(
                        "via '{}' cut layer '{name}' is not a cut layer",
                        vs.name
                    )))
                }
                None => {
                    return Err(PnrError::malformed(format!(
                        "via '{}' references undeclared layer '{name}'",
                        vs.name
                    )))
                }
            },
            None => None,
        };
        let cut_size = if vs.cut_size > 0 {
            vs.cut_size
        } else {
            bottom.width.min(top.width)
        };
        Ok(ViaRule {
            name: vs.name.clone(),
            bottom: bottom.id,
            cut,
            top: top.id,
            cut_size,
            derived: false,
        })
    }

    /// Synthesise a rule for every adjacent routing pair that has none.
    fn derive_vias(&mut self) {
        let routing: Vec<&Layer> = self.layers.routing_layers().collect();
        let mut derived = Vec::new();
        for pair in routing.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if self.vias.iter().any(|v| v.connects(lo.id, hi.id)) {
                continue;
            }
            let cut = self
                .layers
                .all_layers()
                .iter()
                .find(|l| l.kind == LayerKind::Cut && l.index > lo.index && l.index < hi.index)
                .map(|l| l.id);
            log::debug!("Deriving via rule between {} and {}", lo.name, hi.name);
            derived.push(ViaRule {
                name: format!("VIA_{}_{}", lo.name, hi.name),
                bottom: lo.id,
                cut,
                top: hi.id,
                cut_size: lo.width.min(hi.width),
                derived: true,
            });
        }
        self.vias.extend(derived);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.by_name(name)
    }

    pub fn spacing_rule(&self, layer: LayerId) -> Option<SpacingRule> {
        self.rules.get(layer.index()).copied()
    }

    /// Via rule between two layers, in either argument order.
    pub fn via_rule(&self, from: LayerId, to: LayerId) -> Option<&ViaRule> {
        self.vias.iter().find(|v| v.connects(from, to))
    }

    pub fn via_rules(&self) -> &[ViaRule] {
        &self.vias
    }

    pub fn routing_layers(&self) -> Vec<&Layer> {
        self.layers.routing_layers().collect()
    }

    pub fn is_routing_layer(&self, id: LayerId) -> bool {
        self.layer(id).is_some_and(|l| l.is_routing())
    }

    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.get(name)
    }

    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    /// Smallest routing pitch among layers running in `direction`.
    pub fn min_pitch(&self, direction: RoutingDirection) -> Option<Coord> {
        self.layers
            .routing_layers()
            .filter(|l| l.direction == direction)
            .map(|l| l.pitch)
            .min()
    }

    /// Pitch and offset of the shared track pattern for wires running in
    /// `direction`: horizontal wires fix the y tracks, vertical wires the x
    /// tracks. The coarsest pitch wins so every layer can use every track;
    /// layers without a preferred direction are used when none match.
    pub fn track_pattern(&self, direction: RoutingDirection) -> Option<(Coord, Coord)> {
        let coarsest = |want: Option<RoutingDirection>| {
            self.layers
                .routing_layers()
                .filter(|l| want.map_or(true, |d| l.direction == d))
                .fold(None::<&Layer>, |best, l| match best {
                    Some(b) if b.pitch >= l.pitch => Some(b),
                    _ => Some(l),
                })
                .map(|l| (l.pitch, l.offset))
        };
        coarsest(Some(direction)).or_else(|| coarsest(None))
    }

    /// Round down onto the manufacturing grid.
    pub fn snap(&self, value: Coord) -> Coord {
        value.div_euclid(self.manufacturing_grid) * self.manufacturing_grid
    }

    pub fn microns_to_dbu(&self, microns: f64) -> Coord {
        (microns * self.dbu_per_micron as f64).round() as Coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_metal_spec() -> TechnologySpec {
        TechnologySpec {
            name: "toy".into(),
            dbu_per_micron: 1000,
            manufacturing_grid: 1,
            layers: vec![
                LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4),
                LayerSpec::cut("V1", 4),
                LayerSpec::routing("M2", RoutingDirection::Vertical, 10, 4),
            ],
            vias: vec![],
            sites: vec![],
        }
    }

    #[test]
    fn test_load_and_query() {
        let tech = Technology::load(&two_metal_spec()).unwrap();
        let m1 = tech.layer_by_name("M1").unwrap();
        let m2 = tech.layer_by_name("M2").unwrap();
        assert_eq!(m1.pitch, 10);
        assert_eq!(m1.offset, 5);
        assert_eq!(m2.direction, RoutingDirection::Vertical);
        assert!(m2.index > m1.index);
        assert_eq!(tech.routing_layers().len(), 2);
        assert_eq!(tech.spacing_rule(m1.id).unwrap().min_spacing, 6);
        assert!(tech.layer_by_name("M3").is_none());
    }

    #[test]
    fn test_via_rule_is_derived_and_symmetric() {
        let tech = Technology::load(&two_metal_spec()).unwrap();
        let m1 = tech.layer_by_name("M1").unwrap().id;
        let m2 = tech.layer_by_name("M2").unwrap().id;
        let v1 = tech.layer_by_name("V1").unwrap().id;
        let via = tech.via_rule(m1, m2).unwrap();
        assert!(via.derived);
        assert_eq!(via.cut, Some(v1));
        assert_eq!(tech.via_rule(m2, m1), Some(via));
        assert!(tech.via_rule(m1, m1).is_none());
    }

    #[test]
    fn test_non_monotonic_stack_rejected() {
        let mut spec = two_metal_spec();
        spec.layers[0].index = Some(5);
        spec.layers[1].index = Some(5);
        assert!(matches!(
            Technology::load(&spec),
            Err(PnrError::MalformedTechnology(_))
        ));
    }

    #[test]
    fn test_via_with_unknown_layer_rejected() {
        let mut spec = two_metal_spec();
        spec.vias.push(ViaSpec {
            name: "VIA12".into(),
            bottom: "M1".into(),
            cut: None,
            top: "M9".into(),
            cut_size: 4,
        });
        let err = Technology::load(&spec).unwrap_err();
        assert!(err.to_string().contains("M9"));
    }

    #[test]
    fn test_routing_layer_without_pitch_rejected() {
        let mut spec = two_metal_spec();
        spec.layers[2].pitch = 0;
        assert!(Technology::load(&spec).is_err());
    }

    #[test]
    fn test_spec_from_json_defaults() {
        let json = r##"{
            "layers": [
                {"name": "M1", "kind": "Routing", "direction": "Horizontal", "pitch": 10, "width": 4},
                {"name": "M2", "kind": "Routing", "direction": "Vertical", "pitch": 20, "width": 6, "color": "#ff0000"}
            ],
            "sites": [{"name": "core", "width": 10, "height": 10}]
        }"##;
        let spec: TechnologySpec = serde_json::from_str(json).unwrap();
        let tech = Technology::load(&spec).unwrap();
        assert_eq!(tech.dbu_per_micron, 1000);
        assert_eq!(tech.layer_by_name("M2").unwrap().appearance.color.r, 255);
        assert_eq!(tech.site("core").unwrap().class, SiteClass::Core);
        assert_eq!(tech.min_pitch(RoutingDirection::Vertical), Some(20));
        assert_eq!(tech.track_pattern(RoutingDirection::Vertical), Some((20, 10)));
        assert_eq!(tech.track_pattern(RoutingDirection::Horizontal), Some((10, 5)));
    }

    #[test]
    fn test_track_pattern_falls_back_to_any_layer() {
        let spec = TechnologySpec {
            layers: vec![LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4)],
            ..Default::default()
        };
        let tech = Technology::load(&spec).unwrap();
        assert_eq!(tech.track_pattern(RoutingDirection::Vertical), Some((10, 5)));
    }
}
