use serde::{Deserialize, Serialize};

use crate::geometry::Coord;
use crate::ids::LayerId;

/// Role of a layer in the technology stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    Routing,
    Cut,
    Obstruction,
    Masterslice,
}

impl LayerKind {
    pub fn from_lef(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ROUTING" => Some(LayerKind::Routing),
            "CUT" => Some(LayerKind::Cut),
            "OVERLAP" | "OBSTRUCTION" => Some(LayerKind::Obstruction),
            "MASTERSLICE" | "IMPLANT" => Some(LayerKind::Masterslice),
            _ => None,
        }
    }
}

/// Preferred routing direction of a routing layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingDirection {
    Horizontal,
    Vertical,
    #[default]
    None,
}

/// A technology layer. Immutable once the technology is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    /// Position in the vertical stack; strictly increasing bottom to top.
    pub index: u32,
    pub direction: RoutingDirection,
    /// Track pitch (DBU). Zero for non-routing layers.
    pub pitch: Coord,
    /// Offset of the first track from the placement origin (DBU).
    pub offset: Coord,
    /// Minimum wire width (DBU).
    pub width: Coord,
    /// Minimum same-layer spacing (DBU).
    pub spacing: Coord,
    pub appearance: LayerAppearance,
}

impl Layer {
    pub fn new(id: LayerId, name: &str, kind: LayerKind, index: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            index,
            direction: RoutingDirection::None,
            pitch: 0,
            offset: 0,
            width: 0,
            spacing: 0,
            appearance: LayerAppearance::for_index(index),
        }
    }

    pub fn with_routing(mut self, direction: RoutingDirection, pitch: Coord, width: Coord) -> Self {
        self.direction = direction;
        self.pitch = pitch;
        self.offset = pitch / 2;
        self.width = width;
        self
    }

    pub fn with_appearance(mut self, appearance: LayerAppearance) -> Self {
        self.appearance = appearance;
        self
    }

    pub fn is_routing(&self) -> bool {
        self.kind == LayerKind::Routing
    }
}

/// Presentation attributes for browsing views (colour and hatch).
/// Never consulted by placement or routing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerAppearance {
    pub color: LayerColor,
    pub fill_pattern: FillPattern,
    pub opacity: f32,
    pub visible: bool,
}

impl LayerAppearance {
    /// Deterministic default appearance cycling through a fixed palette.
    pub fn for_index(index: u32) -> Self {
        const PALETTE: [(u8, u8, u8); 6] = [
            (0, 102, 204),
            (204, 0, 0),
            (0, 153, 51),
            (204, 153, 0),
            (153, 0, 204),
            (0, 153, 153),
        ];
        const PATTERNS: [FillPattern; 4] = [
            FillPattern::Hatched,
            FillPattern::CrossHatched,
            FillPattern::Stipple,
            FillPattern::Dotted,
        ];
        let (r, g, b) = PALETTE[index as usize % PALETTE.len()];
        Self {
            color: LayerColor { r, g, b },
            fill_pattern: PATTERNS[index as usize % PATTERNS.len()],
            opacity: 0.7,
            visible: true,
        }
    }
}

/// RGB color for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for LayerColor {
    fn default() -> Self {
        Self {
            r: 128,
            g: 128,
            b: 128,
        }
    }
}

impl LayerColor {
    /// Parse `#rrggbb`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#')?;
        if s.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Hatch / fill pattern for layer display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPattern {
    Solid,
    Hatched,
    CrossHatched,
    Stipple,
    Dotted,
    Outline,
}

/// The ordered layer stack of a technology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub(crate) fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Routing layers from the bottom of the stack upwards.
    pub fn routing_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.is_routing())
    }

    pub fn all_layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
