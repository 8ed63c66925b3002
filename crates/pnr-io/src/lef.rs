//! LEF reader for technology (layers, vias, sites, units) and cell macros.
//!
//! A LEF source is parsed into a [`LefDocument`] first; the document is then
//! converted either into a [`TechnologySpec`] or into cell geometry against
//! an already loaded [`Technology`]. Both conversions are all-or-nothing.
//!
//! Coordinates in LEF are microns. They are converted to database units
//! with `UNITS DATABASE MICRONS` when present, else the technology value.

use thiserror::Error;

use pnr_core::cell::{CellClass, CellGeometry, CellPin, LayerShape, PinDirection, PinUse, Symmetry};
use pnr_core::geometry::{Coord, Point, Polygon, Rect, Shape};
use pnr_core::layer::{LayerKind, RoutingDirection};
use pnr_core::technology::{LayerSpec, SiteClass, SiteSpec, Technology, TechnologySpec, ViaSpec};
use pnr_core::{PnrError, Result};

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {message}")]
pub struct LefError {
    pub line: usize,
    pub message: String,
}

impl LefError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    fn into_geometry(self) -> PnrError {
        PnrError::GeometryParse {
            line: self.line,
            message: self.message,
        }
    }

    fn into_technology(self) -> PnrError {
        PnrError::MalformedTechnology(self.to_string())
    }
}

// ── Document ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LefGeometry {
    Rect([f64; 4]),
    Polygon(Vec<[f64; 2]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LefLayer {
    pub name: String,
    pub kind: Option<String>,
    pub direction: Option<String>,
    pub pitch: Option<(f64, f64)>,
    pub offset: Option<(f64, f64)>,
    pub width: Option<f64>,
    pub spacing: Option<f64>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LefVia {
    pub name: String,
    pub is_default: bool,
    pub shapes: Vec<(String, LefGeometry)>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LefSite {
    pub name: String,
    pub class: Option<String>,
    pub size: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LefPin {
    pub name: String,
    pub direction: Option<String>,
    pub pin_use: Option<String>,
    pub shapes: Vec<(String, LefGeometry, usize)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LefMacro {
    pub name: String,
    pub class: Option<String>,
    pub origin: (f64, f64),
    pub size: Option<(f64, f64)>,
    pub site: Option<String>,
    pub symmetry: Symmetry,
    pub pins: Vec<LefPin>,
    pub obstructions: Vec<(String, LefGeometry, usize)>,
    pub line: usize,
}

/// Everything a LEF file declares, in source order and source units.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LefDocument {
    pub dbu_per_micron: Option<Coord>,
    pub manufacturing_grid: Option<f64>,
    pub layers: Vec<LefLayer>,
    pub vias: Vec<LefVia>,
    pub sites: Vec<LefSite>,
    pub macros: Vec<LefMacro>,
}

impl LefDocument {
    pub fn parse(src: &str) -> std::result::Result<Self, LefError> {
        LefParser::new(src).parse()
    }

    /// Layer stack, vias and sites as a technology spec.
    pub fn to_technology_spec(&self) -> Result<TechnologySpec> {
        let dbu = self.dbu_per_micron.unwrap_or(1000);
        let to_dbu = |v: f64| (v * dbu as f64).round() as Coord;

        let mut layers = Vec::with_capacity(self.layers.len());
        for l in &self.layers {
            let kind = l
                .kind
                .as_deref()
                .map(|k| {
                    LayerKind::from_lef(k).ok_or_else(|| {
                        LefError::new(l.line, format!("unknown layer type '{k}'")).into_technology()
                    })
                })
                .transpose()?
                .ok_or_else(|| {
                    LefError::new(l.line, format!("layer '{}' has no TYPE", l.name)).into_technology()
                })?;
            let direction = match l.direction.as_deref() {
                Some(d) if d.eq_ignore_ascii_case("HORIZONTAL") => RoutingDirection::Horizontal,
                Some(d) if d.eq_ignore_ascii_case("VERTICAL") => RoutingDirection::Vertical,
                _ => RoutingDirection::None,
            };
            // tracks of a horizontal layer are stacked in y, so its y pitch applies
            let pick = |pair: (f64, f64)| match direction {
                RoutingDirection::Horizontal => pair.1,
                _ => pair.0,
            };
            let width = l.width.map(to_dbu).unwrap_or(0);
            layers.push(LayerSpec {
                name: l.name.clone(),
                kind,
                index: None,
                direction,
                pitch: l.pitch.map(|p| to_dbu(pick(p))).unwrap_or(0),
                offset: l.offset.map(|o| to_dbu(pick(o))),
                width,
                spacing: l.spacing.map(to_dbu).unwrap_or(0),
                enclosure: 0,
                color: None,
                fill_pattern: None,
            });
        }

        let kind_of = |name: &str| {
            layers
                .iter()
                .find(|l| l.name == name)
                .map(|l| l.kind)
        };
        let mut vias = Vec::new();
        for v in self.vias.iter().filter(|v| v.is_default) {
            let mut metals: Vec<&str> = Vec::new();
            let mut cut: Option<(&str, Coord)> = None;
            for (layer, geom) in &v.shapes {
                match kind_of(layer) {
                    Some(LayerKind::Routing) => {
                        if !metals.contains(&layer.as_str()) {
                            metals.push(layer);
                        }
                    }
                    Some(LayerKind::Cut) => {
                        let size = match geom {
                            LefGeometry::Rect([x1, _, x2, _]) => to_dbu((x2 - x1).abs()),
                            LefGeometry::Polygon(_) => 0,
                        };
                        cut.get_or_insert((layer.as_str(), size));
                    }
                    Some(_) => {}
                    None => {
                        return Err(LefError::new(
                            v.line,
                            format!("via '{}' uses undeclared layer '{layer}'", v.name),
                        )
                        .into_technology())
                    }
                }
            }
            if metals.len() != 2 {
                return Err(LefError::new(
                    v.line,
                    format!("via '{}' must land on two routing layers", v.name),
                )
                .into_technology());
            }
            vias.push(ViaSpec {
                name: v.name.clone(),
                bottom: metals[0].to_string(),
                cut: cut.map(|(n, _)| n.to_string()),
                top: metals[1].to_string(),
                cut_size: cut.map_or(0, |(_, s)| s),
            });
        }

        let sites = self
            .sites
            .iter()
            .map(|s| SiteSpec {
                name: s.name.clone(),
                class: match s.class.as_deref() {
                    Some(c) if c.eq_ignore_ascii_case("PAD") => SiteClass::Pad,
                    _ => SiteClass::Core,
                },
                width: to_dbu(s.size.0),
                height: to_dbu(s.size.1),
            })
            .collect();

        Ok(TechnologySpec {
            name: String::new(),
            dbu_per_micron: dbu,
            manufacturing_grid: self
                .manufacturing_grid
                .map(|g| to_dbu(g).max(1))
                .unwrap_or(1),
            layers,
            vias,
            sites,
        })
    }

    /// Cell geometry of every macro, with layers resolved against `tech`.
    pub fn to_cells(&self, tech: &Technology) -> Result<Vec<(String, CellGeometry)>> {
        let dbu = self.dbu_per_micron.unwrap_or(tech.dbu_per_micron);
        let to_dbu = |v: f64| (v * dbu as f64).round() as Coord;
        let convert = |layer: &str, geom: &LefGeometry, origin: (f64, f64), line: usize| -> Result<LayerShape> {
            let layer = tech
                .layer_by_name(layer)
                .ok_or_else(|| {
                    LefError::new(line, format!("unknown layer '{layer}'")).into_geometry()
                })?
                .id;
            let shape = match geom {
                LefGeometry::Rect([x1, y1, x2, y2]) => Shape::Rect(Rect::new(
                    to_dbu(x1 + origin.0),
                    to_dbu(y1 + origin.1),
                    to_dbu(x2 + origin.0),
                    to_dbu(y2 + origin.1),
                )),
                LefGeometry::Polygon(points) => Shape::Polygon(Polygon::new(
                    points
                        .iter()
                        .map(|[x, y]| Point::new(to_dbu(x + origin.0), to_dbu(y + origin.1)))
                        .collect(),
                )),
            };
            Ok(LayerShape { layer, shape })
        };

        let mut cells = Vec::with_capacity(self.macros.len());
        for m in &self.macros {
            let (w, h) = m.size.ok_or_else(|| {
                LefError::new(m.line, format!("macro '{}' has no SIZE", m.name)).into_geometry()
            })?;
            let mut geom = CellGeometry::new(to_dbu(w), to_dbu(h));
            geom.class = m.class.as_deref().map(CellClass::parse).unwrap_or_default();
            geom.site = m.site.clone();
            geom.symmetry = m.symmetry;
            for p in &m.pins {
                let mut pin = CellPin::new(
                    &p.name,
                    p.direction
                        .as_deref()
                        .map(PinDirection::parse)
                        .unwrap_or_default(),
                );
                pin.pin_use = p.pin_use.as_deref().map(PinUse::parse).unwrap_or_default();
                for (layer, g, line) in &p.shapes {
                    pin.shapes.push(convert(layer, g, m.origin, *line)?);
                }
                geom.pins.push(pin);
            }
            for (layer, g, line) in &m.obstructions {
                geom.obstructions.push(convert(layer, g, m.origin, *line)?);
            }
            cells.push((m.name.clone(), geom));
        }
        Ok(cells)
    }
}

/// Parse a technology LEF into a spec.
pub fn read_technology(src: &str) -> Result<TechnologySpec> {
    let doc = LefDocument::parse(src).map_err(LefError::into_technology)?;
    doc.to_technology_spec()
}

/// Parse a cell LEF into geometry for the cell library.
pub fn read_cells(src: &str, tech: &Technology) -> Result<Vec<(String, CellGeometry)>> {
    let doc = LefDocument::parse(src).map_err(LefError::into_geometry)?;
    let cells = doc.to_cells(tech)?;
    log::info!("Read {} macros from LEF", cells.len());
    Ok(cells)
}

// ── Tokenizer ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    line: usize,
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let line = idx + 1;
        let mut chars = raw.chars().peekable();
        let mut word = String::new();
        let flush = |word: &mut String, tokens: &mut Vec<Token>| {
            if !word.is_empty() {
                tokens.push(Token {
                    text: std::mem::take(word),
                    line,
                });
            }
        };
        while let Some(c) = chars.next() {
            match c {
                '#' => break,
                '"' => {
                    flush(&mut word, &mut tokens);
                    let mut s = String::new();
                    for q in chars.by_ref() {
                        if q == '"' {
                            break;
                        }
                        s.push(q);
                    }
                    tokens.push(Token { text: s, line });
                }
                ';' => {
                    flush(&mut word, &mut tokens);
                    tokens.push(Token {
                        text: ";".into(),
                        line,
                    });
                }
                c if c.is_whitespace() => flush(&mut word, &mut tokens),
                c => word.push(c),
            }
        }
        flush(&mut word, &mut tokens);
    }
    tokens
}

// ── Parser ────────────────────────────────────────────────────────────

struct LefParser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, LefError>;

impl LefParser {
    fn new(src: &str) -> Self {
        Self {
            tokens: tokenize(src),
            pos: 0,
        }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.line)
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|t| t.text.as_str())
    }

    fn next(&mut self) -> ParseResult<String> {
        let line = self.line();
        let tok = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| LefError::new(line, "unexpected end of file"))?;
        self.pos += 1;
        Ok(tok.text.clone())
    }

    fn expect(&mut self, text: &str) -> ParseResult<()> {
        let line = self.line();
        let tok = self.next()?;
        if tok.eq_ignore_ascii_case(text) {
            Ok(())
        } else {
            Err(LefError::new(line, format!("expected '{text}', found '{tok}'")))
        }
    }

    fn number(&mut self) -> ParseResult<f64> {
        let line = self.line();
        let tok = self.next()?;
        tok.parse::<f64>()
            .map_err(|_| LefError::new(line, format!("expected a number, found '{tok}'")))
    }

    /// Skip the rest of a statement including its `;`.
    fn skip_statement(&mut self) -> ParseResult<()> {
        while self.next()? != ";" {}
        Ok(())
    }

    /// Skip a block up to and including `END <name>`.
    fn skip_block(&mut self, name: &str) -> ParseResult<()> {
        loop {
            let tok = self.next()?;
            if tok.eq_ignore_ascii_case("END") && self.peek().is_some_and(|n| n == name) {
                self.pos += 1;
                return Ok(());
            }
        }
    }

    /// Consume `END <name>`.
    fn end(&mut self, name: &str) -> ParseResult<()> {
        self.expect("END")?;
        let line = self.line();
        let tok = self.next()?;
        if tok != name {
            return Err(LefError::new(line, format!("expected 'END {name}', found 'END {tok}'")));
        }
        Ok(())
    }

    fn parse(mut self) -> ParseResult<LefDocument> {
        let mut doc = LefDocument::default();
        while let Some(tok) = self.peek() {
            let keyword = tok.to_ascii_uppercase();
            match keyword.as_str() {
                "UNITS" => {
                    self.pos += 1;
                    self.parse_units(&mut doc)?;
                }
                "MANUFACTURINGGRID" => {
                    self.pos += 1;
                    doc.manufacturing_grid = Some(self.number()?);
                    self.expect(";")?;
                }
                "LAYER" => {
                    self.pos += 1;
                    let layer = self.parse_layer()?;
                    doc.layers.push(layer);
                }
                "VIA" => {
                    self.pos += 1;
                    let via = self.parse_via()?;
                    doc.vias.push(via);
                }
                "SITE" => {
                    self.pos += 1;
                    let site = self.parse_site()?;
                    doc.sites.push(site);
                }
                "MACRO" => {
                    self.pos += 1;
                    let m = self.parse_macro()?;
                    doc.macros.push(m);
                }
                "VIARULE" | "NONDEFAULTRULE" => {
                    self.pos += 1;
                    let name = self.next()?;
                    self.skip_block(&name)?;
                }
                "PROPERTYDEFINITIONS" | "SPACING" => {
                    self.pos += 1;
                    self.skip_block(&keyword)?;
                }
                "BEGINEXT" => {
                    while !self.next()?.eq_ignore_ascii_case("ENDEXT") {}
                }
                "END" => {
                    self.pos += 1;
                    let what = self.next()?;
                    if what.eq_ignore_ascii_case("LIBRARY") {
                        break;
                    }
                }
                _ => self.skip_statement()?,
            }
        }
        Ok(doc)
    }

    fn parse_units(&mut self, doc: &mut LefDocument) -> ParseResult<()> {
        loop {
            let tok = self.next()?.to_ascii_uppercase();
            match tok.as_str() {
                "DATABASE" => {
                    self.expect("MICRONS")?;
                    let line = self.line();
                    let v = self.number()?;
                    if v <= 0.0 {
                        return Err(LefError::new(line, "DATABASE MICRONS must be positive"));
                    }
                    doc.dbu_per_micron = Some(v.round() as Coord);
                    self.expect(";")?;
                }
                "END" => {
                    self.expect("UNITS")?;
                    return Ok(());
                }
                _ => self.skip_statement()?,
            }
        }
    }

    fn parse_layer(&mut self) -> ParseResult<LefLayer> {
        let line = self.line();
        let name = self.next()?;
        let mut layer = LefLayer {
            name: name.clone(),
            kind: None,
            direction: None,
            pitch: None,
            offset: None,
            width: None,
            spacing: None,
            line,
        };
        loop {
            let tok = self.peek().unwrap_or_default().to_ascii_uppercase();
            match tok.as_str() {
                "END" => {
                    self.end(&name)?;
                    return Ok(layer);
                }
                "TYPE" => {
                    self.pos += 1;
                    layer.kind = Some(self.next()?);
                    self.skip_statement()?;
                }
                "DIRECTION" => {
                    self.pos += 1;
                    layer.direction = Some(self.next()?);
                    self.skip_statement()?;
                }
                "PITCH" | "OFFSET" => {
                    self.pos += 1;
                    let a = self.number()?;
                    let b = if self.peek() == Some(";") { a } else { self.number()? };
                    self.expect(";")?;
                    if tok == "PITCH" {
                        layer.pitch = Some((a, b));
                    } else {
                        layer.offset = Some((a, b));
                    }
                }
                "WIDTH" => {
                    self.pos += 1;
                    layer.width = Some(self.number()?);
                    self.skip_statement()?;
                }
                "SPACING" => {
                    self.pos += 1;
                    let v = self.number()?;
                    // the first plain SPACING is the minimum; range forms follow it
                    layer.spacing.get_or_insert(v);
                    self.skip_statement()?;
                }
                _ => {
                    self.pos += 1;
                    self.skip_statement()?;
                }
            }
        }
    }

    fn parse_geometry(&mut self) -> ParseResult<LefGeometry> {
        let kind = self.next()?.to_ascii_uppercase();
        if self.peek().is_some_and(|t| t.eq_ignore_ascii_case("MASK")) {
            self.pos += 2;
        }
        let geom = match kind.as_str() {
            "RECT" => LefGeometry::Rect([self.number()?, self.number()?, self.number()?, self.number()?]),
            "POLYGON" => {
                let mut points = Vec::new();
                while self.peek() != Some(";") {
                    points.push([self.number()?, self.number()?]);
                }
                if points.len() < 3 {
                    return Err(LefError::new(self.line(), "polygon needs at least 3 points"));
                }
                LefGeometry::Polygon(points)
            }
            other => return Err(LefError::new(self.line(), format!("unsupported geometry '{other}'"))),
        };
        self.expect(";")?;
        Ok(geom)
    }

    /// LAYER / RECT / POLYGON statements up to `END`.
    fn parse_layer_geometries(&mut self) -> ParseResult<Vec<(String, LefGeometry, usize)>> {
        let mut shapes = Vec::new();
        let mut current: Option<String> = None;
        loop {
            let line = self.line();
            let tok = self.peek().unwrap_or_default().to_ascii_uppercase();
            match tok.as_str() {
                "END" => {
                    self.pos += 1;
                    return Ok(shapes);
                }
                "LAYER" => {
                    self.pos += 1;
                    current = Some(self.next()?);
                    self.skip_statement()?;
                }
                "RECT" | "POLYGON" => {
                    let layer = current
                        .clone()
                        .ok_or_else(|| LefError::new(line, "geometry before any LAYER"))?;
                    let g = self.parse_geometry()?;
                    shapes.push((layer, g, line));
                }
                "" => return Err(LefError::new(line, "unexpected end of file")),
                _ => {
                    self.pos += 1;
                    self.skip_statement()?;
                }
            }
        }
    }

    fn parse_via(&mut self) -> ParseResult<LefVia> {
        let line = self.line();
        let name = self.next()?;
        let mut is_default = false;
        if self.peek().is_some_and(|t| t.eq_ignore_ascii_case("DEFAULT")) {
            self.pos += 1;
            is_default = true;
        }
        let mut shapes = Vec::new();
        let mut current: Option<String> = None;
        loop {
            let tok = self.peek().unwrap_or_default().to_ascii_uppercase();
            match tok.as_str() {
                "END" => {
                    self.end(&name)?;
                    return Ok(LefVia {
                        name,
                        is_default,
                        shapes,
                        line,
                    });
                }
                "LAYER" => {
                    self.pos += 1;
                    current = Some(self.next()?);
                    self.skip_statement()?;
                }
                "RECT" | "POLYGON" => {
                    let layer = current
                        .clone()
                        .ok_or_else(|| LefError::new(self.line(), "via geometry before any LAYER"))?;
                    let g = self.parse_geometry()?;
                    shapes.push((layer, g));
                }
                _ => {
                    self.pos += 1;
                    self.skip_statement()?;
                }
            }
        }
    }

    fn parse_site(&mut self) -> ParseResult<LefSite> {
        let name = self.next()?;
        let mut class = None;
        let mut size = None;
        loop {
            let line = self.line();
            let tok = self.peek().unwrap_or_default().to_ascii_uppercase();
            match tok.as_str() {
                "END" => {
                    self.end(&name)?;
                    let size = size.ok_or_else(|| LefError::new(line, format!("site '{name}' has no SIZE")))?;
                    return Ok(LefSite { name, class, size });
                }
                "CLASS" => {
                    self.pos += 1;
                    class = Some(self.next()?);
                    self.skip_statement()?;
                }
                "SIZE" => {
                    self.pos += 1;
                    let w = self.number()?;
                    self.expect("BY")?;
                    let h = self.number()?;
                    self.expect(";")?;
                    size = Some((w, h));
                }
                _ => {
                    self.pos += 1;
                    self.skip_statement()?;
                }
            }
        }
    }

    fn parse_macro(&mut self) -> ParseResult<LefMacro> {
        let line = self.line();
        let name = self.next()?;
        let mut m = LefMacro {
            name: name.clone(),
            line,
            ..Default::default()
        };
        loop {
            let tok = self.peek().unwrap_or_default().to_ascii_uppercase();
            match tok.as_str() {
                "END" => {
                    self.end(&name)?;
                    return Ok(m);
                }
                "CLASS" => {
                    self.pos += 1;
                    m.class = Some(self.next()?);
                    self.skip_statement()?;
                }
                "ORIGIN" => {
                    self.pos += 1;
                    m.origin = (self.number()?, self.number()?);
                    self.expect(";")?;
                }
                "SIZE" => {
                    self.pos += 1;
                    let w = self.number()?;
                    self.expect("BY")?;
                    let h = self.number()?;
                    self.expect(";")?;
                    m.size = Some((w, h));
                }
                "SITE" => {
                    self.pos += 1;
                    m.site = Some(self.next()?);
                    self.skip_statement()?;
                }
                "SYMMETRY" => {
                    self.pos += 1;
                    loop {
                        let s = self.next()?.to_ascii_uppercase();
                        match s.as_str() {
                            ";" => break,
                            "X" => m.symmetry.x = true,
                            "Y" => m.symmetry.y = true,
                            "R90" => m.symmetry.r90 = true,
                            _ => {}
                        }
                    }
                }
                "PIN" => {
                    self.pos += 1;
                    let pin = self.parse_pin()?;
                    m.pins.push(pin);
                }
                "OBS" => {
                    self.pos += 1;
                    let shapes = self.parse_layer_geometries()?;
                    m.obstructions.extend(shapes);
                }
                "" => return Err(LefError::new(self.line(), format!("macro '{name}' is not closed"))),
                _ => {
                    self.pos += 1;
                    self.skip_statement()?;
                }
            }
        }
    }

    fn parse_pin(&mut self) -> ParseResult<LefPin> {
        let name = self.next()?;
        let mut pin = LefPin {
            name: name.clone(),
            ..Default::default()
        };
        loop {
            let tok = self.peek().unwrap_or_default().to_ascii_uppercase();
            match tok.as_str() {
                "END" => {
                    self.end(&name)?;
                    return Ok(pin);
                }
                "DIRECTION" => {
                    self.pos += 1;
                    let mut dir = self.next()?;
                    // OUTPUT TRISTATE
                    if self.peek() != Some(";") {
                        dir = format!("{dir} {}", self.next()?);
                    }
                    pin.direction = Some(dir);
                    self.skip_statement_if_open()?;
                }
                "USE" => {
                    self.pos += 1;
                    pin.pin_use = Some(self.next()?);
                    self.skip_statement()?;
                }
                "PORT" => {
                    self.pos += 1;
                    let shapes = self.parse_layer_geometries()?;
                    pin.shapes.extend(shapes);
                }
                "" => return Err(LefError::new(self.line(), format!("pin '{name}' is not closed"))),
                _ => {
                    self.pos += 1;
                    self.skip_statement()?;
                }
            }
        }
    }

    fn skip_statement_if_open(&mut self) -> ParseResult<()> {
        if self.peek() == Some(";") {
            self.pos += 1;
            Ok(())
        } else {
            self.skip_statement()
        }
    }
}
