//! Liberty (.lib) reader.
//!
//! The source is parsed into a generic tree of groups, simple attributes
//! (`name : value ;`) and complex attributes (`name (a, b) ;`), then the
//! cell groups are turned into [`CellTiming`] records. Groups the backend
//! has no use for (`ff`, `latch`, `pg_pin`, templates) are kept in the tree
//! but ignored during extraction.

use indexmap::IndexMap;

use pnr_core::cell::{CellTiming, LookupTable, PinDirection, PinTiming, PowerArc, TimingArc};
use pnr_core::{PnrError, Result};

/// Attribute value: simple attributes have one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    pub kind: String,
    pub args: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub groups: Vec<Group>,
    pub line: usize,
}

impl Group {
    pub fn name(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name)?.values.first().map(String::as_str)
    }

    pub fn attr_f64(&self, name: &str) -> Result<Option<f64>> {
        match self.attr(name) {
            None => Ok(None),
            Some(a) => {
                let raw = a.values.first().map(String::as_str).unwrap_or_default();
                raw.parse::<f64>().map(Some).map_err(|_| PnrError::TimingParse {
                    line: a.line,
                    message: format!("attribute '{name}' is not a number: '{raw}'"),
                })
            }
        }
    }

    pub fn children<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Group> + 'a {
        self.groups.iter().filter(move |g| g.kind == kind)
    }
}

/// Parse a Liberty source and extract per-cell timing. Atomic: any error
/// rejects the whole source.
pub fn read_liberty(src: &str) -> Result<Vec<CellTiming>> {
    let library = parse_groups(src)?;
    let mut cells = Vec::new();
    for cell in library.children("cell") {
        cells.push(extract_cell(cell)?);
    }
    log::info!(
        "Read {} cells from Liberty library '{}'",
        cells.len(),
        library.name().unwrap_or("?")
    );
    Ok(cells)
}

fn err(line: usize, message: impl Into<String>) -> PnrError {
    PnrError::TimingParse {
        line,
        message: message.into(),
    }
}

fn extract_cell(cell: &Group) -> Result<CellTiming> {
    let name = cell
        .name()
        .ok_or_else(|| err(cell.line, "cell group without a name"))?;
    let mut timing = CellTiming::new(name);
    timing.area = cell.attr_f64("area")?.unwrap_or(0.0);
    timing.leakage_power = cell.attr_f64("cell_leakage_power")?.unwrap_or(0.0);

    let mut pins: IndexMap<String, PinTiming> = IndexMap::new();
    for pin in cell.children("pin") {
        // `pin (A, B)` declares several pins sharing one body
        for pin_name in &pin.args {
            let direction = pin
                .attr_str("direction")
                .map(PinDirection::parse)
                .unwrap_or_default();
            pins.insert(
                pin_name.clone(),
                PinTiming {
                    name: pin_name.clone(),
                    direction,
                    capacitance: pin.attr_f64("capacitance")?.unwrap_or(0.0),
                    max_capacitance: pin.attr_f64("max_capacitance")?,
                    function: pin.attr_str("function").map(str::to_string),
                    is_clock: pin.attr_str("clock") == Some("true"),
                },
            );
            for arc in pin.children("timing") {
                let related = arc
                    .attr_str("related_pin")
                    .ok_or_else(|| err(arc.line, format!("timing arc of pin '{pin_name}' has no related_pin")))?;
                // related_pin may list several pins separated by spaces
                for related in related.split_whitespace() {
                    timing.arcs.push(TimingArc {
                        related_pin: related.to_string(),
                        pin: pin_name.clone(),
                        timing_type: arc.attr_str("timing_type").map(str::to_string),
                        timing_sense: arc.attr_str("timing_sense").map(str::to_string),
                        cell_rise: table(arc, "cell_rise")?,
                        cell_fall: table(arc, "cell_fall")?,
                        rise_transition: table(arc, "rise_transition")?,
                        fall_transition: table(arc, "fall_transition")?,
                    });
                }
            }
            for power in pin.children("internal_power") {
                let Some(related) = power.attr_str("related_pin") else {
                    continue;
                };
                for related in related.split_whitespace() {
                    timing.power.push(PowerArc {
                        related_pin: related.to_string(),
                        pin: pin_name.clone(),
                        rise_power: table(power, "rise_power")?,
                        fall_power: table(power, "fall_power")?,
                    });
                }
            }
        }
    }
    timing.pins = pins;
    Ok(timing)
}

fn table(parent: &Group, kind: &str) -> Result<Option<LookupTable>> {
    let Some(group) = parent.children(kind).next() else {
        return Ok(None);
    };
    let numbers = |attr: &Attribute| -> Result<Vec<f64>> {
        attr.values
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|_| err(attr.line, format!("bad number '{s}' in {}", attr.name)))
            })
            .collect()
    };
    let index_1 = group.attr("index_1").map(numbers).transpose()?.unwrap_or_default();
    let index_2 = group.attr("index_2").map(numbers).transpose()?.unwrap_or_default();
    let values_attr = group
        .attr("values")
        .ok_or_else(|| err(group.line, format!("{kind} table has no values")))?;
    let mut values = Vec::with_capacity(values_attr.values.len());
    for row in &values_attr.values {
        let parsed: Vec<f64> = row
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|_| err(values_attr.line, format!("bad number '{s}' in values")))
            })
            .collect::<Result<_>>()?;
        values.push(parsed);
    }

    // a single quoted row of a 2-D table holds all columns of one index_1 entry
    let cols = index_2.len().max(1);
    if values.len() == 1 && index_1.len() > 1 && index_2.is_empty() {
        values = values[0].iter().map(|v| vec![*v]).collect();
    }
    if !index_1.is_empty() && values.len() != index_1.len() {
        return Err(err(
            values_attr.line,
            format!("{kind}: {} rows for {} index_1 entries", values.len(), index_1.len()),
        ));
    }
    if values.iter().any(|r| r.len() != cols) {
        return Err(err(values_attr.line, format!("{kind}: row width differs from index_2")));
    }
    Ok(Some(LookupTable {
        index_1,
        index_2,
        values,
    }))
}

// ── Group parser ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Str(String),
    Punct(char),
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            line: 1,
        }
    }

    fn tokens(mut self) -> Result<Vec<(Tok, usize)>> {
        let mut out = Vec::new();
        while let Some(c) = self.chars.next() {
            match c {
                '\n' => self.line += 1,
                '\\' => {
                    // line continuation
                    if self.chars.peek() == Some(&'\r') {
                        self.chars.next();
                    }
                    if self.chars.peek() == Some(&'\n') {
                        self.chars.next();
                        self.line += 1;
                    }
                }
                c if c.is_whitespace() => {}
                '/' if self.chars.peek() == Some(&'*') => {
                    self.chars.next();
                    let start = self.line;
                    let mut prev = ' ';
                    loop {
                        match self.chars.next() {
                            Some('/') if prev == '*' => break,
                            Some(ch) => {
                                if ch == '\n' {
                                    self.line += 1;
                                }
                                prev = ch;
                            }
                            None => return Err(err(start, "unterminated comment")),
                        }
                    }
                }
                '/' if self.chars.peek() == Some(&'/') => {
                    for ch in self.chars.by_ref() {
                        if ch == '\n' {
                            self.line += 1;
                            break;
                        }
                    }
                }
                '"' => {
                    let start = self.line;
                    let mut s = String::new();
                    loop {
                        match self.chars.next() {
                            Some('"') => break,
                            Some('\\') => {
                                // continuation inside a quoted table row
                                while let Some(&n) = self.chars.peek() {
                                    if n == '\n' {
                                        self.line += 1;
                                    }
                                    if n.is_whitespace() {
                                        self.chars.next();
                                    } else {
                                        break;
                                    }
                                }
                            }
                            Some(ch) => {
                                if ch == '\n' {
                                    self.line += 1;
                                }
                                s.push(ch);
                            }
                            None => return Err(err(start, "unterminated string")),
                        }
                    }
                    out.push((Tok::Str(s), start));
                }
                '(' | ')' | '{' | '}' | ':' | ';' | ',' => out.push((Tok::Punct(c), self.line)),
                c => {
                    let mut w = String::from(c);
                    while let Some(&n) = self.chars.peek() {
                        if n.is_whitespace() || "(){}:;,\"".contains(n) {
                            break;
                        }
                        w.push(n);
                        self.chars.next();
                    }
                    out.push((Tok::Word(w), self.line));
                }
            }
        }
        Ok(out)
    }
}

struct GroupParser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl GroupParser {
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.1)
    }

    fn next(&mut self) -> Result<Tok> {
        let line = self.line();
        let tok = self
            .tokens
            .get(self.pos)
            .map(|t| t.0.clone())
            .ok_or_else(|| err(line, "unexpected end of file"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.0)
    }

    fn expect(&mut self, c: char) -> Result<()> {
        let line = self.line();
        match self.next()? {
            Tok::Punct(p) if p == c => Ok(()),
            other => Err(err(line, format!("expected '{c}', found {other:?}"))),
        }
    }

    fn word(&mut self) -> Result<String> {
        let line = self.line();
        match self.next()? {
            Tok::Word(w) | Tok::Str(w) => Ok(w),
            other => Err(err(line, format!("expected a name, found {other:?}"))),
        }
    }

    /// `( a, b, ... )` with the opening parenthesis already consumed.
    fn arg_list(&mut self) -> Result<Vec<String>> {
        let mut args = Vec::new();
        loop {
            match self.next()? {
                Tok::Punct(')') => return Ok(args),
                Tok::Punct(',') => {}
                Tok::Word(w) | Tok::Str(w) => args.push(w),
                other => return Err(err(self.line(), format!("unexpected {other:?} in argument list"))),
            }
        }
    }

    /// Body of a group with the `{` already consumed.
    fn body(&mut self, group: &mut Group) -> Result<()> {
        loop {
            let line = self.line();
            if self.peek() == Some(&Tok::Punct('}')) {
                self.pos += 1;
                return Ok(());
            }
            let name = self.word()?;
            match self.next()? {
                Tok::Punct(':') => {
                    let mut value = self.word()?;
                    // unquoted expressions such as `function : A & B ;`
                    while !matches!(self.peek(), Some(Tok::Punct(';')) | Some(Tok::Punct('}')) | None) {
                        value.push(' ');
                        value.push_str(&self.word()?);
                    }
                    if self.peek() == Some(&Tok::Punct(';')) {
                        self.pos += 1;
                    }
                    group.attributes.push(Attribute {
                        name,
                        values: vec![value],
                        line,
                    });
                }
                Tok::Punct('(') => {
                    let args = self.arg_list()?;
                    match self.peek() {
                        Some(Tok::Punct('{')) => {
                            self.pos += 1;
                            let mut child = Group {
                                kind: name,
                                args,
                                line,
                                ..Default::default()
                            };
                            self.body(&mut child)?;
                            group.groups.push(child);
                        }
                        _ => {
                            if self.peek() == Some(&Tok::Punct(';')) {
                                self.pos += 1;
                            }
                            group.attributes.push(Attribute {
                                name,
                                values: args,
                                line,
                            });
                        }
                    }
                }
                other => return Err(err(line, format!("unexpected {other:?} after '{name}'"))),
            }
        }
    }
}

/// Parse the top-level `library (name) { ... }` group.
pub fn parse_groups(src: &str) -> Result<Group> {
    let tokens = Lexer::new(src).tokens()?;
    let mut p = GroupParser { tokens, pos: 0 };
    let line = p.line();
    let kind = p.word()?;
    if kind != "library" {
        return Err(err(line, format!("expected 'library', found '{kind}'")));
    }
    p.expect('(')?;
    let args = p.arg_list()?;
    p.expect('{')?;
    let mut library = Group {
        kind,
        args,
        line,
        ..Default::default()
    };
    p.body(&mut library)?;
    Ok(library)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) const LIB: &str = r#"
/* toy library */
library (toy) {
  time_unit : "1ns" ;
  lu_table_template (delay_2x2) {
    variable_1 : input_net_transition ;
    variable_2 : total_output_net_capacitance ;
  }
  cell (INV) {
    area : 1.5 ;
    cell_leakage_power : 0.01 ;
    pin (A) {
      direction : input ;
      capacitance : 0.002 ;
    }
    pin (Y) {
      direction : output ;
      function : "!A" ;
      max_capacitance : 0.1 ;
      timing () {
        related_pin : "A" ;
        timing_sense : negative_unate ;
        cell_rise (delay_2x2) {
          index_1 ("0.0, 1.0") ;
          index_2 ("0.0, 2.0") ;
          values ("1.0, 3.0", \
                  "2.0, 4.0") ;
        }
        cell_fall (scalar) {
          values ("0.5") ;
        }
      }
      internal_power () {
        related_pin : "A" ;
        rise_power (scalar) { values ("0.3") ; }
      }
    }
  }
  cell (NAND2) {
    area : 2 ;
    pin (A, B) { direction : input ; }
    pin (Y) {
      direction : output ;
      function : A & B ;
      timing () { related_pin : "A B" ; }
    }
  }
}
"#;

    #[test]
    fn test_read_liberty_cells() {
        let cells = read_liberty(LIB).unwrap();
        assert_eq!(cells.len(), 2);
        let inv = &cells[0];
        assert_eq!(inv.name, "INV");
        assert_relative_eq!(inv.area, 1.5);
        assert_eq!(inv.pins["A"].direction, PinDirection::Input);
        assert_relative_eq!(inv.pins["A"].capacitance, 0.002);
        assert_eq!(inv.pins["Y"].function.as_deref(), Some("!A"));
        let arc = inv.arc("A", "Y").unwrap();
        assert_eq!(arc.timing_sense.as_deref(), Some("negative_unate"));
        assert_relative_eq!(arc.cell_rise.as_ref().unwrap().lookup(0.5, 1.0).unwrap(), 2.5);
        assert_relative_eq!(arc.cell_fall.as_ref().unwrap().lookup(0.0, 0.0).unwrap(), 0.5);
        assert!(inv.power_arc("A", "Y").unwrap().rise_power.is_some());

        let nand = &cells[1];
        assert_eq!(nand.pins.len(), 3);
        assert_eq!(nand.arcs.len(), 2);
        assert_eq!(nand.pins["Y"].function.as_deref(), Some("A & B"));
    }

    #[test]
    fn test_bad_number_reports_line() {
        let src = "library (x) {\n cell (C) {\n  area : abc ;\n }\n}\n";
        match read_liberty(src) {
            Err(PnrError::TimingParse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        let src = "library (x) {\n cell (C) {\n  area : 1 ;\n";
        assert!(matches!(read_liberty(src), Err(PnrError::TimingParse { .. })));
    }

    #[test]
    fn test_table_shape_mismatch_rejected() {
        let src = r#"library (x) { cell (C) { pin (Y) { direction : output ;
            timing () { related_pin : "A" ;
              cell_rise (t) { index_1 ("0, 1") ; index_2 ("0, 1") ; values ("1, 2") ; } } } } }"#;
        assert!(read_liberty(src).is_err());
    }
}
