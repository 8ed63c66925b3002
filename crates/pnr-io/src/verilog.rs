//! Structural (gate-level) Verilog reader and writer.
//!
//! Supports the subset synthesis tools emit: ANSI and non-ANSI module
//! headers, scalar and vector port/wire declarations, cell instances with
//! named connections, and `assign` aliasing. Behavioural constructs are
//! rejected with a line-numbered parse error. The writer emits the same
//! subset with every bus flattened to escaped bit names.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use pnr_core::netlist::{Connection, InstanceDecl, Module, PortDecl, PortDirection};
use pnr_core::{DesignDatabase, NetId, PnrError, Result, Terminal};

/// Parse every module in `src`, in source order.
pub fn read_verilog(src: &str) -> Result<Vec<Module>> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut modules = Vec::new();
    while parser.peek().is_some() {
        match parser.next()? {
            Tok::Ident(kw) if kw == "module" || kw == "macromodule" => {
                modules.push(parser.module()?);
            }
            other => {
                return Err(parse_err(
                    parser.prev_line(),
                    format!("expected 'module', found {}", other.describe()),
                ))
            }
        }
    }
    log::debug!("Parsed {} Verilog modules", modules.len());
    Ok(modules)
}

/// Choose the top module: the named one, or else the last module that no
/// other module instantiates.
pub fn select_top(modules: Vec<Module>, top: Option<&str>) -> Result<Module> {
    if let Some(name) = top {
        return modules
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| parse_err(0, format!("top module '{name}' not found")));
    }
    let used: std::collections::HashSet<&str> = modules
        .iter()
        .flat_map(|m| m.instances.iter().map(|i| i.cell.as_str()))
        .collect();
    let idx = modules
        .iter()
        .rposition(|m| !used.contains(m.name.as_str()))
        .or_else(|| modules.len().checked_sub(1))
        .ok_or_else(|| parse_err(0, "no module found"))?;
    let mut modules = modules;
    Ok(modules.swap_remove(idx))
}

pub fn write_verilog_file(db: &DesignDatabase, path: &Path) -> Result<()> {
    fs::write(path, write_verilog(db))?;
    log::info!("Wrote Verilog netlist of '{}' to {}", db.name, path.display());
    Ok(())
}

/// The design as one structural module: its ports, a wire per internal
/// net and every instance, filler cells included, with named connections.
/// A net reaching ports takes the name of its first port; further ports
/// on it are joined by `assign`.
pub fn write_verilog(db: &DesignDatabase) -> String {
    let mut names: HashMap<NetId, String> = HashMap::new();
    let mut wires = Vec::new();
    let mut assigns = Vec::new();
    for net in db.nets() {
        let mut ports = net.terminals.iter().filter_map(|t| match t {
            Terminal::Port(p) => db.ports().get(p.index()),
            Terminal::Pin { .. } => None,
        });
        let name = match ports.next() {
            Some(first) => {
                assigns.extend(ports.map(|p| (p.name.clone(), first.name.clone())));
                first.name.clone()
            }
            None => {
                wires.push(net.name.clone());
                net.name.clone()
            }
        };
        names.insert(net.id, name);
    }

    let mut out = String::new();
    let header: Vec<String> = db.ports().iter().map(|p| ident(&p.name)).collect();
    let _ = writeln!(out, "module {} ({});", ident(&db.name), header.join(", "));
    for port in db.ports() {
        let dir = match port.direction {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
            PortDirection::InOut => "inout",
        };
        let _ = writeln!(out, "  {dir} {};", ident(&port.name));
    }
    for wire in &wires {
        let _ = writeln!(out, "  wire {};", ident(wire));
    }
    for (lhs, rhs) in &assigns {
        let _ = writeln!(out, "  assign {} = {};", ident(lhs), ident(rhs));
    }
    if !db.instances().is_empty() {
        out.push('\n');
    }
    for inst in db.instances() {
        let pins = inst.master.geometry.iter().flat_map(|g| g.pins.iter());
        let connections: Vec<String> = pins
            .map(|pin| {
                let pin = pin.name.as_str();
                let net = db
                    .net_of_pin(inst.id, pin)
                    .and_then(|n| names.get(&n))
                    .map_or_else(String::new, |n| ident(n));
                format!(".{}({net})", ident(pin))
            })
            .collect();
        let _ = writeln!(
            out,
            "  {} {} ({});",
            ident(&inst.master.name),
            ident(&inst.name),
            connections.join(", ")
        );
    }
    let _ = writeln!(out, "endmodule");
    out
}

/// `name` as written in Verilog: plain when it is a simple identifier,
/// escaped otherwise.
fn ident(name: &str) -> String {
    const KEYWORDS: &[&str] = &[
        "module", "endmodule", "input", "output", "inout", "wire", "reg", "tri", "logic", "assign",
        "supply0", "supply1", "wand", "wor", "parameter", "localparam", "always", "initial",
    ];
    let simple = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if simple && !KEYWORDS.contains(&name) {
        name.to_string()
    } else {
        format!("\\{name} ")
    }
}

fn parse_err(line: usize, message: impl Into<String>) -> PnrError {
    PnrError::Parse {
        line,
        message: message.into(),
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(i64),
    /// Sized or based literal such as `1'b0`.
    Const(String),
    Str(String),
    Punct(char),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("'{s}'"),
            Tok::Number(n) => format!("'{n}'"),
            Tok::Const(s) => format!("constant '{s}'"),
            Tok::Str(s) => format!("string \"{s}\""),
            Tok::Punct(c) => format!("'{c}'"),
        }
    }
}

fn lex(src: &str) -> Result<Vec<(Tok, usize)>> {
    let mut out = Vec::new();
    let mut chars = src.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '/' if chars.peek() == Some(&'/') => {
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut prev = ' ';
                loop {
                    match chars.next() {
                        Some('/') if prev == '*' => break,
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            prev = ch;
                        }
                        None => return Err(parse_err(start, "unterminated comment")),
                    }
                }
            }
            '`' => {
                // compiler directives are line-scoped and ignored
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '(' if chars.peek() == Some(&'*') => {
                // attribute instance `(* ... *)`
                chars.next();
                let start = line;
                let mut prev = ' ';
                loop {
                    match chars.next() {
                        Some(')') if prev == '*' => break,
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            prev = ch;
                        }
                        None => return Err(parse_err(start, "unterminated attribute")),
                    }
                }
            }
            '"' => {
                let start = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\n') | None => return Err(parse_err(start, "unterminated string")),
                        Some(ch) => s.push(ch),
                    }
                }
                out.push((Tok::Str(s), start));
            }
            '\\' => {
                // escaped identifier runs to the next whitespace
                let mut s = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_whitespace() {
                        break;
                    }
                    s.push(n);
                    chars.next();
                }
                if s.is_empty() {
                    return Err(parse_err(line, "empty escaped identifier"));
                }
                out.push((Tok::Ident(s), line));
            }
            c if c.is_ascii_digit() || c == '\'' => {
                let mut s = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' || n == '\'' || n == '?' {
                        s.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if s.contains('\'') {
                    out.push((Tok::Const(s), line));
                } else {
                    let n = s
                        .replace('_', "")
                        .parse::<i64>()
                        .map_err(|_| parse_err(line, format!("bad number '{s}'")))?;
                    out.push((Tok::Number(n), line));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut s = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' || n == '$' {
                        s.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push((Tok::Ident(s), line));
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';' | '.' | ':' | '=' | '#' | '-' | '+' => {
                out.push((Tok::Punct(c), line))
            }
            other => return Err(parse_err(line, format!("unexpected character '{other}'"))),
        }
    }
    Ok(out)
}

// ── Parser ────────────────────────────────────────────────────────────

/// `[msb:lsb]` of a vector declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    msb: i64,
    lsb: i64,
}

impl Range {
    /// Bit indices in declaration order, msb first.
    fn indices(&self) -> Vec<i64> {
        if self.msb >= self.lsb {
            (self.lsb..=self.msb).rev().collect()
        } else {
            (self.msb..=self.lsb).collect()
        }
    }
}

fn expand(name: &str, range: Option<Range>) -> Vec<String> {
    match range {
        None => vec![name.to_string()],
        Some(r) => r.indices().into_iter().map(|i| format!("{name}[{i}]")).collect(),
    }
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

#[derive(Default)]
struct ModuleState {
    header: Vec<String>,
    directions: HashMap<String, (PortDirection, Option<Range>)>,
    ansi: Vec<(String, PortDirection, Option<Range>)>,
    vectors: HashMap<String, Range>,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.0)
    }

    fn peek_is(&self, c: char) -> bool {
        self.peek() == Some(&Tok::Punct(c))
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.1)
    }

    fn prev_line(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map_or(1, |t| t.1)
    }

    fn next(&mut self) -> Result<Tok> {
        let line = self.line();
        let tok = self
            .tokens
            .get(self.pos)
            .map(|t| t.0.clone())
            .ok_or_else(|| parse_err(line, "unexpected end of file"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, c: char) -> Result<()> {
        let line = self.line();
        match self.next()? {
            Tok::Punct(p) if p == c => Ok(()),
            other => Err(parse_err(line, format!("expected '{c}', found {}", other.describe()))),
        }
    }

    fn ident(&mut self) -> Result<String> {
        let line = self.line();
        match self.next()? {
            Tok::Ident(s) => Ok(s),
            other => Err(parse_err(line, format!("expected identifier, found {}", other.describe()))),
        }
    }

    fn number(&mut self) -> Result<i64> {
        let line = self.line();
        let negative = self.peek_is('-');
        if negative {
            self.pos += 1;
        }
        match self.next()? {
            Tok::Number(n) => Ok(if negative { -n } else { n }),
            other => Err(parse_err(line, format!("expected number, found {}", other.describe()))),
        }
    }

    /// Skip a balanced `( ... )` with the opening parenthesis next.
    fn skip_parens(&mut self) -> Result<()> {
        self.expect('(')?;
        let mut depth = 1;
        while depth > 0 {
            match self.next()? {
                Tok::Punct('(') => depth += 1,
                Tok::Punct(')') => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn skip_statement(&mut self) -> Result<()> {
        while self.next()? != Tok::Punct(';') {}
        Ok(())
    }

    fn range(&mut self) -> Result<Option<Range>> {
        if !self.peek_is('[') {
            return Ok(None);
        }
        self.pos += 1;
        let msb = self.number()?;
        self.expect(':')?;
        let lsb = self.number()?;
        self.expect(']')?;
        Ok(Some(Range { msb, lsb }))
    }

    /// Net-type and signedness keywords allowed between a direction and a name.
    fn skip_net_qualifiers(&mut self) {
        while let Some(Tok::Ident(kw)) = self.peek() {
            if matches!(kw.as_str(), "wire" | "reg" | "logic" | "signed" | "unsigned" | "tri") {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn direction(kw: &str) -> Option<PortDirection> {
        match kw {
            "input" => Some(PortDirection::Input),
            "output" => Some(PortDirection::Output),
            "inout" => Some(PortDirection::InOut),
            _ => None,
        }
    }

    fn module(&mut self) -> Result<Module> {
        let mut module = Module {
            name: self.ident()?,
            ..Default::default()
        };
        let mut state = ModuleState::default();

        if self.peek_is('#') {
            self.pos += 1;
            self.skip_parens()?;
        }
        if self.peek_is('(') {
            self.port_list(&mut state)?;
        }
        self.expect(';')?;

        loop {
            let line = self.line();
            let word = self.ident()?;
            match word.as_str() {
                "endmodule" => break,
                kw if Self::direction(kw).is_some() => {
                    let dir = Self::direction(kw).unwrap_or(PortDirection::Input);
                    self.skip_net_qualifiers();
                    let range = self.range()?;
                    loop {
                        let name = self.ident()?;
                        if let Some(r) = range {
                            state.vectors.insert(name.clone(), r);
                        }
                        state.directions.insert(name, (dir, range));
                        if self.peek_is(',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    self.expect(';')?;
                }
                "wire" | "reg" | "tri" | "logic" | "supply0" | "supply1" | "wand" | "wor" => {
                    self.skip_net_qualifiers();
                    let range = self.range()?;
                    loop {
                        let name = self.ident()?;
                        if let Some(r) = range {
                            state.vectors.insert(name.clone(), r);
                        }
                        module.wires.extend(expand(&name, range));
                        if self.peek_is('=') {
                            return Err(parse_err(line, "net declaration assignments are not supported"));
                        }
                        if self.peek_is(',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    self.expect(';')?;
                }
                "assign" => loop {
                    let lhs = self.net_ref(&state)?;
                    self.expect('=')?;
                    let rhs = self.net_ref(&state)?;
                    match (lhs, rhs) {
                        (Some(l), Some(r)) if l.len() == r.len() => {
                            module.assigns.extend(l.into_iter().zip(r));
                        }
                        (Some(l), Some(r)) => {
                            return Err(parse_err(
                                line,
                                format!("assign width mismatch: {} vs {} bits", l.len(), r.len()),
                            ))
                        }
                        _ => log::warn!("line {line}: constant assign ignored"),
                    }
                    if self.peek_is(',') {
                        self.pos += 1;
                    } else {
                        self.expect(';')?;
                        break;
                    }
                },
                "parameter" | "localparam" | "defparam" | "timeunit" | "timeprecision" => {
                    self.skip_statement()?;
                }
                "always" | "initial" | "function" | "task" | "generate" | "specify" => {
                    return Err(parse_err(line, format!("behavioural construct '{word}' is not supported")));
                }
                _ => self.instances(&word, line, &state, &mut module)?,
            }
        }

        module.ports = self.resolve_ports(&module.name, state)?;
        Ok(module)
    }

    fn port_list(&mut self, state: &mut ModuleState) -> Result<()> {
        self.expect('(')?;
        if self.peek_is(')') {
            self.pos += 1;
            return Ok(());
        }
        let mut current: Option<(PortDirection, Option<Range>)> = None;
        loop {
            let line = self.line();
            let word = self.ident()?;
            if let Some(dir) = Self::direction(&word) {
                self.skip_net_qualifiers();
                let range = self.range()?;
                current = Some((dir, range));
                let name = self.ident()?;
                if let Some(r) = range {
                    state.vectors.insert(name.clone(), r);
                }
                state.ansi.push((name, dir, range));
            } else if let Some((dir, range)) = current {
                if let Some(r) = range {
                    state.vectors.insert(word.clone(), r);
                }
                state.ansi.push((word, dir, range));
            } else {
                if self.peek_is('[') {
                    return Err(parse_err(line, "bit-selects in a port list are not supported"));
                }
                state.header.push(word);
            }
            match self.next()? {
                Tok::Punct(',') => {}
                Tok::Punct(')') => return Ok(()),
                other => {
                    return Err(parse_err(
                        self.prev_line(),
                        format!("expected ',' or ')' in port list, found {}", other.describe()),
                    ))
                }
            }
        }
    }

    fn resolve_ports(&self, module: &str, state: ModuleState) -> Result<Vec<PortDecl>> {
        let mut ports = Vec::new();
        for (name, direction, range) in state.ansi {
            ports.extend(
                expand(&name, range)
                    .into_iter()
                    .map(|name| PortDecl { name, direction }),
            );
        }
        for name in state.header {
            let (direction, range) = state.directions.get(&name).copied().ok_or_else(|| {
                parse_err(0, format!("port '{name}' of module '{module}' has no direction"))
            })?;
            ports.extend(
                expand(&name, range)
                    .into_iter()
                    .map(|name| PortDecl { name, direction }),
            );
        }
        Ok(ports)
    }

    /// A net reference in an assign or connection: identifier with an
    /// optional bit- or part-select, or a constant (`None`).
    fn net_ref(&mut self, state: &ModuleState) -> Result<Option<Vec<String>>> {
        let line = self.line();
        match self.next()? {
            Tok::Const(c) => {
                log::warn!("line {line}: constant '{c}' ignored");
                Ok(None)
            }
            Tok::Number(n) => {
                log::warn!("line {line}: constant '{n}' ignored");
                Ok(None)
            }
            Tok::Punct('{') => Err(parse_err(line, "concatenations are not supported")),
            Tok::Ident(name) => {
                if self.peek_is('[') {
                    self.pos += 1;
                    let hi = self.number()?;
                    let bits = if self.peek_is(':') {
                        self.pos += 1;
                        let lo = self.number()?;
                        expand(&name, Some(Range { msb: hi, lsb: lo }))
                    } else {
                        vec![format!("{name}[{hi}]")]
                    };
                    self.expect(']')?;
                    Ok(Some(bits))
                } else {
                    Ok(Some(expand(&name, state.vectors.get(&name).copied())))
                }
            }
            other => Err(parse_err(line, format!("expected a net, found {}", other.describe()))),
        }
    }

    fn instances(
        &mut self,
        cell: &str,
        line: usize,
        state: &ModuleState,
        module: &mut Module,
    ) -> Result<()> {
        if self.peek_is('#') {
            self.pos += 1;
            self.skip_parens()?;
        }
        loop {
            let inst_line = self.line();
            let name = self.ident()?;
            if self.peek_is('[') {
                return Err(parse_err(inst_line, "instance arrays are not supported"));
            }
            self.expect('(')?;
            let mut connections = Vec::new();
            if !self.peek_is(')') {
                loop {
                    if !self.peek_is('.') {
                        return Err(parse_err(
                            self.line(),
                            format!("instance '{name}': positional connections are not supported"),
                        ));
                    }
                    self.pos += 1;
                    let pin = self.ident()?;
                    self.expect('(')?;
                    let net = if self.peek_is(')') {
                        None
                    } else {
                        let conn_line = self.line();
                        match self.net_ref(state)? {
                            None => None,
                            Some(mut bits) if bits.len() == 1 => bits.pop(),
                            Some(bits) => {
                                return Err(parse_err(
                                    conn_line,
                                    format!(
                                        "instance '{name}' pin '{pin}': {}-bit connection to a scalar pin",
                                        bits.len()
                                    ),
                                ))
                            }
                        }
                    };
                    self.expect(')')?;
                    connections.push(Connection { pin, net });
                    if self.peek_is(',') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
            self.expect(')')?;
            module.instances.push(InstanceDecl {
                name,
                cell: cell.to_string(),
                connections,
                line,
            });
            if self.peek_is(',') {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.expect(';')
    }
}
