//! Gate-level netlist: the parsed module form and its elaboration against a
//! cell library into instances and nets.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cell::CellMaster;
use crate::error::{PnrError, Result};
use crate::ids::{InstanceId, PortId};
use crate::library::CellLibrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
    InOut,
}

/// A scalar port of a module (buses are expanded to `name[i]` bits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDecl {
    pub name: String,
    pub direction: PortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub pin: String,
    /// `None` for an empty or constant connection.
    pub net: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDecl {
    pub name: String,
    pub cell: String,
    pub connections: Vec<Connection>,
    pub line: usize,
}

/// One parsed module, before library resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub ports: Vec<PortDecl>,
    pub wires: Vec<String>,
    pub instances: Vec<InstanceDecl>,
    /// `assign lhs = rhs;` pairs; both sides become one net.
    pub assigns: Vec<(String, String)>,
}

// ── Elaborated form ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Terminal {
    Pin { instance: InstanceId, pin: String },
    Port(PortId),
}

#[derive(Debug, Clone)]
pub struct NetlistInstance {
    pub name: String,
    pub master: Arc<CellMaster>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetlistPort {
    pub name: String,
    pub direction: PortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetlistNet {
    pub name: String,
    pub terminals: Vec<Terminal>,
}

/// Result of elaboration. Instances, ports and nets are in declaration order;
/// their positions become the database ids.
#[derive(Debug, Clone, Default)]
pub struct NetlistGraph {
    pub name: String,
    pub instances: Vec<NetlistInstance>,
    pub ports: Vec<NetlistPort>,
    pub nets: Vec<NetlistNet>,
    pub warnings: Vec<String>,
}

impl NetlistGraph {
    /// Resolve `module` against `library`. Any unresolved cell, unknown
    /// pin, doubly connected pin or single-terminal net rejects the whole
    /// elaboration.
    pub fn elaborate(module: &Module, library: &CellLibrary) -> Result<Self> {
        let mut graph = NetlistGraph {
            name: module.name.clone(),
            ..Default::default()
        };

        let mut aliases = Aliases::default();
        for port in &module.ports {
            aliases.intern(&port.name);
        }
        for wire in &module.wires {
            aliases.intern(wire);
        }
        for (lhs, rhs) in &module.assigns {
            aliases.union(lhs, rhs);
        }

        let mut terminals: IndexMap<String, Vec<Terminal>> = IndexMap::new();

        // Seed every declared net so its position follows declaration order.
        for name in module.ports.iter().map(|p| &p.name).chain(&module.wires) {
            touch(&mut aliases, name, &mut terminals);
        }

        for (idx, port) in module.ports.iter().enumerate() {
            let id = PortId::from_index(idx);
            graph.ports.push(NetlistPort {
                name: port.name.clone(),
                direction: port.direction,
            });
            touch(&mut aliases, &port.name, &mut terminals).push(Terminal::Port(id));
        }

        for (idx, decl) in module.instances.iter().enumerate() {
            let master = library
                .placeable(&decl.cell)
                .ok_or_else(|| PnrError::UnresolvedCellReference {
                    instance: decl.name.clone(),
                    cell: decl.cell.clone(),
                })?;
            let id = InstanceId::from_index(idx);
            let mut bound: HashMap<&str, &str> = HashMap::new();

            for conn in &decl.connections {
                let Some(pin) = master.pin(&conn.pin) else {
                    return Err(PnrError::UnknownPin {
                        instance: decl.name.clone(),
                        pin: conn.pin.clone(),
                    });
                };
                let Some(net) = conn.net.as_deref() else {
                    continue;
                };
                if let Some(first) = bound.insert(&conn.pin, net) {
                    return Err(PnrError::PinConflict {
                        instance: decl.name.clone(),
                        pin: conn.pin.clone(),
                        first: first.to_string(),
                        second: net.to_string(),
                    });
                }
                if pin.pin_use.is_supply() {
                    graph.warn(format!(
                        "supply pin {}/{} connection to '{net}' ignored",
                        decl.name, conn.pin
                    ));
                    continue;
                }
                touch(&mut aliases, net, &mut terminals).push(Terminal::Pin {
                    instance: id,
                    pin: conn.pin.clone(),
                });
            }

            graph.instances.push(NetlistInstance {
                name: decl.name.clone(),
                master: Arc::clone(master),
            });
        }

        for (name, terms) in terminals {
            match terms.len() {
                0 => graph.warn(format!("net '{name}' has no connections, ignored")),
                1 => {
                    return Err(PnrError::DanglingPin {
                        net: name,
                        terminals: 1,
                    })
                }
                _ => graph.nets.push(NetlistNet {
                    name,
                    terminals: terms,
                }),
            }
        }

        log::info!(
            "Elaborated '{}': {} instances, {} ports, {} nets",
            graph.name,
            graph.instances.len(),
            graph.ports.len(),
            graph.nets.len()
        );
        Ok(graph)
    }

    fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn instance_by_name(&self, name: &str) -> Option<InstanceId> {
        self.instances
            .iter()
            .position(|i| i.name == name)
            .map(InstanceId::from_index)
    }
}

fn touch<'a>(
    aliases: &mut Aliases,
    net: &str,
    terminals: &'a mut IndexMap<String, Vec<Terminal>>,
) -> &'a mut Vec<Terminal> {
    let root = aliases.root_name(net);
    terminals.entry(root).or_default()
}

/// Union-find over net names. The representative of a set is the name that
/// was seen first, so merged nets keep a stable, predictable name.
#[derive(Debug, Default)]
struct Aliases {
    index: HashMap<String, usize>,
    names: Vec<String>,
    parent: Vec<usize>,
}

impl Aliases {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.names.len();
        self.index.insert(name.to_string(), i);
        self.names.push(name.to_string());
        self.parent.push(i);
        i
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.intern(a);
        let rb = self.intern(b);
        let (ra, rb) = (self.find(ra), self.find(rb));
        if ra != rb {
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }

    fn root_name(&mut self, name: &str) -> String {
        let i = self.intern(name);
        let r = self.find(i);
        self.names[r].clone()
    }
}
