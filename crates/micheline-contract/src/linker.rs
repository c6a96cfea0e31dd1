//! Storage type/value linking
//!
//! Runtime storage is an untyped tree of pairs, sequences and literals while
//! the storage type carries the field names. Linking walks the type tree in
//! lockstep with a flattened queue of values and labels every value it
//! consumes, which is how big-map ids are discovered.
//!
//! The value queue is a slice with an explicit cursor. Each step takes the
//! cursor and returns the advanced one, so running out of values while type
//! nodes remain is reported as [`ContractError::Shape`], as are values left in
//! a queue once its type has been walked.

use crate::error::{ContractError, Result};
use micheline_core::address::is_address_bytes;
use micheline_core::{is_ascii_bytes, Address, OpCode, Prim, Type, Visit};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Base name for unlabeled big maps
pub const BIGMAP_BASE_NAME: &str = "bigmap";

/// A storage value labeled with the name recovered from its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageItem {
    pub name: String,
    /// Primitive of the type node the value was linked against
    pub typ: OpCode,
    pub value: Prim,
}

impl StorageItem {
    pub fn is_bigmap(&self) -> bool {
        self.typ == OpCode::big_map
    }
}

/// Unique name allocation shared across one linking run
#[derive(Debug, Default)]
pub(crate) struct Names {
    used: HashSet<String>,
}

impl Names {
    /// Keep `name` when it is free, otherwise append the smallest free `_n`.
    /// Missing names always receive a suffix on `default`.
    pub(crate) fn unique(&mut self, name: Option<&str>, default: &str) -> String {
        let name = match name.filter(|n| !n.is_empty()) {
            Some(n) if !self.used.contains(n) => n.to_string(),
            other => {
                let base = other.unwrap_or(default);
                let mut n = 0usize;
                loop {
                    let candidate = format!("{}_{}", base, n);
                    if !self.used.contains(&candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        self.used.insert(name.clone());
        name
    }
}

/// Where a node's name comes from
#[derive(Debug, Clone, Copy)]
enum Hint<'a> {
    /// The node's own annotation
    Own,
    /// The node's own annotation, else an inherited one
    Fallback(&'a str),
    /// A name derived from a map key, overriding annotations
    Forced(&'a str),
}

impl<'a> Hint<'a> {
    fn pick(self, typ: &'a Prim) -> Option<&'a str> {
        match self {
            Hint::Own => typ.label(),
            Hint::Fallback(n) => typ.label().or(Some(n)),
            Hint::Forced(n) => Some(n),
        }
    }

    /// Hint passed to the payload of an `option`, `or` or `list`
    fn inherit(self, typ: &'a Prim) -> Hint<'a> {
        match self {
            Hint::Forced(_) => self,
            _ => match self.pick(typ) {
                Some(n) => Hint::Fallback(n),
                None => Hint::Own,
            },
        }
    }
}

struct Linker {
    names: Names,
    items: Vec<StorageItem>,
}

impl Linker {
    fn new() -> Self {
        Self {
            names: Names::default(),
            items: Vec::new(),
        }
    }

    fn record(&mut self, typ: &Prim, hint: Hint<'_>, value: &Prim) {
        let op = typ.op().unwrap_or(OpCode::unit);
        let default = if op == OpCode::big_map {
            BIGMAP_BASE_NAME
        } else {
            op.name()
        };
        let name = self.names.unique(hint.pick(typ), default);
        trace!(%name, typ = %op, "linked storage value");
        self.items.push(StorageItem {
            name,
            typ: op,
            value: value.clone(),
        });
    }

    /// Link `typ` against the whole of `queue`
    fn link_exact(&mut self, typ: &Prim, queue: &[&Prim], hint: Hint<'_>) -> Result<()> {
        let end = self.link(typ, queue, 0, hint)?;
        if end != queue.len() {
            debug!(consumed = end, total = queue.len(), "storage queue out of step");
            return Err(ContractError::shape(format!(
                "{} values left over after {}",
                queue.len() - end,
                typ.dump_limit(64)
            )));
        }
        Ok(())
    }

    /// Link `typ` against `queue[pos..]`, returning the cursor after the consumed values
    fn link(&mut self, typ: &Prim, queue: &[&Prim], pos: usize, hint: Hint<'_>) -> Result<usize> {
        let op = match typ.op() {
            Some(op) => op,
            None => return Err(ContractError::shape(format!("{} is not a type", typ.dump_limit(64)))),
        };
        if op == OpCode::storage {
            let inner = typ
                .arg(0)
                .ok_or_else(|| ContractError::shape("storage section without a type"))?;
            return self.link(inner, queue, pos, hint);
        }
        if op == OpCode::pair {
            let mut pos = pos;
            for arg in typ.args() {
                pos = self.link(arg, queue, pos, hint)?;
            }
            return Ok(pos);
        }

        let value = *queue.get(pos).ok_or_else(|| {
            ContractError::shape(format!(
                "value queue exhausted at {} after {} values",
                op, pos
            ))
        })?;

        match op {
            OpCode::big_map => {
                if value.as_int().is_none() {
                    return Err(ContractError::shape(format!(
                        "big_map value {} is not an id",
                        value.dump_limit(64)
                    )));
                }
                self.record(typ, hint, value);
            }
            OpCode::map => {
                let value_type = type_arg(typ, 1)?;
                let entries = seq_items(value, op)?;
                for (i, elt) in entries.iter().enumerate() {
                    if !elt.is_op(OpCode::Elt) || elt.args().len() != 2 {
                        return Err(ContractError::shape(format!(
                            "map entry {} is not an Elt",
                            elt.dump_limit(64)
                        )));
                    }
                    let name = match key_name(&elt.args()[0]) {
                        Some(name) => name,
                        None => format!("{}_{}", typ.label().unwrap_or(op.name()), i),
                    };
                    let nested = elt.args()[1].flatten_pairs();
                    self.link_exact(value_type, &nested, Hint::Forced(&name))?;
                }
            }
            OpCode::option => {
                if value.is_op(OpCode::Some) {
                    let inner = value
                        .arg(0)
                        .ok_or_else(|| ContractError::shape("Some without a payload"))?;
                    let nested = inner.flatten_pairs();
                    self.link_exact(type_arg(typ, 0)?, &nested, hint.inherit(typ))?;
                } else if value.is_op(OpCode::None) {
                    self.record(typ, hint, value);
                } else {
                    return Err(ContractError::shape(format!(
                        "option value {} is neither Some nor None",
                        value.dump_limit(64)
                    )));
                }
            }
            OpCode::list => {
                let item_type = type_arg(typ, 0)?;
                for item in seq_items(value, op)? {
                    let nested = item.flatten_pairs();
                    self.link_exact(item_type, &nested, hint.inherit(typ))?;
                }
            }
            OpCode::or => {
                let side = match value.op() {
                    Some(OpCode::Left) => 0,
                    Some(OpCode::Right) => 1,
                    _ => {
                        return Err(ContractError::shape(format!(
                            "or value {} is neither Left nor Right",
                            value.dump_limit(64)
                        )))
                    }
                };
                let inner = value
                    .arg(0)
                    .ok_or_else(|| ContractError::shape("or branch without a payload"))?;
                let nested = inner.flatten_pairs();
                self.link_exact(type_arg(typ, side)?, &nested, hint.inherit(typ))?;
            }
            _ => self.record(typ, hint, value),
        }
        Ok(pos + 1)
    }
}

fn type_arg(typ: &Prim, i: usize) -> Result<&Prim> {
    typ.arg(i).ok_or_else(|| {
        ContractError::shape(format!("type {} is missing argument {}", typ.dump_limit(64), i))
    })
}

fn seq_items(value: &Prim, op: OpCode) -> Result<&[Prim]> {
    if value.is_seq() {
        Ok(value.args())
    } else {
        Err(ContractError::shape(format!(
            "{} value {} is not a sequence",
            op,
            value.dump_limit(64)
        )))
    }
}

/// Display name for a map key: string, ASCII bytes or address bytes
fn key_name(key: &Prim) -> Option<String> {
    if let Some(s) = key.as_str() {
        return Some(s.to_string()).filter(|s| !s.is_empty());
    }
    let b = key.as_bytes()?;
    if is_ascii_bytes(b) {
        return Some(String::from_utf8_lossy(b).into_owned());
    }
    if is_address_bytes(b) {
        return Address::from_bytes(b).ok().map(|a| a.to_string());
    }
    None
}

/// Link a storage type with its value, returning every labeled value in walk order
pub fn link_storage(typ: &Prim, value: &Prim) -> Result<Vec<StorageItem>> {
    let queue = value.flatten_pairs();
    let mut linker = Linker::new();
    linker.link_exact(typ, &queue, Hint::Own)?;
    Ok(linker.items)
}

/// Named big-map ids in a storage value
///
/// A big map hidden behind a `None` or the untaken branch of an `or` has no
/// id in the value and is not reported.
pub fn detect_bigmaps(typ: &Prim, value: &Prim) -> Result<BTreeMap<String, i64>> {
    let mut out = BTreeMap::new();
    for item in link_storage(typ, value)? {
        if !item.is_bigmap() {
            continue;
        }
        let id = item
            .value
            .as_int()
            .and_then(|n| i64::try_from(n).ok())
            .ok_or_else(|| ContractError::shape(format!("big_map id {} out of range", item.value)))?;
        debug!(name = %item.name, id, "found big_map");
        out.insert(item.name, id);
    }
    Ok(out)
}

/// Named big-map types declared in a storage type
///
/// Big maps nested directly under a `map` value or a `list` item are found
/// too, named after the inner annotation or else the container's.
pub fn detect_bigmap_types(typ: &Prim) -> BTreeMap<String, Type> {
    let mut names = Names::default();
    let mut out = BTreeMap::new();
    typ.walk(&mut |p| {
        let found = match p.op() {
            Some(OpCode::big_map) => Some((p, p.label())),
            Some(OpCode::map) => p
                .arg(1)
                .filter(|v| v.is_op(OpCode::big_map))
                .map(|v| (v, v.label().or_else(|| p.label()))),
            Some(OpCode::list) => p
                .arg(0)
                .filter(|v| v.is_op(OpCode::big_map))
                .map(|v| (v, v.label().or_else(|| p.label()))),
            Some(OpCode::lambda) => return Visit::Skip,
            _ => return Visit::Continue,
        };
        if let Some((bigmap, label)) = found {
            let name = names.unique(label, BIGMAP_BASE_NAME);
            out.insert(name, Type(bigmap.clone()));
        }
        Visit::Skip
    });
    out
}
