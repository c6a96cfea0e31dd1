//! Type-level view over a Micheline tree
//!
//! [`Type`] wraps a [`Prim`] known to be a type expression and adds queries
//! that only make sense for types: entrypoint discovery on parameter types,
//! comb field flattening and key/value projection of container types.

use crate::error::Result;
use crate::opcode::OpCode;
use crate::prim::Prim;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A Micheline type expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Type(pub Prim);

impl From<Prim> for Type {
    fn from(p: Prim) -> Self {
        Type(p)
    }
}

impl Type {
    pub fn new(p: Prim) -> Self {
        Type(p)
    }

    pub fn prim(&self) -> &Prim {
        &self.0
    }

    pub fn into_prim(self) -> Prim {
        self.0
    }

    pub fn op(&self) -> Option<OpCode> {
        self.0.op()
    }

    pub fn is(&self, op: OpCode) -> bool {
        self.0.is_op(op)
    }

    pub fn label(&self) -> Option<&str> {
        self.0.label()
    }

    fn child(&self, i: usize) -> Option<Type> {
        self.0.arg(i).cloned().map(Type)
    }

    /// First argument (left branch of `or`/`pair`, key of a map)
    pub fn left(&self) -> Option<Type> {
        self.child(0)
    }

    /// Second argument (right branch of `or`/`pair`, value of a map)
    pub fn right(&self) -> Option<Type> {
        self.child(1)
    }

    /// Key type of `map` and `big_map`
    pub fn key_type(&self) -> Option<Type> {
        match self.op()? {
            OpCode::map | OpCode::big_map => self.child(0),
            _ => None,
        }
    }

    /// Value type of `map`/`big_map`, element type of `list`/`set`/`option`/`ticket`/`contract`
    pub fn value_type(&self) -> Option<Type> {
        match self.op()? {
            OpCode::map | OpCode::big_map => self.child(1),
            OpCode::list | OpCode::set | OpCode::option | OpCode::ticket | OpCode::contract => {
                self.child(0)
            }
            _ => None,
        }
    }

    /// Field types of a right comb; a non-pair type is its own single field
    pub fn comb_fields(&self) -> Vec<Type> {
        self.0.comb_args().into_iter().cloned().map(Type).collect()
    }

    pub fn is_equal(&self, other: &Type) -> bool {
        self.0.is_equal(&other.0)
    }

    pub fn is_equal_with_anno(&self, other: &Type) -> bool {
        self.0.is_equal_with_anno(&other.0)
    }

    pub fn hash64(&self) -> Result<u64> {
        self.0.hash64()
    }

    pub fn from_binary(data: &[u8]) -> Result<Type> {
        Prim::from_binary(data).map(Type)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        self.0.to_binary()
    }

    pub fn from_json(data: &[u8]) -> Result<Type> {
        Prim::from_json(data).map(Type)
    }

    pub fn dump(&self) -> String {
        self.0.dump()
    }

    /// Entrypoints of a parameter type
    ///
    /// Every leaf of the `or` tree is an entrypoint named by its field
    /// annotation, unlabeled leaves are called `default`. Annotated inner
    /// `or` nodes are entrypoints as well. Order is depth-first, left first.
    pub fn entrypoints(&self) -> Entrypoints {
        let mut list = Vec::new();
        let mut used = HashSet::new();
        collect_entrypoints(&self.0, &mut Vec::new(), &mut list, &mut used);
        Entrypoints(list)
    }

    /// Left/right path to the named entrypoint, `None` when absent
    pub fn resolve_entrypoint_path(&self, name: &str) -> Option<String> {
        self.entrypoints().get(name).map(Entrypoint::path)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let name = if used.contains(base) {
        (0..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !used.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    } else {
        base.to_string()
    };
    used.insert(name.clone());
    name
}

fn collect_entrypoints(
    typ: &Prim,
    branch: &mut Vec<Branch>,
    out: &mut Vec<Entrypoint>,
    used: &mut HashSet<String>,
) {
    let is_or = typ.is_op(OpCode::or) && typ.args().len() == 2;
    if !is_or || typ.field_annot().is_some() {
        let base = typ.field_annot().unwrap_or("default");
        out.push(Entrypoint {
            id: out.len(),
            name: unique_name(base, used),
            branch: branch.clone(),
            typ: Type(typ.clone()),
        });
    }
    if is_or {
        for (side, arg) in [Branch::Left, Branch::Right].into_iter().zip(typ.args()) {
            branch.push(side);
            collect_entrypoints(arg, branch, out, used);
            branch.pop();
        }
    }
}

/// One step in a parameter's `or` tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    Left,
    Right,
}

impl Branch {
    pub fn as_char(self) -> char {
        match self {
            Branch::Left => 'L',
            Branch::Right => 'R',
        }
    }
}

/// A named, typed route into a contract's parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    pub id: usize,
    pub name: String,
    pub branch: Vec<Branch>,
    #[serde(rename = "type")]
    pub typ: Type,
}

impl Entrypoint {
    /// Branch as text, e.g. `"LR"`; empty for the root
    pub fn path(&self) -> String {
        self.branch.iter().map(|b| b.as_char()).collect()
    }

    /// Wrap an argument in the `Left`/`Right` constructors selecting this entrypoint
    pub fn wrap(&self, value: Prim) -> Prim {
        self.branch.iter().rev().fold(value, |v, b| match b {
            Branch::Left => Prim::left(v),
            Branch::Right => Prim::right(v),
        })
    }

    /// Whether the entrypoint takes no argument (`unit`)
    pub fn is_unit(&self) -> bool {
        self.typ.is(OpCode::unit)
    }
}

/// Entrypoints in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entrypoints(pub Vec<Entrypoint>);

impl Entrypoints {
    pub fn get(&self, name: &str) -> Option<&Entrypoint> {
        self.0.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entrypoint> {
        self.0.iter()
    }

    /// Route a full parameter value to its leaf entrypoint and the unwrapped argument
    pub fn resolve_value<'a>(&self, value: &'a Prim) -> Option<(&Entrypoint, &'a Prim)> {
        let mut branch = Vec::new();
        let mut cur = value;
        loop {
            let leaf = self
                .0
                .iter()
                .find(|e| e.branch == branch && !e.typ.is(OpCode::or));
            if let Some(entry) = leaf {
                return Some((entry, cur));
            }
            let side = match cur.op() {
                Some(OpCode::Left) => Branch::Left,
                Some(OpCode::Right) => Branch::Right,
                _ => return None,
            };
            branch.push(side);
            cur = cur.arg(0)?;
        }
    }
}

impl<'a> IntoIterator for &'a Entrypoints {
    type Item = &'a Entrypoint;
    type IntoIter = std::slice::Iter<'a, Entrypoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
