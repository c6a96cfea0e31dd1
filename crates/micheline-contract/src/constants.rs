//! Global constants
//!
//! Contracts may reference registered expressions with `constant "<hash>"`.
//! A [`ConstantDict`] holds the expressions fetched for those hashes so the
//! references can be replaced before further processing.

use crate::error::{ContractError, Result};
use micheline_core::{Node, Prim, Visit};
use std::collections::HashMap;

/// Nesting limit for constants that expand to further constants
pub const MAX_EXPANSION_DEPTH: usize = 64;

/// Expression hash to expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantDict(HashMap<String, Prim>);

impl ConstantDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hash: impl Into<String>, value: Prim) {
        self.0.insert(hash.into(), value);
    }

    pub fn has(&self, hash: &str) -> bool {
        self.0.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&Prim> {
        self.0.get(hash)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expression referenced by a `constant` node, if known
    pub fn lookup(&self, p: &Prim) -> Option<&Prim> {
        if !p.is_constant() {
            return None;
        }
        p.arg(0).and_then(Prim::as_str).and_then(|h| self.get(h))
    }
}

impl FromIterator<(String, Prim)> for ConstantDict {
    fn from_iter<I: IntoIterator<Item = (String, Prim)>>(iter: I) -> Self {
        ConstantDict(iter.into_iter().collect())
    }
}

/// Replace every known constant reference in `p`, including references inside
/// expanded expressions. Unknown references stay in place.
pub fn expand_constants(p: &mut Prim, dict: &ConstantDict) -> Result<()> {
    expand_at(p, dict, 0)
}

fn expand_at(p: &mut Prim, dict: &ConstantDict, depth: usize) -> Result<()> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(ContractError::shape("constant expansion nests too deep"));
    }
    let mut result = Ok(());
    p.visit_mut(&mut |node| {
        if result.is_err() {
            return Visit::Skip;
        }
        if let Some(expr) = dict.lookup(node) {
            let mut expr = expr.clone();
            result = expand_at(&mut expr, dict, depth + 1);
            *node = expr;
            return Visit::Skip;
        }
        match node.node {
            Node::Int(_) | Node::String(_) | Node::Bytes(_) => Visit::Skip,
            _ => Visit::Continue,
        }
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use micheline_core::OpCode;

    const H1: &str = "exprtrNvsCL6MY7rfibVC6t8uqVJgAXfjGDyBzxonZeUpiunP5P9KC";
    const H2: &str = "exprvK7Ubf8oFXQtDPDNHW1Lsg3DRrjUaSm8SHg7kdWs4BrTGqCWrS";

    fn constant(hash: &str) -> Prim {
        Prim::prim1(OpCode::constant, Prim::string(hash))
    }

    #[test]
    fn test_dict() {
        let mut dict = ConstantDict::new();
        assert!(dict.is_empty());
        dict.add(H1, Prim::prim0(OpCode::nat));
        assert!(dict.has(H1));
        assert!(!dict.has(H2));
        assert_eq!(dict.get(H1), Some(&Prim::prim0(OpCode::nat)));
        assert_eq!(dict.lookup(&constant(H1)), Some(&Prim::prim0(OpCode::nat)));
    }

    #[test]
    fn test_expand_nested() {
        let mut dict = ConstantDict::new();
        dict.add(H1, Prim::pair_type(constant(H2), Prim::prim0(OpCode::unit)));
        dict.add(H2, Prim::prim0(OpCode::nat));
        let mut p = Prim::option_type(constant(H1));
        expand_constants(&mut p, &dict).unwrap();
        assert_eq!(p.dump(), "option (pair nat unit)");
        assert!(p.constants().is_empty());
    }

    #[test]
    fn test_unknown_reference_is_kept() {
        let mut p = Prim::seq(vec![constant(H1)]);
        expand_constants(&mut p, &ConstantDict::new()).unwrap();
        assert_eq!(p.constants(), vec![H1.to_string()]);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let mut dict = ConstantDict::new();
        dict.add(H1, Prim::option_type(constant(H1)));
        let mut p = constant(H1);
        assert!(expand_constants(&mut p, &dict).is_err());
    }
}
