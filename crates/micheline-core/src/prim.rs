//! Micheline primitive tree
//!
//! [`Prim`] is the universal node for Michelson code, types and values. A node
//! is either a literal (int, string, bytes), a sequence, or a primitive
//! application carrying an [`OpCode`], ordered arguments and annotations.
//!
//! The arity class of an application (nullary, unary, binary, variadic) is
//! derived from its argument list, so a node can never disagree with its own
//! kind.

use crate::error::Result;
use crate::opcode::OpCode;
use num_bigint::BigInt;
use sha2::{Digest, Sha256};
use std::fmt;

/// Representational kind of a node
///
/// Mirrors the node tags of the binary encoding. Annotated and plain
/// variadic applications share a single binary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Int,
    String,
    Bytes,
    Nullary,
    NullaryAnno,
    Unary,
    UnaryAnno,
    Binary,
    BinaryAnno,
    Variadic,
    VariadicAnno,
    Sequence,
}

impl PrimKind {
    /// Binary node tag for this kind
    pub fn tag(self) -> u8 {
        match self {
            PrimKind::Int => 0x00,
            PrimKind::String => 0x01,
            PrimKind::Sequence => 0x02,
            PrimKind::Nullary => 0x03,
            PrimKind::NullaryAnno => 0x04,
            PrimKind::Unary => 0x05,
            PrimKind::UnaryAnno => 0x06,
            PrimKind::Binary => 0x07,
            PrimKind::BinaryAnno => 0x08,
            PrimKind::Variadic | PrimKind::VariadicAnno => 0x09,
            PrimKind::Bytes => 0x0a,
        }
    }

    /// Whether the kind carries an annotation list
    pub fn is_annotated(self) -> bool {
        matches!(
            self,
            PrimKind::NullaryAnno
                | PrimKind::UnaryAnno
                | PrimKind::BinaryAnno
                | PrimKind::VariadicAnno
        )
    }
}

/// Primitive application: an opcode with arguments and annotations
#[derive(Debug, Clone)]
pub struct App {
    /// The applied primitive
    pub op: OpCode,
    /// Ordered child nodes
    pub args: Vec<Prim>,
    /// Annotations including their `%`, `@` or `:` prefix
    pub annots: Vec<String>,
    /// Encode with the generic (variadic) binary tag even for two or fewer args
    pub generic: bool,
}

/// Node payload
#[derive(Debug, Clone)]
pub enum Node {
    Int(BigInt),
    String(String),
    Bytes(Vec<u8>),
    Seq(Vec<Prim>),
    App(App),
}

/// A Micheline tree node
///
/// Cloning deep-copies the whole subtree. `was_packed` is set on trees produced
/// by [`Prim::unpack`] and is ignored by every equality check.
#[derive(Debug, Clone)]
pub struct Prim {
    pub node: Node,
    pub was_packed: bool,
}

/// Traversal control returned by [`Prim::walk`] and [`Prim::visit_mut`] callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Descend into the node's children
    Continue,
    /// Do not descend into this node's children
    Skip,
}

impl From<Node> for Prim {
    fn from(node: Node) -> Self {
        Prim {
            node,
            was_packed: false,
        }
    }
}

// Builders
impl Prim {
    pub fn int(v: i64) -> Self {
        Node::Int(BigInt::from(v)).into()
    }

    pub fn nat(v: u64) -> Self {
        Node::Int(BigInt::from(v)).into()
    }

    pub fn big(v: BigInt) -> Self {
        Node::Int(v).into()
    }

    /// Amount in mutez
    pub fn mutez(v: u64) -> Self {
        Prim::nat(v)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Node::String(s.into()).into()
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Node::Bytes(b.into()).into()
    }

    pub fn seq(items: Vec<Prim>) -> Self {
        Node::Seq(items).into()
    }

    /// Application of `op` to `args`; more than two args select the variadic form
    pub fn app(op: OpCode, args: Vec<Prim>) -> Self {
        let generic = args.len() > 2;
        Node::App(App {
            op,
            args,
            annots: Vec::new(),
            generic,
        })
        .into()
    }

    pub fn prim0(op: OpCode) -> Self {
        Prim::app(op, Vec::new())
    }

    pub fn prim1(op: OpCode, arg: Prim) -> Self {
        Prim::app(op, vec![arg])
    }

    pub fn prim2(op: OpCode, left: Prim, right: Prim) -> Self {
        Prim::app(op, vec![left, right])
    }

    pub fn unit() -> Self {
        Prim::prim0(OpCode::Unit)
    }

    pub fn bool(v: bool) -> Self {
        Prim::prim0(if v { OpCode::True } else { OpCode::False })
    }

    pub fn pair(left: Prim, right: Prim) -> Self {
        Prim::prim2(OpCode::Pair, left, right)
    }

    pub fn some(v: Prim) -> Self {
        Prim::prim1(OpCode::Some, v)
    }

    pub fn none() -> Self {
        Prim::prim0(OpCode::None)
    }

    pub fn left(v: Prim) -> Self {
        Prim::prim1(OpCode::Left, v)
    }

    pub fn right(v: Prim) -> Self {
        Prim::prim1(OpCode::Right, v)
    }

    pub fn elt(key: Prim, value: Prim) -> Self {
        Prim::prim2(OpCode::Elt, key, value)
    }

    pub fn map_type(key: Prim, value: Prim) -> Self {
        Prim::prim2(OpCode::map, key, value)
    }

    pub fn big_map_type(key: Prim, value: Prim) -> Self {
        Prim::prim2(OpCode::big_map, key, value)
    }

    pub fn set_type(elem: Prim) -> Self {
        Prim::prim1(OpCode::set, elem)
    }

    pub fn list_type(elem: Prim) -> Self {
        Prim::prim1(OpCode::list, elem)
    }

    pub fn option_type(elem: Prim) -> Self {
        Prim::prim1(OpCode::option, elem)
    }

    pub fn pair_type(left: Prim, right: Prim) -> Self {
        Prim::prim2(OpCode::pair, left, right)
    }

    pub fn or_type(left: Prim, right: Prim) -> Self {
        Prim::prim2(OpCode::or, left, right)
    }

    pub fn lambda_type(arg: Prim, ret: Prim) -> Self {
        Prim::prim2(OpCode::lambda, arg, ret)
    }

    pub fn contract_type(arg: Prim) -> Self {
        Prim::prim1(OpCode::contract, arg)
    }

    /// Right-nested comb `Pair a (Pair b (Pair c d))` from a flat list
    pub fn comb(values: Vec<Prim>) -> Self {
        Prim::fold_comb(OpCode::Pair, values)
    }

    /// Right-nested comb `pair a (pair b c)` from a flat list of types
    pub fn comb_type(types: Vec<Prim>) -> Self {
        Prim::fold_comb(OpCode::pair, types)
    }

    fn fold_comb(op: OpCode, items: Vec<Prim>) -> Self {
        let mut iter = items.into_iter().rev();
        match iter.next() {
            None => Prim::prim0(op),
            Some(last) => iter.fold(last, |acc, item| Prim::prim2(op, item, acc)),
        }
    }

    /// Append an annotation (with prefix, e.g. `%owner`)
    pub fn with_annot(mut self, annot: impl Into<String>) -> Self {
        if let Node::App(app) = &mut self.node {
            app.annots.push(annot.into());
        }
        self
    }
}

// Accessors
impl Prim {
    pub fn kind(&self) -> PrimKind {
        match &self.node {
            Node::Int(_) => PrimKind::Int,
            Node::String(_) => PrimKind::String,
            Node::Bytes(_) => PrimKind::Bytes,
            Node::Seq(_) => PrimKind::Sequence,
            Node::App(app) => {
                let anno = !app.annots.is_empty();
                match (app.generic || app.args.len() > 2, app.args.len(), anno) {
                    (true, _, false) => PrimKind::Variadic,
                    (true, _, true) => PrimKind::VariadicAnno,
                    (false, 0, false) => PrimKind::Nullary,
                    (false, 0, true) => PrimKind::NullaryAnno,
                    (false, 1, false) => PrimKind::Unary,
                    (false, 1, true) => PrimKind::UnaryAnno,
                    (false, _, false) => PrimKind::Binary,
                    (false, _, true) => PrimKind::BinaryAnno,
                }
            }
        }
    }

    /// Applied primitive, unset for literals and sequences
    pub fn op(&self) -> Option<OpCode> {
        match &self.node {
            Node::App(app) => Some(app.op),
            _ => None,
        }
    }

    pub fn is_op(&self, op: OpCode) -> bool {
        self.op() == Some(op)
    }

    /// Children of an application or sequence; empty for literals
    pub fn args(&self) -> &[Prim] {
        match &self.node {
            Node::App(app) => &app.args,
            Node::Seq(items) => items,
            _ => &[],
        }
    }

    pub fn args_mut(&mut self) -> Option<&mut Vec<Prim>> {
        match &mut self.node {
            Node::App(app) => Some(&mut app.args),
            Node::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn arg(&self, i: usize) -> Option<&Prim> {
        self.args().get(i)
    }

    pub fn annots(&self) -> &[String] {
        match &self.node {
            Node::App(app) => &app.annots,
            _ => &[],
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match &self.node {
            Node::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.node {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.node {
            Node::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_seq(&self) -> bool {
        matches!(self.node, Node::Seq(_))
    }

    /// Data `Pair` or type `pair`
    pub fn is_pair(&self) -> bool {
        matches!(self.op(), Some(OpCode::Pair) | Some(OpCode::pair))
    }

    /// A global constant reference `constant "<expr hash>"`
    pub fn is_constant(&self) -> bool {
        self.is_op(OpCode::constant) && self.arg(0).and_then(Prim::as_str).is_some()
    }

    /// Expression hashes of all global constants referenced in this tree
    pub fn constants(&self) -> Vec<String> {
        let mut found = Vec::new();
        self.walk(&mut |p| {
            if p.is_constant() {
                if let Some(hash) = p.arg(0).and_then(Prim::as_str) {
                    found.push(hash.to_string());
                }
            }
            Visit::Continue
        });
        found
    }

    fn annot_with(&self, prefix: char) -> Option<&str> {
        self.annots()
            .iter()
            .find_map(|a| a.strip_prefix(prefix))
            .filter(|name| !name.is_empty())
    }

    /// First field annotation without its `%` prefix
    pub fn field_annot(&self) -> Option<&str> {
        self.annot_with('%')
    }

    /// First variable annotation without its `@` prefix
    pub fn var_annot(&self) -> Option<&str> {
        self.annot_with('@')
    }

    /// First type annotation without its `:` prefix
    pub fn type_annot(&self) -> Option<&str> {
        self.annot_with(':')
    }

    /// Best display name from annotations: field, then variable, then type
    pub fn label(&self) -> Option<&str> {
        self.field_annot()
            .or_else(|| self.var_annot())
            .or_else(|| self.type_annot())
    }

    pub fn has_annots(&self) -> bool {
        !self.annots().is_empty()
    }

    /// Copy of this tree with every annotation removed
    pub fn strip_annots(&self) -> Prim {
        let mut out = self.clone();
        out.visit_mut(&mut |p| {
            if let Node::App(app) = &mut p.node {
                app.annots.clear();
            }
            Visit::Continue
        });
        out
    }
}

// Comb pairs
impl Prim {
    /// Splice every nested pair into one flat list, like repeated `UNPAIR`.
    ///
    /// `Pair (Pair 1 2) 3 4` yields `[1, 2, 3, 4]`. Other containers (maps,
    /// lists, options, ors) are kept as single entries.
    pub fn flatten_pairs(&self) -> Vec<&Prim> {
        let mut out = Vec::new();
        self.flatten_pairs_into(&mut out);
        out
    }

    fn flatten_pairs_into<'a>(&'a self, out: &mut Vec<&'a Prim>) {
        if self.is_pair() {
            for arg in self.args() {
                arg.flatten_pairs_into(out);
            }
        } else {
            out.push(self);
        }
    }

    /// Flatten only the right spine of a comb: `pair a (pair b c)` and
    /// `pair a b c` both yield `[a, b, c]`. Left-nested pairs stay intact.
    pub fn comb_args(&self) -> Vec<&Prim> {
        let mut out = Vec::new();
        let mut cur = self;
        loop {
            let args = cur.args();
            match args.split_last() {
                Some((last, head)) if cur.is_pair() => {
                    out.extend(head.iter());
                    // annotated right children are fields of their own
                    if last.is_pair() && !last.has_annots() {
                        cur = last;
                    } else {
                        out.push(last);
                        break;
                    }
                }
                _ => {
                    out.push(cur);
                    break;
                }
            }
        }
        out
    }

    /// Rewrite flat n-ary pairs (`pair a b c`) into right-nested binary pairs
    pub fn unfold_pairs(&self) -> Prim {
        let mut out = self.clone();
        out.visit_mut(&mut |p| {
            if let Node::App(app) = &mut p.node {
                if matches!(app.op, OpCode::pair | OpCode::Pair) && app.args.len() > 2 {
                    let rest = app.args.split_off(1);
                    app.args.push(Prim::fold_comb(app.op, rest));
                    app.generic = false;
                }
            }
            Visit::Continue
        });
        out
    }
}

// Equality and hashing
impl Prim {
    /// Structural equality ignoring annotations
    pub fn is_equal(&self, other: &Prim) -> bool {
        self.compare(other, false)
    }

    /// Structural equality including annotations
    pub fn is_equal_with_anno(&self, other: &Prim) -> bool {
        self.compare(other, true)
    }

    fn compare(&self, other: &Prim, with_anno: bool) -> bool {
        match (&self.node, &other.node) {
            (Node::Int(a), Node::Int(b)) => a == b,
            (Node::String(a), Node::String(b)) => a == b,
            (Node::Bytes(a), Node::Bytes(b)) => a == b,
            (Node::Seq(a), Node::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.compare(y, with_anno))
            }
            (Node::App(a), Node::App(b)) => {
                a.op == b.op
                    && (!with_anno || a.annots == b.annots)
                    && a.args.len() == b.args.len()
                    && a.args.iter().zip(&b.args).all(|(x, y)| x.compare(y, with_anno))
            }
            _ => false,
        }
    }

    /// First 8 bytes (big-endian) of the SHA-256 of the binary encoding
    ///
    /// A structural fingerprint for deduplicating interfaces, storage types
    /// and code, not a cryptographic commitment.
    pub fn hash64(&self) -> Result<u64> {
        let encoded = self.to_binary()?;
        let digest = Sha256::digest(&encoded);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Ok(u64::from_be_bytes(head))
    }
}

impl PartialEq for Prim {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal_with_anno(other)
    }
}

impl Eq for Prim {}

// Traversal
impl Prim {
    /// Depth-first pre-order walk; children left to right
    pub fn walk<F: FnMut(&Prim) -> Visit>(&self, f: &mut F) {
        if f(self) == Visit::Skip {
            return;
        }
        for arg in self.args() {
            arg.walk(f);
        }
    }

    /// Depth-first pre-order walk with mutable access
    ///
    /// The callback may replace the node; descent continues into the
    /// replacement's children unless [`Visit::Skip`] is returned.
    pub fn visit_mut<F: FnMut(&mut Prim) -> Visit>(&mut self, f: &mut F) {
        if f(self) == Visit::Skip {
            return;
        }
        if let Some(args) = self.args_mut() {
            for arg in args.iter_mut() {
                arg.visit_mut(f);
            }
        }
    }

    /// Michelson expression text, used in debug output and test diffs
    pub fn dump(&self) -> String {
        self.to_string()
    }

    /// Like [`Prim::dump`] but truncated to `limit` characters
    pub fn dump_limit(&self, limit: usize) -> String {
        self.dump().chars().take(limit).collect()
    }
}

impl fmt::Display for Prim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Int(v) => write!(f, "{}", v),
            Node::String(s) => write!(f, "{:?}", s),
            Node::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Node::Seq(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ;")?;
                    }
                    write!(f, " {}", item)?;
                }
                f.write_str(" }")
            }
            Node::App(app) => {
                f.write_str(app.op.name())?;
                for annot in &app.annots {
                    write!(f, " {}", annot)?;
                }
                for arg in &app.args {
                    match &arg.node {
                        Node::App(inner) if !inner.args.is_empty() || !inner.annots.is_empty() => {
                            write!(f, " ({})", arg)?
                        }
                        _ => write!(f, " {}", arg)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_arity() {
        assert_eq!(Prim::unit().kind(), PrimKind::Nullary);
        assert_eq!(Prim::some(Prim::int(1)).kind(), PrimKind::Unary);
        assert_eq!(Prim::pair(Prim::int(1), Prim::int(2)).kind(), PrimKind::Binary);
        assert_eq!(
            Prim::app(OpCode::Pair, vec![Prim::int(1), Prim::int(2), Prim::int(3)]).kind(),
            PrimKind::Variadic
        );
        assert_eq!(
            Prim::prim0(OpCode::nat).with_annot("%x").kind(),
            PrimKind::NullaryAnno
        );
        assert_eq!(Prim::seq(vec![]).kind(), PrimKind::Sequence);
        assert_eq!(Prim::string("a").kind().tag(), 0x01);
    }

    #[test]
    fn test_equality_levels() {
        let a = Prim::prim0(OpCode::nat).with_annot("%a");
        let b = Prim::prim0(OpCode::nat).with_annot("%b");
        assert!(a.is_equal(&b));
        assert!(!a.is_equal_with_anno(&b));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(!Prim::int(1).is_equal(&Prim::string("1")));
    }

    #[test]
    fn test_walk_skip() {
        let tree = Prim::pair(
            Prim::some(Prim::int(1)),
            Prim::seq(vec![Prim::int(2), Prim::int(3)]),
        );
        let mut seen = Vec::new();
        tree.walk(&mut |p| {
            if let Some(v) = p.as_int() {
                seen.push(v.clone());
            }
            if p.is_op(OpCode::Some) {
                Visit::Skip
            } else {
                Visit::Continue
            }
        });
        assert_eq!(seen, vec![BigInt::from(2), BigInt::from(3)]);
    }

    #[test]
    fn test_flatten_pairs() {
        let v = Prim::pair(
            Prim::pair(Prim::int(1), Prim::int(2)),
            Prim::app(
                OpCode::Pair,
                vec![Prim::int(3), Prim::some(Prim::int(4)), Prim::int(5)],
            ),
        );
        let flat: Vec<String> = v.flatten_pairs().iter().map(|p| p.dump()).collect();
        assert_eq!(flat, vec!["1", "2", "3", "Some 4", "5"]);
    }

    #[test]
    fn test_comb_roundtrip() {
        let items = vec![Prim::int(1), Prim::int(2), Prim::int(3)];
        let comb = Prim::comb(items.clone());
        assert_eq!(comb.dump(), "Pair 1 (Pair 2 3)");
        let back: Vec<Prim> = comb.comb_args().into_iter().cloned().collect();
        assert_eq!(back, items);

        let flat = Prim::app(OpCode::Pair, items.clone());
        assert_eq!(flat.comb_args().len(), 3);
        assert!(flat.unfold_pairs().is_equal(&comb));
    }

    #[test]
    fn test_labels() {
        let p = Prim::prim0(OpCode::nat)
            .with_annot(":t")
            .with_annot("@v")
            .with_annot("%f");
        assert_eq!(p.field_annot(), Some("f"));
        assert_eq!(p.var_annot(), Some("v"));
        assert_eq!(p.type_annot(), Some("t"));
        assert_eq!(p.label(), Some("f"));
        assert_eq!(Prim::prim0(OpCode::nat).label(), None);
        assert!(p.strip_annots().annots().is_empty());
    }

    #[test]
    fn test_constants() {
        let hash = "exprtrNvsCL6MY7rfibVC6t8uqVJgAXfjGDyBzxonZeUpiunP5P9KC";
        let code = Prim::seq(vec![
            Prim::prim1(OpCode::constant, Prim::string(hash)),
            Prim::prim0(OpCode::UNIT),
        ]);
        assert_eq!(code.constants(), vec![hash.to_string()]);
    }

    #[test]
    fn test_dump() {
        let p = Prim::seq(vec![
            Prim::prim0(OpCode::UNIT),
            Prim::prim1(OpCode::NIL, Prim::prim0(OpCode::operation)),
        ]);
        assert_eq!(p.dump(), "{ UNIT ; NIL operation }");
        assert_eq!(p.dump_limit(6), "{ UNIT");
    }
}
