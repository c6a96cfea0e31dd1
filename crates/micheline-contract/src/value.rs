//! Typed values
//!
//! A [`Value`] pairs a value tree with its type so fields can be addressed by
//! the names the type's annotations give them. Paths are dot separated
//! (`"ledger.owner"`, `"items.0.amount"`); a segment matches a field name, a
//! map key or a position. `option` and `or` nodes are looked through, so a
//! path never names `Some`, `Left` or `Right`.

use crate::error::{ContractError, Result};
use crate::linker::Names;
use micheline_core::{Address, Key, Node, OpCode, Prim, Signature, Type, Visit};
use num_bigint::BigInt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

/// A value tree with its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub typ: Type,
    pub value: Prim,
}

impl Value {
    pub fn new(typ: Type, value: Prim) -> Self {
        Self { typ, value }
    }

    /// Render as JSON using field names from the type
    ///
    /// Pairs become objects (unlabeled fields are keyed by position), maps
    /// become objects keyed by the rendered key, lists and sets arrays.
    /// Integers that fit 64 bits are numbers and larger ones strings.
    /// Addresses, keys and signatures use their base58 text form.
    pub fn map(&self) -> Result<Json> {
        let typ = self.typ.prim();
        let value = &self.value;
        Ok(match typ.op() {
            Some(OpCode::pair) => {
                let mut obj = Map::new();
                for (name, child) in self.children()? {
                    obj.insert(name, child.map()?);
                }
                Json::Object(obj)
            }
            Some(OpCode::option) => match value.op() {
                Some(OpCode::Some) => self.inner(0)?.map()?,
                Some(OpCode::None) => Json::Null,
                _ => return Err(mismatch(self)),
            },
            Some(OpCode::or) => {
                let (side, default) = match value.op() {
                    Some(OpCode::Left) => (0, "Left"),
                    Some(OpCode::Right) => (1, "Right"),
                    _ => return Err(mismatch(self)),
                };
                let inner = self.inner(side)?;
                let key = inner.typ.label().unwrap_or(default).to_string();
                let mut obj = Map::new();
                obj.insert(key, inner.map()?);
                Json::Object(obj)
            }
            Some(OpCode::list) | Some(OpCode::set) => Json::Array(
                self.children()?
                    .into_iter()
                    .map(|(_, child)| child.map())
                    .collect::<Result<_>>()?,
            ),
            Some(OpCode::map) | Some(OpCode::big_map) if value.is_seq() => {
                let mut obj = Map::new();
                for (name, child) in self.children()? {
                    obj.insert(name, child.map()?);
                }
                Json::Object(obj)
            }
            Some(OpCode::bool) => match value.op() {
                Some(OpCode::True) => Json::Bool(true),
                Some(OpCode::False) => Json::Bool(false),
                _ => return Err(mismatch(self)),
            },
            Some(OpCode::unit) => Json::Null,
            Some(OpCode::address) | Some(OpCode::contract) | Some(OpCode::key_hash) => {
                match address_of(&self.typ, value) {
                    Some(addr) => Json::String(addr),
                    None => literal(self)?,
                }
            }
            Some(OpCode::key) => match value.as_bytes().and_then(|b| Key::from_bytes(b).ok()) {
                Some(k) => Json::String(k.to_string()),
                None => literal(self)?,
            },
            Some(OpCode::signature) => {
                match value.as_bytes().and_then(|b| Signature::from_bytes(b).ok()) {
                    Some(s) => Json::String(s.to_string()),
                    None => literal(self)?,
                }
            }
            Some(OpCode::lambda) => Json::String(value.dump()),
            _ => literal(self)?,
        })
    }

    /// Decode the JSON rendering of [`Value::map`] into `T`
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.map()?)?)
    }

    /// The value at a dotted path, `""` being the value itself
    pub fn get_path(&self, path: &str) -> Result<Value> {
        let mut cur = self.clone().unwrapped()?;
        if path.is_empty() {
            return Ok(cur);
        }
        for seg in path.split('.') {
            let mut children = cur.children()?;
            let pos = children
                .iter()
                .position(|(name, _)| name == seg)
                .or_else(|| seg.parse::<usize>().ok().filter(|i| *i < children.len()))
                .ok_or_else(|| ContractError::Path(format!("{}: no field {:?}", path, seg)))?;
            cur = children.swap_remove(pos).1.unwrapped()?;
        }
        Ok(cur)
    }

    pub fn get_address(&self, path: &str) -> Option<Address> {
        let v = self.get_path(path).ok()?;
        match &v.value.node {
            Node::String(s) => s.split('%').next()?.parse().ok(),
            Node::Bytes(_) => address_of(&v.typ, &v.value)?.split('%').next()?.parse().ok(),
            _ => None,
        }
    }

    pub fn get_key(&self, path: &str) -> Option<Key> {
        let v = self.get_path(path).ok()?;
        match &v.value.node {
            Node::String(s) => s.parse().ok(),
            Node::Bytes(b) => Key::from_bytes(b).ok(),
            _ => None,
        }
    }

    pub fn get_signature(&self, path: &str) -> Option<Signature> {
        let v = self.get_path(path).ok()?;
        match &v.value.node {
            Node::String(s) => s.parse().ok(),
            Node::Bytes(b) => Signature::from_bytes(b).ok(),
            _ => None,
        }
    }

    pub fn get_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.get_path(path).ok()?.value.as_bytes().map(<[u8]>::to_vec)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get_path(path).ok()?.value.op()? {
            OpCode::True => Some(true),
            OpCode::False => Some(false),
            _ => None,
        }
    }

    pub fn get_int64(&self, path: &str) -> Option<i64> {
        i64::try_from(self.get_path(path).ok()?.value.as_int()?).ok()
    }

    pub fn get_big(&self, path: &str) -> Option<BigInt> {
        self.get_path(path).ok()?.value.as_int().cloned()
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get_path(path).ok()?.value.as_str().map(str::to_string)
    }

    /// Depth-first walk over nested values with their dotted paths
    ///
    /// Returning [`Visit::Skip`] stops descent below the visited value.
    pub fn walk<F: FnMut(&str, &Value) -> Visit>(&self, f: &mut F) -> Result<()> {
        self.clone().unwrapped()?.walk_at("", f)
    }

    fn walk_at<F: FnMut(&str, &Value) -> Visit>(&self, path: &str, f: &mut F) -> Result<()> {
        for (name, child) in self.children()? {
            let child = child.unwrapped()?;
            let path = if path.is_empty() {
                name
            } else {
                format!("{}.{}", path, name)
            };
            if f(&path, &child) == Visit::Continue {
                child.walk_at(&path, f)?;
            }
        }
        Ok(())
    }

    fn inner(&self, i: usize) -> Result<Value> {
        let typ = self
            .typ
            .prim()
            .arg(i)
            .ok_or_else(|| mismatch(self))?;
        let value = self.value.arg(0).ok_or_else(|| mismatch(self))?;
        Ok(Value::new(Type(typ.clone()), value.clone()))
    }

    /// Look through `Some` and `Left`/`Right` wrappers
    fn unwrapped(self) -> Result<Value> {
        let mut cur = self;
        loop {
            let side = match (cur.typ.op(), cur.value.op()) {
                (Some(OpCode::option), Some(OpCode::Some)) => 0,
                (Some(OpCode::or), Some(OpCode::Left)) => 0,
                (Some(OpCode::or), Some(OpCode::Right)) => 1,
                _ => return Ok(cur),
            };
            cur = cur.inner(side)?;
        }
    }

    /// Named direct children of a container value
    fn children(&self) -> Result<Vec<(String, Value)>> {
        let typ = self.typ.prim();
        match typ.op() {
            Some(OpCode::pair) => {
                let mut fields = Vec::new();
                pair_fields(typ, &self.value, &mut fields).ok_or_else(|| mismatch(self))?;
                let mut names = Names::default();
                Ok(fields
                    .into_iter()
                    .enumerate()
                    .map(|(i, (t, v))| {
                        let pos = i.to_string();
                        let name = names.unique(t.label().or(Some(pos.as_str())), "field");
                        (name, Value::new(Type(t.clone()), v))
                    })
                    .collect())
            }
            Some(OpCode::list) | Some(OpCode::set) => {
                let elem = typ.arg(0).ok_or_else(|| mismatch(self))?;
                let items = self.seq_items()?;
                Ok(items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (i.to_string(), Value::new(Type(elem.clone()), item.clone())))
                    .collect())
            }
            Some(OpCode::map) | Some(OpCode::big_map) => {
                // a big_map stored by id has no inline entries
                if self.value.as_int().is_some() {
                    return Ok(Vec::new());
                }
                let (kt, vt) = match typ.args() {
                    [k, v] => (k, v),
                    _ => return Err(mismatch(self)),
                };
                self.seq_items()?
                    .iter()
                    .map(|elt| match elt.args() {
                        [k, v] if elt.is_op(OpCode::Elt) => {
                            let key = Value::new(Type(kt.clone()), k.clone());
                            Ok((key_text(&key)?, Value::new(Type(vt.clone()), v.clone())))
                        }
                        _ => Err(mismatch(self)),
                    })
                    .collect()
            }
            _ => Ok(Vec::new()),
        }
    }

    fn seq_items(&self) -> Result<&[Prim]> {
        if self.value.is_seq() {
            Ok(self.value.args())
        } else {
            Err(mismatch(self))
        }
    }
}

fn mismatch(v: &Value) -> ContractError {
    ContractError::shape(format!(
        "value {} does not match type {}",
        v.value.dump_limit(64),
        v.typ.prim().dump_limit(64)
    ))
}

/// JSON for a literal node regardless of its type
fn literal(v: &Value) -> Result<Json> {
    Ok(match &v.value.node {
        Node::Int(n) => int_json(n),
        Node::String(s) => Json::String(s.clone()),
        Node::Bytes(b) => Json::String(hex::encode(b)),
        _ => serde_json::to_value(&v.value)?,
    })
}

fn int_json(n: &BigInt) -> Json {
    if let Ok(i) = i64::try_from(n) {
        Json::from(i)
    } else if let Ok(u) = u64::try_from(n) {
        Json::from(u)
    } else {
        Json::String(n.to_string())
    }
}

/// Map key as object key text
fn key_text(key: &Value) -> Result<String> {
    Ok(match key.map()? {
        Json::String(s) => s,
        other => other.to_string(),
    })
}

/// Base58 text of an address-like bytes value, with a `%entrypoint` suffix
/// for typed contract references
fn address_of(typ: &Type, value: &Prim) -> Option<String> {
    let b = value.as_bytes()?;
    if typ.is(OpCode::key_hash) {
        return Address::from_key_hash_bytes(b).ok().map(|a| a.to_string());
    }
    if b.len() < 22 {
        return None;
    }
    let (addr, entrypoint) = b.split_at(22);
    let mut text = Address::from_bytes(addr).ok()?.to_string();
    if !entrypoint.is_empty() {
        text.push('%');
        text.push_str(std::str::from_utf8(entrypoint).ok()?);
    }
    Some(text)
}

/// Split a comb value into `n` fields along its right spine
fn split_comb(value: &Prim, n: usize) -> Option<Vec<Prim>> {
    let mut out = Vec::with_capacity(n);
    let mut cur = value.clone();
    while out.len() + 1 < n {
        if !(cur.is_op(OpCode::Pair) || cur.is_seq()) || cur.args().len() < 2 {
            return None;
        }
        let mut args = cur.args().to_vec();
        let rest = args.split_off(1);
        out.extend(args);
        cur = match <[Prim; 1]>::try_from(rest) {
            Ok([last]) => last,
            Err(rest) => Prim::app(OpCode::Pair, rest),
        };
    }
    out.push(cur);
    Some(out)
}

/// Fields of a pair type with their values, unlabeled nested pairs merged in
fn pair_fields<'t>(typ: &'t Prim, value: &Prim, out: &mut Vec<(&'t Prim, Prim)>) -> Option<()> {
    let types = typ.comb_args();
    let values = split_comb(value, types.len())?;
    for (t, v) in types.into_iter().zip(values) {
        if t.is_op(OpCode::pair) && t.label().is_none() {
            pair_fields(t, &v, out)?;
        } else {
            out.push((t, v));
        }
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;

    const OWNER: &str = "tz1XaLRi6i8qNDa4KyNjQcxFvFDDs8xi7nr1";
    const PUBKEY: &str = "edpkteE38F3sjXHPrNR1sfRMgdjXsSLDeJnBPAewkBtN5nmV3KcA7Q";

    fn t(op: OpCode) -> Prim {
        Prim::prim0(op)
    }

    fn account_type() -> Type {
        Type(Prim::comb_type(vec![
            t(OpCode::address).with_annot("%owner"),
            t(OpCode::nat).with_annot("%balance"),
            Prim::map_type(t(OpCode::string), t(OpCode::bytes)).with_annot("%meta"),
            Prim::option_type(Prim::pair_type(
                t(OpCode::bool).with_annot("%active"),
                t(OpCode::key).with_annot("%k"),
            ))
            .with_annot("%next"),
        ]))
    }

    fn account_items() -> Vec<Prim> {
        let owner: Address = OWNER.parse().unwrap();
        vec![
            Prim::bytes(owner.to_bytes()),
            Prim::nat(42),
            Prim::seq(vec![Prim::elt(Prim::string("name"), Prim::bytes(b"abc".to_vec()))]),
            Prim::some(Prim::pair(Prim::bool(true), Prim::string(PUBKEY))),
        ]
    }

    fn account() -> Value {
        Value::new(account_type(), Prim::comb(account_items()))
    }

    #[test]
    fn test_map() {
        assert_eq!(
            account().map().unwrap(),
            json!({
                "owner": OWNER,
                "balance": 42,
                "meta": {"name": "616263"},
                "next": {"active": true, "k": PUBKEY},
            })
        );
    }

    #[test]
    fn test_flat_pair_value() {
        let flat = Value::new(account_type(), Prim::app(OpCode::Pair, account_items()));
        assert_eq!(flat.map().unwrap(), account().map().unwrap());
        assert_eq!(flat.get_int64("balance"), Some(42));
    }

    #[test]
    fn test_getters() {
        let v = account();
        assert_eq!(v.get_address("owner").map(|a| a.to_string()).as_deref(), Some(OWNER));
        assert_eq!(v.get_int64("balance"), Some(42));
        assert_eq!(v.get_int64("1"), Some(42));
        assert_eq!(v.get_big("balance"), Some(BigInt::from(42)));
        assert_eq!(v.get_bytes("meta.name"), Some(b"abc".to_vec()));
        assert_eq!(v.get_bool("next.active"), Some(true));
        assert_eq!(v.get_key("next.k").map(|k| k.to_string()).as_deref(), Some(PUBKEY));
        assert_eq!(v.get_string("next.k").as_deref(), Some(PUBKEY));
    }

    #[test]
    fn test_missing_paths_are_not_found() {
        let v = account();
        assert!(v.get_int64("missing").is_none());
        assert!(v.get_int64("owner.x").is_none());
        assert!(v.get_bool("balance").is_none());
        assert!(v.get_signature("owner").is_none());
        assert!(matches!(v.get_path("meta.other"), Err(ContractError::Path(_))));
    }

    #[test]
    fn test_or_and_big_numbers() {
        let typ = Type(Prim::or_type(
            t(OpCode::unit).with_annot("%a"),
            t(OpCode::nat).with_annot("%b"),
        ));
        let big = BigInt::from(1u64 << 60) * BigInt::from(1024);
        let v = Value::new(typ, Prim::right(Prim::big(big.clone())));
        assert_eq!(v.map().unwrap(), json!({"b": "1180591620717411303424"}));
        assert_eq!(v.get_big(""), Some(big));
        assert_eq!(v.get_int64(""), None);
    }

    #[test]
    fn test_list_paths() {
        let typ = Type(Prim::list_type(Prim::pair_type(
            t(OpCode::nat).with_annot("%id"),
            t(OpCode::string).with_annot("%name"),
        )));
        let v = Value::new(
            typ,
            Prim::seq(vec![
                Prim::pair(Prim::nat(1), Prim::string("a")),
                Prim::pair(Prim::nat(2), Prim::string("b")),
            ]),
        );
        assert_eq!(v.get_string("1.name").as_deref(), Some("b"));
        assert_eq!(
            v.map().unwrap(),
            json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])
        );
    }

    #[test]
    fn test_unmarshal() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Next {
            active: bool,
            k: String,
        }

        #[derive(Debug, Deserialize, PartialEq)]
        struct Account {
            owner: String,
            balance: u64,
            meta: HashMap<String, String>,
            next: Option<Next>,
        }

        let acc: Account = account().unmarshal().unwrap();
        assert_eq!(acc.owner, OWNER);
        assert_eq!(acc.balance, 42);
        assert_eq!(acc.meta["name"], "616263");
        assert_eq!(
            acc.next,
            Some(Next {
                active: true,
                k: PUBKEY.to_string()
            })
        );
    }

    #[test]
    fn test_walk_paths() {
        let mut paths = Vec::new();
        account()
            .walk(&mut |path, _| {
                paths.push(path.to_string());
                Visit::Continue
            })
            .unwrap();
        assert_eq!(
            paths,
            vec!["owner", "balance", "meta", "meta.name", "next", "next.active", "next.k"]
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let v = Value::new(account_type(), Prim::int(1));
        assert!(matches!(v.map(), Err(ContractError::Shape(_))));
    }
}
