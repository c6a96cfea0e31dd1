//! Integration tests for the Micheline codecs
//!
//! Fixtures are type/value/key triples taken from contract storage, call
//! parameters and big-map entries, each stored both as Micheline JSON and as
//! binary hex.

use micheline_core::{OpCode, Prim, PrimKind, Type};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    category: String,
    #[serde(rename = "type")]
    typ: Value,
    type_hex: String,
    value: Value,
    value_hex: String,
    key: Option<Value>,
    key_hex: Option<String>,
    entrypoint: Option<String>,
}

/// Load the codec fixture corpus
fn load_fixtures() -> Vec<Fixture> {
    let content = include_str!("data/fixtures.json");
    serde_json::from_str(content).expect("Failed to parse codec fixtures")
}

/// Decode hex and JSON forms and check they describe the same tree
fn check_pair(name: &str, json: &Value, hex_text: &str) -> Prim {
    let raw = hex::decode(hex_text).expect("fixture hex");
    let from_bin = Prim::from_binary(&raw).unwrap_or_else(|e| panic!("{}: binary: {}", name, e));
    let from_json =
        Prim::from_json_value(json).unwrap_or_else(|e| panic!("{}: json: {}", name, e));
    assert!(
        from_bin.is_equal_with_anno(&from_json),
        "{}: binary and json differ\n{}\n{}",
        name,
        from_bin.dump(),
        from_json.dump()
    );
    // byte exact re-encoding
    assert_eq!(hex::encode(from_bin.to_binary().unwrap()), hex_text, "{}", name);
    assert_eq!(&from_json.to_json_value(), json, "{}", name);
    from_bin
}

/// Every fixture decodes from both encodings and re-encodes unchanged
#[test]
fn test_fixture_roundtrips() {
    let fixtures = load_fixtures();
    assert!(!fixtures.is_empty());
    for cat in ["storage", "params", "bigmap"] {
        assert!(fixtures.iter().any(|f| f.category == cat), "missing category {}", cat);
    }
    for f in &fixtures {
        check_pair(&f.name, &f.typ, &f.type_hex);
        check_pair(&f.name, &f.value, &f.value_hex);
        if let (Some(key), Some(key_hex)) = (&f.key, &f.key_hex) {
            check_pair(&f.name, key, key_hex);
        }
    }
}

/// Types survive the binary round trip with annotations intact
#[test]
fn test_type_binary_roundtrip() {
    for f in load_fixtures() {
        let t = Type::from_binary(&hex::decode(&f.type_hex).unwrap()).unwrap();
        let again = Type::from_binary(&t.to_binary().unwrap()).unwrap();
        assert!(t.is_equal_with_anno(&again), "{}", f.name);
        assert_eq!(t.hash64().unwrap(), again.hash64().unwrap());
    }
}

/// Packed big-map keys and values unpack to readable data
#[test]
fn test_packed_bigmap_entry() {
    let fixtures = load_fixtures();
    let f = fixtures.iter().find(|f| f.name == "packed-bytes").unwrap();
    let key = Prim::from_json_value(f.key.as_ref().unwrap()).unwrap();
    assert!(key.is_packed());
    let k = key.unpack().unwrap();
    assert!(k.was_packed);
    assert_eq!(k.as_str(), Some("paused"));

    let value = Prim::from_binary(&hex::decode(&f.value_hex).unwrap()).unwrap();
    let v = value.unpack_all();
    assert!(v.is_op(OpCode::True));
}

/// Address shaped keys unpack to their text form
#[test]
fn test_address_key_unpacks() {
    let fixtures = load_fixtures();
    let f = fixtures.iter().find(|f| f.name == "address-key").unwrap();
    let key = Prim::from_binary(&hex::decode(f.key_hex.as_ref().unwrap()).unwrap()).unwrap();
    assert_eq!(
        key.unpack().unwrap().as_str(),
        Some("tz1XaLRi6i8qNDa4KyNjQcxFvFDDs8xi7nr1")
    );
}

/// Large negative integers keep every digit through both codecs
#[test]
fn test_big_integer_fixture() {
    let fixtures = load_fixtures();
    let f = fixtures.iter().find(|f| f.name == "lambda-storage").unwrap();
    let v = Prim::from_binary(&hex::decode(&f.value_hex).unwrap()).unwrap();
    assert_eq!(
        v.arg(0).and_then(Prim::as_int).map(|n| n.to_string()).as_deref(),
        Some("-123456789012345678901234567890")
    );
}

/// Variadic pairs keep the generic tag and unfold to the same comb
#[test]
fn test_variadic_pair_fixture() {
    let fixtures = load_fixtures();
    let f = fixtures.iter().find(|f| f.name == "variadic-pair").unwrap();
    let v = Prim::from_binary(&hex::decode(&f.value_hex).unwrap()).unwrap();
    assert_eq!(v.args().len(), 3);
    let comb = Prim::comb(vec![Prim::int(1), Prim::int(2), Prim::int(3)]);
    assert!(v.unfold_pairs().is_equal(&comb));
    assert_eq!(v.flatten_pairs().len(), 3);
}

/// `Left`/`Right` wrappers in call parameters lead to the named entrypoint
#[test]
fn test_or_params_select_entrypoint() {
    let mut checked = 0;
    for f in load_fixtures().iter().filter(|f| f.category == "params") {
        let Some(name) = &f.entrypoint else { continue };
        let typ = Type::from_json(f.typ.to_string().as_bytes()).unwrap();
        let mut t = typ.prim().clone();
        let mut v = Prim::from_binary(&hex::decode(&f.value_hex).unwrap()).unwrap();
        let mut path = String::new();
        while t.label().is_none() {
            let side = match v.op() {
                Some(OpCode::Left) => 0,
                Some(OpCode::Right) => 1,
                _ => break,
            };
            path.push(if side == 0 { 'L' } else { 'R' });
            t = t.arg(side).unwrap().clone();
            v = v.arg(0).unwrap().clone();
        }
        assert_eq!(t.label(), Some(name.as_str()), "{}", f.name);
        assert_eq!(typ.resolve_entrypoint_path(name), Some(path), "{}", f.name);
        checked += 1;
    }
    assert!(checked >= 6);
}

/// Big-map keys span every literal kind and pack to distinct payloads
#[test]
fn test_bigmap_key_kinds() {
    let keys: Vec<Prim> = load_fixtures()
        .iter()
        .filter(|f| f.category == "bigmap")
        .map(|f| Prim::from_binary(&hex::decode(f.key_hex.as_ref().unwrap()).unwrap()).unwrap())
        .collect();
    for kind in [PrimKind::Int, PrimKind::String, PrimKind::Bytes, PrimKind::Nullary, PrimKind::Binary] {
        assert!(keys.iter().any(|k| k.kind() == kind), "no {:?} key", kind);
    }
    let mut packed: Vec<Vec<u8>> = keys.iter().map(|k| k.pack().unwrap()).collect();
    packed.sort();
    packed.dedup();
    assert_eq!(packed.len(), keys.len());
}
