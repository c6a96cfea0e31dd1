//! PACK / UNPACK canonical byte form
//!
//! A packed value is the `0x05` tag followed by the binary encoding. On chain
//! `bytes` carry no type, so detection is heuristic: a tagged payload that
//! decodes cleanly, printable ASCII text, or an address-shaped blob all count
//! as packed.

use crate::address::{is_address_bytes, Address};
use crate::binary::DecodeOptions;
use crate::error::{MichelineError, Result};
use crate::prim::{Node, Prim, Visit};
use tracing::debug;

/// Leading byte of packed data
pub const PACK_TAG: u8 = 0x05;

/// Whether `b` is non-empty printable ASCII (space through `~`)
pub fn is_ascii_bytes(b: &[u8]) -> bool {
    !b.is_empty() && b.iter().all(|c| (0x20..=0x7e).contains(c))
}

/// Whether `b` is a `0x05` tagged payload holding exactly one valid tree
pub fn is_packed_bytes(b: &[u8]) -> bool {
    match b.split_first() {
        Some((&PACK_TAG, rest)) if !rest.is_empty() => Prim::from_binary(rest).is_ok(),
        _ => false,
    }
}

impl Prim {
    /// `0x05` followed by the binary encoding
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut out = vec![PACK_TAG];
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Bytes leaf that looks packed, ASCII or address shaped
    pub fn is_packed(&self) -> bool {
        match &self.node {
            Node::Bytes(b) => is_packed_bytes(b) || is_ascii_bytes(b) || is_address_bytes(b),
            _ => false,
        }
    }

    pub fn is_ascii_bytes(&self) -> bool {
        self.as_bytes().map(is_ascii_bytes).unwrap_or(false)
    }

    /// Decode a packed bytes leaf
    ///
    /// Tagged payloads decode to their tree, ASCII bytes become a string and
    /// address-shaped bytes become the address text. The result is marked
    /// `was_packed`.
    pub fn unpack(&self) -> Result<Prim> {
        self.unpack_with(DecodeOptions::default())
    }

    /// Like [`Prim::unpack`] with a nesting limit on the decoded payload
    pub fn unpack_with(&self, opts: DecodeOptions) -> Result<Prim> {
        let b = self
            .as_bytes()
            .ok_or_else(|| MichelineError::Unpack(format!("{:?} is not bytes", self.kind())))?;
        let mut out = if b.first() == Some(&PACK_TAG) && b.len() > 1 {
            Prim::from_binary_with(&b[1..], opts)?
        } else if is_ascii_bytes(b) {
            Prim::string(String::from_utf8_lossy(b).into_owned())
        } else if is_address_bytes(b) {
            Prim::string(Address::from_bytes(b)?.to_string())
        } else {
            return Err(MichelineError::Unpack("bytes are not packed".to_string()));
        };
        out.was_packed = true;
        Ok(out)
    }

    /// Unpack every packed descendant, recursing into the unpacked results
    ///
    /// Leaves that look packed but fail to decode are kept unchanged.
    pub fn unpack_all(&self) -> Prim {
        self.unpack_all_with(DecodeOptions::default())
    }

    /// Like [`Prim::unpack_all`] with one nesting budget for the whole result
    ///
    /// A packed leaf whose payload would push the tree past `max_depth` stays
    /// packed, so stacked packed layers cannot nest without bound.
    pub fn unpack_all_with(&self, opts: DecodeOptions) -> Prim {
        let mut out = self.clone();
        unpack_nested(&mut out, 0, opts.max_depth);
        out
    }

    /// Convert only printable ASCII bytes leaves to strings
    pub fn unpack_all_ascii_strings(&self) -> Prim {
        let mut out = self.clone();
        out.visit_mut(&mut |p| {
            if let Node::Bytes(b) = &p.node {
                if is_ascii_bytes(b) {
                    let mut s = Prim::string(String::from_utf8_lossy(b).into_owned());
                    s.was_packed = true;
                    *p = s;
                }
            }
            Visit::Continue
        });
        out
    }
}

fn unpack_nested(p: &mut Prim, depth: usize, max_depth: usize) {
    if p.is_packed() {
        let budget = DecodeOptions::with_max_depth(max_depth.saturating_sub(depth));
        match p.unpack_with(budget) {
            Ok(up) => *p = up,
            Err(err) => debug!(error = %err, depth, "packed bytes left as is"),
        }
    }
    if let Some(args) = p.args_mut() {
        for arg in args.iter_mut() {
            unpack_nested(arg, depth + 1, max_depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn test_pack_prefix() {
        let b = Prim::int(1).pack().unwrap();
        assert_eq!(b, vec![0x05, 0x00, 0x01]);
        assert!(Prim::from_binary(&b[1..]).is_ok());
        assert_eq!(hex::encode(Prim::string("hello").pack().unwrap()), "05010000000568656c6c6f");
    }

    #[test]
    fn test_unpack_roundtrip() {
        let orig = Prim::pair(Prim::string("hello"), Prim::some(Prim::nat(7)));
        let packed = Prim::bytes(orig.pack().unwrap());
        assert!(packed.is_packed());
        let up = packed.unpack().unwrap();
        assert!(up.was_packed);
        assert_eq!(up, orig);
    }

    #[test]
    fn test_pack_is_not_idempotent() {
        let once = Prim::unit().pack().unwrap();
        let twice = Prim::bytes(once.clone()).pack().unwrap();
        assert_ne!(once, twice);
        assert!(is_packed_bytes(&once));
    }

    #[test]
    fn test_ascii_and_address() {
        let ascii = Prim::bytes(b"abc".to_vec());
        assert!(ascii.is_packed());
        assert_eq!(ascii.unpack().unwrap().as_str(), Some("abc"));

        let addr = Prim::bytes(hex::decode("000082eea640431c731757a8b7ee226da7a784797dde").unwrap());
        assert!(addr.is_packed());
        assert_eq!(
            addr.unpack().unwrap().as_str(),
            Some("tz1XaLRi6i8qNDa4KyNjQcxFvFDDs8xi7nr1")
        );
    }

    #[test]
    fn test_unpack_errors() {
        let p = Prim::bytes(vec![0x00, 0x01]);
        assert!(!p.is_packed());
        assert!(p.unpack().is_err());
        assert!(Prim::bytes(vec![0x05, 0x0a]).unpack().is_err());
        assert!(!Prim::bytes(vec![0x05, 0x0a]).is_packed());
        assert!(Prim::bytes(vec![0x05, 0xff]).unpack().is_err());
        assert!(Prim::int(5).unpack().is_err());
        assert!(!Prim::bytes(vec![]).is_packed());
    }

    #[test]
    fn test_unpack_all_nested() {
        let inner = Prim::bytes(Prim::string("deep").pack().unwrap());
        let outer = Prim::bytes(Prim::some(inner).pack().unwrap());
        let tree = Prim::pair(outer, Prim::bytes(vec![0xff, 0x00]));
        let up = tree.unpack_all();
        assert_eq!(up.dump(), r#"Pair (Some "deep") 0xff00"#);
    }

    /// `layers` packed levels, each wrapping the previous one in `wrap` options
    fn stacked(layers: usize, wrap: usize) -> Prim {
        let mut payload = Prim::string("core").pack().unwrap();
        for _ in 0..layers {
            let mut p = Prim::bytes(payload);
            for _ in 0..wrap {
                p = Prim::some(p);
            }
            payload = p.pack().unwrap();
        }
        Prim::bytes(payload)
    }

    /// Number of `Some` wrappers above the innermost leaf
    fn leaf(p: &Prim) -> (usize, &Prim) {
        let mut cur = p;
        let mut n = 0;
        while let Some(next) = cur.arg(0) {
            cur = next;
            n += 1;
        }
        (n, cur)
    }

    #[test]
    fn test_unpack_all_follows_layers_within_budget() {
        let up = stacked(3, 40).unpack_all();
        let (n, inner) = leaf(&up);
        assert_eq!(n, 120);
        assert_eq!(inner.as_str(), Some("core"));
    }

    #[test]
    fn test_unpack_all_stops_at_depth_budget() {
        let up = stacked(3, 40).unpack_all_with(DecodeOptions::with_max_depth(100));
        let (n, inner) = leaf(&up);
        assert_eq!(n, 80);
        assert!(is_packed_bytes(inner.as_bytes().unwrap()));
    }

    #[test]
    fn test_unpack_all_stacked_layers_do_not_overflow() {
        let up = stacked(400, 200).unpack_all();
        let (n, inner) = leaf(&up);
        assert!(n <= crate::binary::DEFAULT_MAX_DEPTH);
        assert!(inner.as_bytes().is_some());
    }

    #[test]
    fn test_unpack_all_ascii_strings() {
        let p = Prim::pair(Prim::bytes(b"ascii".to_vec()), Prim::bytes(vec![0xff, 0x00]));
        let up = p.unpack_all_ascii_strings();
        assert_eq!(up.arg(0).and_then(Prim::as_str), Some("ascii"));
        assert!(up.arg(1).and_then(Prim::as_bytes).is_some());
        assert!(up.is_op(OpCode::Pair));
    }
}
