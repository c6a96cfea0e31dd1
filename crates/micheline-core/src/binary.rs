//! Binary Micheline codec
//!
//! Tag-byte-first encoding of [`Prim`] trees as used on chain: literals and
//! sequences carry 4-byte big-endian length prefixes, integers use the
//! zarith sign-magnitude varint, and applications are tagged by arity class.
//!
//! The decoder works on a bounds-checked cursor and reports every malformed
//! input as an error, including truncation, unknown tags, non-canonical
//! integers and nesting deeper than [`DecodeOptions::max_depth`].

use crate::error::{MichelineError, Result};
use crate::opcode::OpCode;
use crate::prim::{App, Node, Prim, PrimKind};
use num_bigint::{BigInt, BigUint, Sign};

pub const TAG_INT: u8 = 0x00;
pub const TAG_STRING: u8 = 0x01;
pub const TAG_SEQUENCE: u8 = 0x02;
pub const TAG_PRIM_0: u8 = 0x03;
pub const TAG_PRIM_0_ANNO: u8 = 0x04;
pub const TAG_PRIM_1: u8 = 0x05;
pub const TAG_PRIM_1_ANNO: u8 = 0x06;
pub const TAG_PRIM_2: u8 = 0x07;
pub const TAG_PRIM_2_ANNO: u8 = 0x08;
pub const TAG_PRIM_N: u8 = 0x09;
pub const TAG_BYTES: u8 = 0x0a;

/// Default nesting limit for decoders
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Decoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Maximum nesting depth of sequences and applications
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

/// Bounds-checked read cursor over a byte slice
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    opts: DecodeOptions,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_options(buf, DecodeOptions::default())
    }

    pub fn with_options(buf: &'a [u8], opts: DecodeOptions) -> Self {
        Self { buf, pos: 0, opts }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(MichelineError::ShortBuffer);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a 4-byte length prefix and return a sub-reader over that many bytes
    pub fn sized(&mut self) -> Result<Reader<'a>> {
        let len = self.read_u32()? as usize;
        if self.remaining() < len {
            return Err(MichelineError::InvalidLength(format!(
                "declared {} bytes but only {} remain",
                len,
                self.remaining()
            )));
        }
        let inner = self.take(len)?;
        Ok(Reader::with_options(inner, self.opts))
    }

    /// Decode one Micheline node
    pub fn read_prim(&mut self) -> Result<Prim> {
        self.prim_at(0)
    }

    fn prim_at(&mut self, depth: usize) -> Result<Prim> {
        if depth > self.opts.max_depth {
            return Err(MichelineError::DepthExceeded(self.opts.max_depth));
        }
        let tag = self.read_u8()?;
        let node = match tag {
            TAG_INT => Node::Int(self.read_zarith()?),
            TAG_STRING => {
                let raw = self.sized()?.take_rest();
                let s = std::str::from_utf8(raw).map_err(|_| MichelineError::InvalidString)?;
                Node::String(s.to_string())
            }
            TAG_BYTES => Node::Bytes(self.sized()?.take_rest().to_vec()),
            TAG_SEQUENCE => {
                let mut inner = self.sized()?;
                let mut items = Vec::new();
                while !inner.is_empty() {
                    items.push(inner.prim_at(depth + 1)?);
                }
                Node::Seq(items)
            }
            TAG_PRIM_0..=TAG_PRIM_2_ANNO => {
                let op = OpCode::try_from(self.read_u8()?)?;
                let arity = ((tag - TAG_PRIM_0) / 2) as usize;
                let annotated = (tag - TAG_PRIM_0) % 2 == 1;
                let mut args = Vec::with_capacity(arity);
                for _ in 0..arity {
                    args.push(self.prim_at(depth + 1)?);
                }
                let annots = if annotated {
                    let annots = self.read_annots()?;
                    if annots.is_empty() {
                        return Err(MichelineError::InvalidAnnotation(
                            "empty annotation list in annotated node".to_string(),
                        ));
                    }
                    annots
                } else {
                    Vec::new()
                };
                Node::App(App {
                    op,
                    args,
                    annots,
                    generic: false,
                })
            }
            TAG_PRIM_N => {
                let op = OpCode::try_from(self.read_u8()?)?;
                let mut inner = self.sized()?;
                let mut args = Vec::new();
                while !inner.is_empty() {
                    args.push(inner.prim_at(depth + 1)?);
                }
                let annots = self.read_annots()?;
                Node::App(App {
                    op,
                    args,
                    annots,
                    generic: true,
                })
            }
            other => return Err(MichelineError::InvalidTag(other)),
        };
        Ok(node.into())
    }

    fn take_rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn read_annots(&mut self) -> Result<Vec<String>> {
        let raw = self.sized()?.take_rest();
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let text = std::str::from_utf8(raw)
            .map_err(|_| MichelineError::InvalidAnnotation("not valid utf-8".to_string()))?;
        text.split(' ')
            .map(|a| {
                if a.is_empty() {
                    Err(MichelineError::InvalidAnnotation(format!("{:?}", text)))
                } else {
                    Ok(a.to_string())
                }
            })
            .collect()
    }

    /// Zarith integer: the first byte holds a continuation bit, a sign bit and
    /// six magnitude bits; each following byte holds a continuation bit and
    /// seven magnitude bits, least significant group first.
    pub fn read_zarith(&mut self) -> Result<BigInt> {
        let first = self.read_u8()?;
        let negative = first & 0x40 != 0;
        let mut groups = Vec::new();
        let mut more = first & 0x80 != 0;
        while more {
            let b = self.read_u8()?;
            more = b & 0x80 != 0;
            if !more && b == 0 {
                return Err(MichelineError::InvalidInteger(
                    "trailing zero byte".to_string(),
                ));
            }
            groups.push(b & 0x7f);
        }
        let high = if groups.is_empty() {
            BigUint::default()
        } else {
            BigUint::from_radix_le(&groups, 128)
                .ok_or_else(|| MichelineError::InvalidInteger("bad digit group".to_string()))?
        };
        let mag = (high << 6usize) | BigUint::from(first & 0x3f);
        if negative && mag.bits() == 0 {
            return Err(MichelineError::InvalidInteger("negative zero".to_string()));
        }
        let sign = if negative { Sign::Minus } else { Sign::Plus };
        Ok(BigInt::from_biguint(sign, mag))
    }
}

/// Append the zarith encoding of `v` to `out`
pub fn write_zarith(out: &mut Vec<u8>, v: &BigInt) {
    let mag = v.magnitude();
    let low = mag.iter_u64_digits().next().unwrap_or(0);
    let mut first = (low & 0x3f) as u8;
    if v.sign() == Sign::Minus {
        first |= 0x40;
    }
    let high = mag >> 6usize;
    if high.bits() == 0 {
        out.push(first);
        return;
    }
    out.push(first | 0x80);
    let groups = high.to_radix_le(128);
    let last = groups.len() - 1;
    for (i, g) in groups.into_iter().enumerate() {
        out.push(if i < last { g | 0x80 } else { g });
    }
}

fn write_u32(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| MichelineError::InvalidLength(format!("{} exceeds u32", len)))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Append a 4-byte length prefix and the payload
pub fn write_sized(out: &mut Vec<u8>, payload: &[u8]) -> Result<()> {
    write_u32(out, payload.len())?;
    out.extend_from_slice(payload);
    Ok(())
}

fn write_annots(out: &mut Vec<u8>, annots: &[String]) -> Result<()> {
    if let Some(bad) = annots.iter().find(|a| a.is_empty() || a.contains(' ')) {
        return Err(MichelineError::InvalidAnnotation(format!("{:?}", bad)));
    }
    write_sized(out, annots.join(" ").as_bytes())
}

impl Prim {
    /// Decode a complete binary tree, rejecting trailing bytes
    pub fn from_binary(data: &[u8]) -> Result<Prim> {
        Prim::from_binary_with(data, DecodeOptions::default())
    }

    pub fn from_binary_with(data: &[u8], opts: DecodeOptions) -> Result<Prim> {
        let mut reader = Reader::with_options(data, opts);
        let prim = reader.read_prim()?;
        if !reader.is_empty() {
            return Err(MichelineError::TrailingBytes(reader.remaining()));
        }
        Ok(prim)
    }

    /// Decode a tree from the front of `data`, returning it with the number of bytes read
    pub fn decode_prefix(data: &[u8]) -> Result<(Prim, usize)> {
        let mut reader = Reader::new(data);
        let prim = reader.read_prim()?;
        Ok((prim, reader.position()))
    }

    /// Binary encoding of this tree
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Append the binary encoding of this tree to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let kind = self.kind();
        out.push(kind.tag());
        match &self.node {
            Node::Int(v) => write_zarith(out, v),
            Node::String(s) => write_sized(out, s.as_bytes())?,
            Node::Bytes(b) => write_sized(out, b)?,
            Node::Seq(items) => {
                let mut inner = Vec::new();
                for item in items {
                    item.encode_into(&mut inner)?;
                }
                write_sized(out, &inner)?;
            }
            Node::App(app) => {
                out.push(app.op.byte());
                if matches!(kind, PrimKind::Variadic | PrimKind::VariadicAnno) {
                    let mut inner = Vec::new();
                    for arg in &app.args {
                        arg.encode_into(&mut inner)?;
                    }
                    write_sized(out, &inner)?;
                    write_annots(out, &app.annots)?;
                } else {
                    for arg in &app.args {
                        arg.encode_into(out)?;
                    }
                    if kind.is_annotated() {
                        write_annots(out, &app.annots)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zarith(v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_zarith(&mut out, &BigInt::from(v));
        out
    }

    #[test]
    fn test_zarith_vectors() {
        assert_eq!(zarith(0), vec![0x00]);
        assert_eq!(zarith(1), vec![0x01]);
        assert_eq!(zarith(-1), vec![0x41]);
        assert_eq!(zarith(63), vec![0x3f]);
        assert_eq!(zarith(64), vec![0x80, 0x01]);
        assert_eq!(zarith(-64), vec![0xc0, 0x01]);
        assert_eq!(zarith(42), vec![0x2a]);
        assert_eq!(zarith(1000), vec![0xa8, 0x0f]);
    }

    #[test]
    fn test_zarith_decode() {
        for v in [0i64, 1, -1, 63, 64, -64, 1000, i64::MAX, i64::MIN + 1] {
            let enc = zarith(v);
            let mut r = Reader::new(&enc);
            assert_eq!(r.read_zarith().unwrap(), BigInt::from(v));
            assert!(r.is_empty());
        }
    }

    #[test]
    fn test_zarith_rejects_non_canonical() {
        assert!(Reader::new(&[0x80, 0x00]).read_zarith().is_err());
        assert!(Reader::new(&[0x40]).read_zarith().is_err());
        assert_eq!(
            Reader::new(&[0x80]).read_zarith().unwrap_err(),
            MichelineError::ShortBuffer
        );
    }

    #[test]
    fn test_long_zarith_roundtrip() {
        let mut enc = vec![TAG_INT, 0xff];
        enc.extend(std::iter::repeat(0xff).take(100_000));
        enc.push(0x01);
        let p = Prim::from_binary(&enc).unwrap();
        let v = p.as_int().unwrap();
        assert_eq!(v.sign(), Sign::Minus);
        assert_eq!(v.magnitude().bits(), 6 + 7 * 100_000 + 1);
        assert_eq!(p.to_binary().unwrap(), enc);
    }

    #[test]
    fn test_encode_known_bytes() {
        let p = Prim::pair(Prim::int(1), Prim::string("a"));
        assert_eq!(
            hex::encode(p.to_binary().unwrap()),
            "07070001010000000161"
        );
        let annotated = Prim::prim0(OpCode::nat).with_annot("%x");
        assert_eq!(hex::encode(annotated.to_binary().unwrap()), "0462000000022578");
        let seq = Prim::seq(vec![Prim::prim0(OpCode::UNIT)]);
        assert_eq!(hex::encode(seq.to_binary().unwrap()), "0200000002034f");
    }

    #[test]
    fn test_variadic_roundtrip() {
        let p = Prim::app(OpCode::Pair, vec![Prim::int(1), Prim::int(2), Prim::int(3)])
            .with_annot("%p");
        let enc = p.to_binary().unwrap();
        assert_eq!(enc[0], TAG_PRIM_N);
        let back = Prim::from_binary(&enc).unwrap();
        assert!(back.is_equal_with_anno(&p));
        assert_eq!(back.to_binary().unwrap(), enc);
    }

    #[test]
    fn test_generic_tag_with_two_args_is_preserved() {
        // Pair 1 2 encoded with the generic tag
        let enc = hex::decode("0907000000040001000200000000").unwrap();
        let p = Prim::from_binary(&enc).unwrap();
        assert_eq!(p.kind(), PrimKind::Variadic);
        assert_eq!(p.to_binary().unwrap(), enc);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Prim::from_binary(&[]).unwrap_err(), MichelineError::ShortBuffer);
        assert_eq!(Prim::from_binary(&[0x0b]).unwrap_err(), MichelineError::InvalidTag(0x0b));
        assert_eq!(
            Prim::from_binary(&[0x03, 0xff]).unwrap_err(),
            MichelineError::UnknownOpcode(0xff)
        );
        assert!(Prim::from_binary(&[0x01, 0x00, 0x00, 0x00, 0x05, b'a']).is_err());
        assert!(Prim::from_binary(&[0x02, 0x00, 0x00, 0x00, 0x02, 0x03]).is_err());
        assert_eq!(
            Prim::from_binary(&[0x00, 0x01, 0x00]).unwrap_err(),
            MichelineError::TrailingBytes(1)
        );
        // annotated tag with an empty annotation blob
        assert!(Prim::from_binary(&[0x04, 0x62, 0x00, 0x00, 0x00, 0x00]).is_err());
        // double space inside annotations
        assert!(Prim::from_binary(&[0x04, 0x62, 0x00, 0x00, 0x00, 0x04, b'%', b' ', b' ', b'%']).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut p = Prim::unit();
        for _ in 0..20 {
            p = Prim::some(p);
        }
        let enc = p.to_binary().unwrap();
        assert!(Prim::from_binary_with(&enc, DecodeOptions::with_max_depth(25)).is_ok());
        assert_eq!(
            Prim::from_binary_with(&enc, DecodeOptions::with_max_depth(10)).unwrap_err(),
            MichelineError::DepthExceeded(10)
        );
    }

    #[test]
    fn test_decode_prefix() {
        let mut enc = Prim::int(5).to_binary().unwrap();
        enc.extend_from_slice(&[0xaa, 0xbb]);
        let (p, n) = Prim::decode_prefix(&enc).unwrap();
        assert_eq!(p, Prim::int(5));
        assert_eq!(n, 2);
    }
}
