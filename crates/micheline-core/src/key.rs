//! Public keys and signatures
//!
//! Both appear in Micheline values either as base58-check strings or as raw
//! bytes. Keys carry a one-byte curve tag in binary form; signatures are raw
//! 64 or 96 byte blobs without a tag.

use crate::address::{decode_check, encode_check};
use crate::error::{MichelineError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Signing curve of a public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Ed25519,
    Secp256k1,
    P256,
    Bls12_381,
}

impl KeyType {
    const ALL: [KeyType; 4] = [
        KeyType::Ed25519,
        KeyType::Secp256k1,
        KeyType::P256,
        KeyType::Bls12_381,
    ];

    /// Binary tag byte
    pub fn tag(self) -> u8 {
        match self {
            KeyType::Ed25519 => 0,
            KeyType::Secp256k1 => 1,
            KeyType::P256 => 2,
            KeyType::Bls12_381 => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        KeyType::ALL
            .iter()
            .copied()
            .find(|k| k.tag() == tag)
            .ok_or(MichelineError::InvalidTag(tag))
    }

    /// Length of the key material
    pub fn key_len(self) -> usize {
        match self {
            KeyType::Ed25519 => 32,
            KeyType::Secp256k1 | KeyType::P256 => 33,
            KeyType::Bls12_381 => 48,
        }
    }

    fn prefix(self) -> &'static [u8] {
        match self {
            KeyType::Ed25519 => &[13, 15, 37, 217],
            KeyType::Secp256k1 => &[3, 254, 226, 86],
            KeyType::P256 => &[3, 178, 139, 127],
            KeyType::Bls12_381 => &[6, 149, 135, 204],
        }
    }

    fn text_prefix(self) -> &'static str {
        match self {
            KeyType::Ed25519 => "edpk",
            KeyType::Secp256k1 => "sppk",
            KeyType::P256 => "p2pk",
            KeyType::Bls12_381 => "BLpk",
        }
    }
}

/// A public key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub typ: KeyType,
    pub data: Vec<u8>,
}

impl Key {
    pub fn new(typ: KeyType, data: Vec<u8>) -> Result<Self> {
        if data.len() != typ.key_len() {
            return Err(MichelineError::InvalidLength(format!(
                "{:?} key must be {} bytes, got {}",
                typ,
                typ.key_len(),
                data.len()
            )));
        }
        Ok(Self { typ, data })
    }

    /// Decode the tagged binary form `<curve> <key>`
    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        let (tag, data) = b.split_first().ok_or(MichelineError::ShortBuffer)?;
        Key::new(KeyType::from_tag(*tag)?, data.to_vec())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.typ.tag());
        out.extend_from_slice(&self.data);
        out
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_check(self.typ.prefix(), &self.data))
    }
}

impl FromStr for Key {
    type Err = MichelineError;

    fn from_str(s: &str) -> Result<Self> {
        let typ = KeyType::ALL
            .iter()
            .copied()
            .find(|t| s.starts_with(t.text_prefix()))
            .ok_or_else(|| MichelineError::Base58(format!("unknown key prefix in {}", s)))?;
        Key::new(typ, decode_check(typ.prefix(), s)?)
    }
}

/// Signature scheme; `Generic` covers 64-byte signatures of unknown curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureType {
    Ed25519,
    Secp256k1,
    P256,
    Generic,
    Bls12_381,
}

impl SignatureType {
    // generic `sig` goes last so curve specific prefixes win
    const ALL: [SignatureType; 5] = [
        SignatureType::Ed25519,
        SignatureType::Secp256k1,
        SignatureType::P256,
        SignatureType::Bls12_381,
        SignatureType::Generic,
    ];

    pub fn sig_len(self) -> usize {
        match self {
            SignatureType::Bls12_381 => 96,
            _ => 64,
        }
    }

    fn prefix(self) -> &'static [u8] {
        match self {
            SignatureType::Ed25519 => &[9, 245, 205, 134, 18],
            SignatureType::Secp256k1 => &[13, 115, 101, 19, 63],
            SignatureType::P256 => &[54, 240, 44, 52],
            SignatureType::Generic => &[4, 130, 43],
            SignatureType::Bls12_381 => &[40, 171, 64, 207],
        }
    }

    fn text_prefix(self) -> &'static str {
        match self {
            SignatureType::Ed25519 => "edsig",
            SignatureType::Secp256k1 => "spsig1",
            SignatureType::P256 => "p2sig",
            SignatureType::Generic => "sig",
            SignatureType::Bls12_381 => "BLsig",
        }
    }
}

/// A detached signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub typ: SignatureType,
    pub data: Vec<u8>,
}

impl Signature {
    /// Raw bytes carry no curve, so 64 bytes are generic and 96 are BLS
    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        let typ = match b.len() {
            64 => SignatureType::Generic,
            96 => SignatureType::Bls12_381,
            n => {
                return Err(MichelineError::InvalidLength(format!(
                    "signature must be 64 or 96 bytes, got {}",
                    n
                )))
            }
        };
        Ok(Self {
            typ,
            data: b.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_check(self.typ.prefix(), &self.data))
    }
}

impl FromStr for Signature {
    type Err = MichelineError;

    fn from_str(s: &str) -> Result<Self> {
        let typ = SignatureType::ALL
            .iter()
            .copied()
            .find(|t| s.starts_with(t.text_prefix()))
            .ok_or_else(|| {
                MichelineError::Base58(format!("unknown signature prefix in {}", s))
            })?;
        let data = decode_check(typ.prefix(), s)?;
        if data.len() != typ.sig_len() {
            return Err(MichelineError::InvalidLength(format!(
                "signature payload in {}",
                s
            )));
        }
        Ok(Self { typ, data })
    }
}

macro_rules! serde_as_text {
    ($($ty:ty),*) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                    serializer.collect_str(self)
                }
            }

            impl<'de> Deserialize<'de> for $ty {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                }
            }
        )*
    };
}

serde_as_text!(Key, Signature);
