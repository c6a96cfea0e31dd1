//! Chain addresses and base58-check text encoding
//!
//! Addresses are embedded in Micheline values as 22 raw bytes. The text form
//! (`tz1..`, `KT1..`) is only produced for display, map-key naming and
//! unpacking of address-shaped bytes.

use crate::error::{MichelineError, Result};
use base58::{FromBase58, ToBase58};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of an address in its binary (Micheline) form
pub const ADDRESS_BYTES: usize = 22;
/// Length of an address hash
pub const HASH_BYTES: usize = 20;

const CHECKSUM_BYTES: usize = 4;

/// Base58-check encode `payload` behind a version `prefix`
pub fn encode_check(prefix: &[u8], payload: &[u8]) -> String {
    let mut buf = Vec::with_capacity(prefix.len() + payload.len() + CHECKSUM_BYTES);
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(payload);
    let sum = checksum(&buf);
    buf.extend_from_slice(&sum);
    buf.to_base58()
}

/// Decode base58-check text, verify its checksum and strip `prefix`
pub fn decode_check(prefix: &[u8], text: &str) -> Result<Vec<u8>> {
    let raw = text
        .from_base58()
        .map_err(|e| MichelineError::Base58(format!("{:?}", e)))?;
    if raw.len() < prefix.len() + CHECKSUM_BYTES {
        return Err(MichelineError::Base58(format!("{} is too short", text)));
    }
    let (body, sum) = raw.split_at(raw.len() - CHECKSUM_BYTES);
    if checksum(body)[..] != *sum {
        return Err(MichelineError::Base58(format!("bad checksum in {}", text)));
    }
    body.strip_prefix(prefix)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| MichelineError::Base58(format!("unexpected prefix in {}", text)))
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_BYTES] {
    let digest = Sha256::digest(Sha256::digest(data));
    let mut out = [0u8; CHECKSUM_BYTES];
    out.copy_from_slice(&digest[..CHECKSUM_BYTES]);
    out
}

/// Account and contract address classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressType {
    /// Implicit account, `tz1`
    Ed25519,
    /// Implicit account, `tz2`
    Secp256k1,
    /// Implicit account, `tz3`
    P256,
    /// Implicit account, `tz4`
    Bls12_381,
    /// Originated contract, `KT1`
    Contract,
    /// Transaction rollup, `txr1`
    TxRollup,
    /// Smart rollup, `sr1`
    SmartRollup,
}

impl AddressType {
    const ALL: [AddressType; 7] = [
        AddressType::Ed25519,
        AddressType::Secp256k1,
        AddressType::P256,
        AddressType::Bls12_381,
        AddressType::Contract,
        AddressType::TxRollup,
        AddressType::SmartRollup,
    ];

    pub fn prefix(self) -> &'static [u8] {
        match self {
            AddressType::Ed25519 => &[6, 161, 159],
            AddressType::Secp256k1 => &[6, 161, 161],
            AddressType::P256 => &[6, 161, 164],
            AddressType::Bls12_381 => &[6, 161, 166],
            AddressType::Contract => &[2, 90, 121],
            AddressType::TxRollup => &[1, 128, 120, 31],
            AddressType::SmartRollup => &[6, 124, 117],
        }
    }

    /// Leading characters of the text form
    pub fn text_prefix(self) -> &'static str {
        match self {
            AddressType::Ed25519 => "tz1",
            AddressType::Secp256k1 => "tz2",
            AddressType::P256 => "tz3",
            AddressType::Bls12_381 => "tz4",
            AddressType::Contract => "KT1",
            AddressType::TxRollup => "txr1",
            AddressType::SmartRollup => "sr1",
        }
    }

    pub fn is_implicit(self) -> bool {
        matches!(
            self,
            AddressType::Ed25519
                | AddressType::Secp256k1
                | AddressType::P256
                | AddressType::Bls12_381
        )
    }

    fn implicit_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AddressType::Ed25519),
            1 => Some(AddressType::Secp256k1),
            2 => Some(AddressType::P256),
            3 => Some(AddressType::Bls12_381),
            _ => None,
        }
    }
}

/// A 20-byte account or contract hash with its class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub typ: AddressType,
    pub hash: [u8; HASH_BYTES],
}

impl Address {
    pub fn new(typ: AddressType, hash: [u8; HASH_BYTES]) -> Self {
        Self { typ, hash }
    }

    /// Decode the 22-byte binary form
    ///
    /// Implicit accounts are `0x00 <curve> <hash>`, originated contracts and
    /// rollups are `<class> <hash> 0x00`.
    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        if b.len() != ADDRESS_BYTES {
            return Err(MichelineError::InvalidLength(format!(
                "address must be {} bytes, got {}",
                ADDRESS_BYTES,
                b.len()
            )));
        }
        let (typ, hash) = match b[0] {
            0x00 => {
                let typ = AddressType::implicit_tag(b[1]).ok_or_else(|| {
                    MichelineError::InvalidTag(b[1])
                })?;
                (typ, &b[2..])
            }
            class @ 0x01..=0x03 if b[21] == 0 => {
                let typ = match class {
                    0x01 => AddressType::Contract,
                    0x02 => AddressType::TxRollup,
                    _ => AddressType::SmartRollup,
                };
                (typ, &b[1..21])
            }
            other => return Err(MichelineError::InvalidTag(other)),
        };
        let mut out = [0u8; HASH_BYTES];
        out.copy_from_slice(hash);
        Ok(Address::new(typ, out))
    }

    /// Decode the 21-byte `key_hash` form `<curve> <hash>`
    pub fn from_key_hash_bytes(b: &[u8]) -> Result<Self> {
        let mut buf = Vec::with_capacity(ADDRESS_BYTES);
        buf.push(0x00);
        buf.extend_from_slice(b);
        Address::from_bytes(&buf)
    }

    /// Encode to the 22-byte binary form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ADDRESS_BYTES);
        let curve = match self.typ {
            AddressType::Ed25519 => Some(0u8),
            AddressType::Secp256k1 => Some(1),
            AddressType::P256 => Some(2),
            AddressType::Bls12_381 => Some(3),
            _ => None,
        };
        match curve {
            Some(curve) => {
                out.push(0x00);
                out.push(curve);
                out.extend_from_slice(&self.hash);
            }
            None => {
                out.push(match self.typ {
                    AddressType::Contract => 0x01,
                    AddressType::TxRollup => 0x02,
                    _ => 0x03,
                });
                out.extend_from_slice(&self.hash);
                out.push(0x00);
            }
        }
        out
    }

    pub fn is_contract(&self) -> bool {
        self.typ == AddressType::Contract
    }
}

/// Whether `b` has the exact binary shape of an address
pub fn is_address_bytes(b: &[u8]) -> bool {
    Address::from_bytes(b).is_ok()
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_check(self.typ.prefix(), &self.hash))
    }
}

impl FromStr for Address {
    type Err = MichelineError;

    fn from_str(s: &str) -> Result<Self> {
        let typ = AddressType::ALL
            .iter()
            .copied()
            .find(|t| s.starts_with(t.text_prefix()))
            .ok_or_else(|| MichelineError::Base58(format!("unknown address prefix in {}", s)))?;
        let hash = decode_check(typ.prefix(), s)?;
        let hash: [u8; HASH_BYTES] = hash.try_into().map_err(|_| {
            MichelineError::InvalidLength(format!("address hash in {}", s))
        })?;
        Ok(Address::new(typ, hash))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TZ1_HEX: &str = "000082eea640431c731757a8b7ee226da7a784797dde";
    const TZ1: &str = "tz1XaLRi6i8qNDa4KyNjQcxFvFDDs8xi7nr1";

    #[test]
    fn test_implicit_address() {
        let a = Address::from_bytes(&hex::decode(TZ1_HEX).unwrap()).unwrap();
        assert_eq!(a.typ, AddressType::Ed25519);
        assert_eq!(a.to_string(), TZ1);
        assert_eq!(hex::encode(a.to_bytes()), TZ1_HEX);
        assert_eq!(TZ1.parse::<Address>().unwrap(), a);
    }

    #[test]
    fn test_contract_address() {
        let hash = hex::decode("82eea640431c731757a8b7ee226da7a784797dde").unwrap();
        let mut raw = vec![0x01];
        raw.extend_from_slice(&hash);
        raw.push(0x00);
        let a = Address::from_bytes(&raw).unwrap();
        assert!(a.is_contract());
        assert_eq!(a.to_string(), "KT1LX5JMaa1NT9n9WsgVSyeGkoYqbgj7yZx5");
        assert_eq!(a.to_bytes(), raw);

        raw[21] = 0x01;
        assert!(Address::from_bytes(&raw).is_err());
    }

    #[test]
    fn test_other_classes() {
        for (text, typ) in [
            ("tz2LFYPvhHZCHyCvc9Ra5FvWTpUEP2J55uef", AddressType::Secp256k1),
            ("txr1ZVJyqGetYhmPgvnuX1hqbX2NvqsE5HAxv", AddressType::TxRollup),
            ("sr1HyeecFh8UkLrKqnXGUTRNMTDxef5xQ9nL", AddressType::SmartRollup),
        ] {
            let a: Address = text.parse().unwrap();
            assert_eq!(a.typ, typ);
            assert_eq!(Address::from_bytes(&a.to_bytes()).unwrap(), a);
            assert_eq!(a.to_string(), text);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(!is_address_bytes(&[0u8; 21]));
        assert!(!is_address_bytes(b"abcdefghijklmnopqrstuv"));
        assert!("tz1XaLRi6i8qNDa4KyNjQcxFvFDDs8xi7nr2".parse::<Address>().is_err());
        assert!("zz1XaLRi6i8qNDa4KyNjQcxFvFDDs8xi7nr1".parse::<Address>().is_err());
    }

    #[test]
    fn test_serde_as_text() {
        let a: Address = TZ1.parse().unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), format!("\"{}\"", TZ1));
    }
}
