//! Contract scripts
//!
//! A [`Script`] pairs the program ([`Code`]: parameter type, storage type,
//! code and views) with the current storage value.
//!
//! Binary layout:
//!
//! ```text
//! [u32 len][sequence { parameter ; storage ; code ; view* }][u32 len][storage value]
//! ```
//!
//! Both length prefixes are cross-checked against the bytes the enclosed tree
//! actually occupies.

use crate::constants::{expand_constants, ConstantDict};
use crate::error::{ContractError, Result};
use crate::features::{detect_features, Features};
use crate::interface::Interface;
use crate::linker::{detect_bigmap_types, detect_bigmaps};
use crate::view::View;
use micheline_core::binary::{write_sized, Reader, TAG_SEQUENCE};
use micheline_core::{Entrypoints, MichelineError, OpCode, Prim, Type};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::warn;

/// Views keyed by name
pub type Views = BTreeMap<String, View>;

/// Program sections of a script
///
/// Either `bad_code` is set and holds a program whose sections could not be
/// identified, or it is empty and the keyword sections are populated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Code {
    /// `parameter <type>` section
    pub param: Option<Prim>,
    /// `storage <type>` section
    pub storage: Option<Prim>,
    /// `code { ... }` section
    pub code: Option<Prim>,
    /// `view` sections in declaration order
    pub views: Vec<Prim>,
    /// Catch-all for ill-formed programs
    pub bad_code: Option<Prim>,
}

impl Code {
    /// Split a program tree into its keyword sections
    ///
    /// Any tree that is not a sequence of keyword sections is kept whole as
    /// bad code.
    pub fn from_prim(root: Prim) -> Code {
        if !root.is_seq() {
            warn!(kind = ?root.kind(), "program is not a sequence");
            return Code::bad(root);
        }
        let mut code = Code::default();
        for section in root.args() {
            match section.op() {
                Some(OpCode::parameter) => code.param = Some(section.clone()),
                Some(OpCode::storage) => code.storage = Some(section.clone()),
                Some(OpCode::code) => code.code = Some(section.clone()),
                Some(OpCode::view) => code.views.push(section.clone()),
                other => {
                    warn!(key = ?other, "unexpected program key");
                    return Code::bad(root);
                }
            }
        }
        code
    }

    fn bad(root: Prim) -> Code {
        Code {
            bad_code: Some(root),
            ..Code::default()
        }
    }

    pub fn is_bad(&self) -> bool {
        self.bad_code.is_some()
    }

    /// Whether parameter and storage sections carry a type
    pub fn is_valid(&self) -> bool {
        !self.is_bad()
            && [&self.param, &self.storage]
                .iter()
                .all(|s| s.as_ref().and_then(|p| p.arg(0)).is_some())
    }

    /// The program as a single tree
    pub fn to_prim(&self) -> Prim {
        if let Some(bad) = &self.bad_code {
            return bad.clone();
        }
        let sections = [&self.param, &self.storage, &self.code]
            .into_iter()
            .flatten()
            .chain(self.views.iter())
            .cloned()
            .collect();
        Prim::seq(sections)
    }

    /// Length prefixed binary form
    ///
    /// Bad code is written as decoded, so a program that is not a sequence
    /// keeps its shape across a binary roundtrip.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let root = self.to_prim();
        let mut out = Vec::new();
        write_sized(&mut out, &root.to_binary()?)?;
        Ok(out)
    }

    pub fn from_binary(data: &[u8]) -> Result<Code> {
        let mut reader = Reader::new(data);
        let code = Code::decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(MichelineError::TrailingBytes(reader.remaining()).into());
        }
        Ok(code)
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Code> {
        let root = read_framed(reader, "script")?;
        Ok(Code::from_prim(root))
    }

    fn section_type(section: &Option<Prim>) -> Option<Type> {
        section.as_ref().and_then(|s| s.arg(0)).cloned().map(Type)
    }

    pub fn param_type(&self) -> Option<Type> {
        Code::section_type(&self.param)
    }

    pub fn storage_type(&self) -> Option<Type> {
        Code::section_type(&self.storage)
    }
}

/// Read `[u32 len][tree]` and check the tree occupies exactly `len` bytes
fn read_framed(reader: &mut Reader<'_>, what: &str) -> Result<Prim> {
    let size = reader.read_u32()? as usize;
    if reader.remaining() < size {
        return Err(MichelineError::ShortBuffer.into());
    }
    let before = reader.position();
    let prim = reader.read_prim()?;
    let read = reader.position() - before;
    if read != size {
        return Err(ContractError::framing(format!(
            "expected {} size {} but read {}",
            what, size, read
        )));
    }
    Ok(prim)
}

impl Serialize for Code {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_prim().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Prim::deserialize(deserializer).map(Code::from_prim)
    }
}

/// A contract program with its storage value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub code: Code,
    pub storage: Prim,
}

impl Script {
    pub fn new(code: Code, storage: Prim) -> Self {
        Self { code, storage }
    }

    pub fn from_json(data: &[u8]) -> Result<Script> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let mut out = self.code.to_binary()?;
        write_sized(&mut out, &self.storage.to_binary()?)?;
        Ok(out)
    }

    /// Decode the binary form, rejecting trailing bytes
    pub fn from_binary(data: &[u8]) -> Result<Script> {
        let mut reader = Reader::new(data);
        let code = Code::decode(&mut reader)?;
        let storage = read_framed(&mut reader, "storage")?;
        if !reader.is_empty() {
            return Err(MichelineError::TrailingBytes(reader.remaining()).into());
        }
        Ok(Script { code, storage })
    }

    pub fn is_valid(&self) -> bool {
        self.code.is_valid()
    }

    pub fn param_type(&self) -> Option<Type> {
        self.code.param_type()
    }

    pub fn storage_type(&self) -> Option<Type> {
        self.code.storage_type()
    }

    /// Entrypoints of the parameter type; empty when the script has none
    pub fn entrypoints(&self) -> Entrypoints {
        self.param_type()
            .map(|t| t.entrypoints())
            .unwrap_or_default()
    }

    pub fn resolve_entrypoint_path(&self, name: &str) -> Option<String> {
        self.param_type()?.resolve_entrypoint_path(name)
    }

    pub fn views(&self) -> Result<Views> {
        self.code
            .views
            .iter()
            .map(|p| View::new(p).map(|v| (v.name.clone(), v)))
            .collect()
    }

    fn sections(&self) -> impl Iterator<Item = &Prim> {
        [&self.code.param, &self.code.storage, &self.code.code, &self.code.bad_code]
            .into_iter()
            .flatten()
            .chain(self.code.views.iter())
    }

    /// Expression hashes of all global constants referenced by the program
    pub fn constants(&self) -> Vec<String> {
        self.sections().flat_map(Prim::constants).collect()
    }

    /// Replace global constant references with their expressions
    ///
    /// A program that is itself one constant reference (stored as bad code)
    /// is replaced by the sections of the referenced program.
    pub fn expand_constants(&mut self, dict: &ConstantDict) -> Result<()> {
        let whole = self
            .code
            .bad_code
            .as_ref()
            .map(|bad| match bad.args() {
                [only] if bad.is_seq() => only,
                _ => bad,
            })
            .and_then(|root| dict.lookup(root))
            .cloned();
        if let Some(program) = whole {
            let expanded = Code::from_prim(program);
            if expanded.is_bad() {
                return Err(ContractError::shape("constant does not expand to a program"));
            }
            self.code = expanded;
        }
        let code = &mut self.code;
        for section in [&mut code.param, &mut code.storage, &mut code.code]
            .into_iter()
            .flatten()
            .chain(code.views.iter_mut())
        {
            expand_constants(section, dict)?;
        }
        Ok(())
    }

    fn section_hash(section: &Option<Prim>, what: &str) -> Result<u64> {
        let p = section
            .as_ref()
            .ok_or_else(|| ContractError::shape(format!("script has no {} section", what)))?;
        Ok(p.hash64()?)
    }

    /// Fingerprint of the parameter section, annotations included
    pub fn interface_hash(&self) -> Result<u64> {
        Script::section_hash(&self.code.param, "parameter")
    }

    pub fn storage_hash(&self) -> Result<u64> {
        Script::section_hash(&self.code.storage, "storage")
    }

    pub fn code_hash(&self) -> Result<u64> {
        Script::section_hash(&self.code.code, "code")
    }

    /// Named big-map ids in the current storage
    pub fn bigmaps(&self) -> Result<BTreeMap<String, i64>> {
        let typ = self
            .code
            .storage
            .as_ref()
            .ok_or_else(|| ContractError::shape("script has no storage section"))?;
        detect_bigmaps(typ, &self.storage)
    }

    /// Named big-map types declared by the storage type
    pub fn bigmap_types(&self) -> BTreeMap<String, Type> {
        self.code
            .storage
            .as_ref()
            .map(detect_bigmap_types)
            .unwrap_or_default()
    }

    pub fn implements(&self, iface: Interface) -> bool {
        iface.matches(&self.entrypoints())
    }

    /// Token interface of the script, first match in [`Interface::PRECEDENCE`]
    pub fn token_kind(&self) -> Option<Interface> {
        Interface::detect(&self.entrypoints())
    }

    pub fn features(&self) -> Features {
        let mut out = Features::empty();
        for section in self.sections() {
            out.insert(detect_features(section));
        }
        out
    }
}

/// Decode only the parameter and storage types from a binary program
///
/// Stops after the storage section, so code and views are never decoded.
pub fn decode_script_types(data: &[u8]) -> Result<(Type, Type)> {
    let mut reader = Reader::new(data);
    let size = reader.read_u32()? as usize;
    if reader.remaining() < size {
        return Err(MichelineError::ShortBuffer.into());
    }
    let tag = reader.read_u8()?;
    if tag != TAG_SEQUENCE {
        return Err(ContractError::framing(format!("unexpected program tag 0x{:02x}", tag)));
    }
    let content = reader.read_u32()? as usize;
    if reader.remaining() < content {
        return Err(MichelineError::ShortBuffer.into());
    }
    let mut section = |want: OpCode| -> Result<Type> {
        let p = reader.read_prim()?;
        match p.arg(0) {
            Some(t) if p.is_op(want) => Ok(Type(t.clone())),
            _ => Err(ContractError::framing(format!(
                "expected {} section, found {}",
                want,
                p.dump_limit(32)
            ))),
        }
    };
    let param = section(OpCode::parameter)?;
    let storage = section(OpCode::storage)?;
    Ok((param, storage))
}
