//! Micheline tree model and codecs for Michelson contracts
//!
//! This crate provides the in-memory representation of Michelson code, types
//! and values together with the encodings used on chain.
//!
//! # Features
//!
//! - **Byte exact**: binary encoding round-trips every tree it decodes
//! - **Panic free decoding**: malformed input is reported through [`MichelineError`]
//! - **JSON**: the Micheline JSON convention via `serde`
//! - **PACK**: canonical `0x05` tagged bytes with heuristic detection and unpacking
//!
//! # Usage
//!
//! ```rust
//! use micheline_core::{OpCode, Prim};
//!
//! let value = Prim::pair(Prim::int(1), Prim::string("a"));
//! let bytes = value.to_binary().unwrap();
//! assert_eq!(Prim::from_binary(&bytes).unwrap(), value);
//! assert!(Prim::from_json(br#"{"prim":"Unit"}"#).unwrap().is_op(OpCode::Unit));
//! ```

// Module declarations
pub mod address;
pub mod binary;
pub mod error;
pub mod json;
pub mod key;
pub mod opcode;
pub mod pack;
pub mod prim;
pub mod types;

// Re-export all public types for convenience
pub use address::{Address, AddressType};
pub use binary::{DecodeOptions, DEFAULT_MAX_DEPTH};
pub use error::{MichelineError, Result};
pub use key::{Key, KeyType, Signature, SignatureType};
pub use opcode::{OpCode, OPCODES};
pub use pack::{is_ascii_bytes, is_packed_bytes, PACK_TAG};
pub use prim::{App, Node, Prim, PrimKind, Visit};
pub use types::{Branch, Entrypoint, Entrypoints, Type};
