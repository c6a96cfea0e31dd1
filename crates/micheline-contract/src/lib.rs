//! Michelson contract scripts, storage linking and typed values
//!
//! Builds on [`micheline_core`] to work with whole contracts: the script
//! container and its binary framing, recovery of big-map ids from storage,
//! global constant expansion, big-map diff events and field access on typed
//! values.
//!
//! # Usage
//!
//! ```rust
//! use micheline_contract::detect_bigmaps;
//! use micheline_core::{OpCode, Prim};
//!
//! let typ = Prim::big_map_type(Prim::prim0(OpCode::address), Prim::prim0(OpCode::nat))
//!     .with_annot("%ledger");
//! let ids = detect_bigmaps(&typ, &Prim::int(42)).unwrap();
//! assert_eq!(ids.get("ledger"), Some(&42));
//! ```

// Module declarations
pub mod bigmap;
pub mod constants;
pub mod error;
pub mod features;
pub mod interface;
pub mod linker;
pub mod script;
pub mod value;
pub mod view;

// Re-export all public types for convenience
pub use bigmap::{BigmapEvent, BigmapEvents, DiffAction};
pub use constants::{expand_constants, ConstantDict, MAX_EXPANSION_DEPTH};
pub use error::{ContractError, Result};
pub use features::{detect_features, Features};
pub use interface::Interface;
pub use linker::{detect_bigmap_types, detect_bigmaps, link_storage, StorageItem, BIGMAP_BASE_NAME};
pub use script::{decode_script_types, Code, Script, Views};
pub use value::Value;
pub use view::View;
