//! Big-map diff events
//!
//! Operation receipts report big-map changes as a list of events. The JSON
//! form follows the node RPC (`"big_map"` ids are decimal strings). The
//! binary form is a compact concatenation of
//!
//! ```text
//! [i32 id][u8 action][prim payload]
//! ```
//!
//! where the payload is `Pair key value` (update), `Some key` or `None`
//! (remove), `Pair key_type value_type` (alloc) or `Pair source dest` (copy).

use crate::error::{ContractError, Result};
use micheline_core::binary::Reader;
use micheline_core::{OpCode, Prim};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of big-map change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Update,
    Remove,
    Alloc,
    Copy,
}

impl DiffAction {
    pub fn as_u8(self) -> u8 {
        match self {
            DiffAction::Update => 0,
            DiffAction::Remove => 1,
            DiffAction::Alloc => 2,
            DiffAction::Copy => 3,
        }
    }

    pub fn from_u8(b: u8) -> Option<DiffAction> {
        match b {
            0 => Some(DiffAction::Update),
            1 => Some(DiffAction::Remove),
            2 => Some(DiffAction::Alloc),
            3 => Some(DiffAction::Copy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiffAction::Update => "update",
            DiffAction::Remove => "remove",
            DiffAction::Alloc => "alloc",
            DiffAction::Copy => "copy",
        }
    }
}

impl fmt::Display for DiffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One big-map change
///
/// For copies `id` is the destination map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent", into = "RawEvent")]
pub struct BigmapEvent {
    pub action: DiffAction,
    pub id: i64,
    /// Expression hash of the packed key
    pub key_hash: Option<String>,
    pub key: Option<Prim>,
    pub value: Option<Prim>,
    pub key_type: Option<Prim>,
    pub value_type: Option<Prim>,
    pub source_id: i64,
    pub dest_id: i64,
}

impl BigmapEvent {
    fn empty(action: DiffAction, id: i64) -> Self {
        BigmapEvent {
            action,
            id,
            key_hash: None,
            key: None,
            value: None,
            key_type: None,
            value_type: None,
            source_id: 0,
            dest_id: 0,
        }
    }

    pub fn update(id: i64, key: Prim, value: Prim) -> Self {
        BigmapEvent {
            key: Some(key),
            value: Some(value),
            ..BigmapEvent::empty(DiffAction::Update, id)
        }
    }

    /// Remove one key, or the whole map when `key` is `None`
    pub fn remove(id: i64, key: Option<Prim>) -> Self {
        BigmapEvent {
            key,
            ..BigmapEvent::empty(DiffAction::Remove, id)
        }
    }

    pub fn alloc(id: i64, key_type: Prim, value_type: Prim) -> Self {
        BigmapEvent {
            key_type: Some(key_type),
            value_type: Some(value_type),
            ..BigmapEvent::empty(DiffAction::Alloc, id)
        }
    }

    pub fn copy(source_id: i64, dest_id: i64) -> Self {
        BigmapEvent {
            source_id,
            dest_id,
            ..BigmapEvent::empty(DiffAction::Copy, dest_id)
        }
    }

    pub fn with_key_hash(mut self, hash: impl Into<String>) -> Self {
        self.key_hash = Some(hash.into());
        self
    }

    fn payload(&self) -> Result<Prim> {
        let missing = |what: &str| ContractError::shape(format!("{} event without {}", self.action, what));
        Ok(match self.action {
            DiffAction::Update => Prim::pair(
                self.key.clone().ok_or_else(|| missing("key"))?,
                self.value.clone().ok_or_else(|| missing("value"))?,
            ),
            DiffAction::Remove => match &self.key {
                Some(k) => Prim::some(k.clone()),
                None => Prim::none(),
            },
            DiffAction::Alloc => Prim::pair(
                self.key_type.clone().ok_or_else(|| missing("key type"))?,
                self.value_type.clone().ok_or_else(|| missing("value type"))?,
            ),
            DiffAction::Copy => Prim::pair(Prim::int(self.source_id), Prim::int(self.dest_id)),
        })
    }

    fn from_payload(action: DiffAction, id: i64, payload: Prim) -> Result<Self> {
        let bad = || ContractError::shape(format!("invalid {} event payload {}", action, payload.dump_limit(64)));
        let pair = || -> Result<(Prim, Prim)> {
            match payload.args() {
                [l, r] if payload.is_op(OpCode::Pair) => Ok((l.clone(), r.clone())),
                _ => Err(bad()),
            }
        };
        Ok(match action {
            DiffAction::Update => {
                let (k, v) = pair()?;
                BigmapEvent::update(id, k, v)
            }
            DiffAction::Remove => match payload.op() {
                Some(OpCode::Some) => BigmapEvent::remove(id, payload.arg(0).cloned()),
                Some(OpCode::None) => BigmapEvent::remove(id, None),
                _ => return Err(bad()),
            },
            DiffAction::Alloc => {
                let (k, v) = pair()?;
                BigmapEvent::alloc(id, k, v)
            }
            DiffAction::Copy => {
                let (src, dst) = pair()?;
                let id_of = |p: &Prim| p.as_int().and_then(|v| i64::try_from(v).ok()).ok_or_else(&bad);
                let mut ev = BigmapEvent::copy(id_of(&src)?, id_of(&dst)?);
                ev.id = id;
                ev
            }
        })
    }
}

/// RPC shaped JSON form
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEvent {
    action: DiffAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    big_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<Prim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Prim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_type: Option<Prim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value_type: Option<Prim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_big_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination_big_map: Option<String>,
}

fn parse_id(field: &str, s: Option<&String>) -> Result<i64> {
    let s = s.ok_or_else(|| ContractError::shape(format!("missing {}", field)))?;
    s.parse()
        .map_err(|_| ContractError::shape(format!("invalid {} {:?}", field, s)))
}

impl TryFrom<RawEvent> for BigmapEvent {
    type Error = ContractError;

    fn try_from(raw: RawEvent) -> Result<Self> {
        let mut ev = match raw.action {
            DiffAction::Copy => BigmapEvent::copy(
                parse_id("source_big_map", raw.source_big_map.as_ref())?,
                parse_id("destination_big_map", raw.destination_big_map.as_ref())?,
            ),
            action => {
                let id = parse_id("big_map", raw.big_map.as_ref())?;
                match (action, raw.value) {
                    // an update without a value deletes the key
                    (DiffAction::Update, None) => BigmapEvent::remove(id, raw.key),
                    (DiffAction::Update, Some(value)) => BigmapEvent {
                        key: raw.key,
                        value: Some(value),
                        ..BigmapEvent::empty(DiffAction::Update, id)
                    },
                    (_, value) => BigmapEvent {
                        key: raw.key,
                        value,
                        key_type: raw.key_type,
                        value_type: raw.value_type,
                        ..BigmapEvent::empty(action, id)
                    },
                }
            }
        };
        ev.key_hash = raw.key_hash;
        Ok(ev)
    }
}

impl From<BigmapEvent> for RawEvent {
    fn from(ev: BigmapEvent) -> Self {
        let copy = ev.action == DiffAction::Copy;
        RawEvent {
            action: ev.action,
            big_map: (!copy).then(|| ev.id.to_string()),
            key_hash: ev.key_hash,
            key: ev.key,
            value: ev.value,
            key_type: ev.key_type,
            value_type: ev.value_type,
            source_big_map: copy.then(|| ev.source_id.to_string()),
            destination_big_map: copy.then(|| ev.dest_id.to_string()),
        }
    }
}

/// Ordered list of big-map changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BigmapEvents(pub Vec<BigmapEvent>);

impl BigmapEvents {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BigmapEvent> {
        self.0.iter()
    }

    /// Events touching big-map `id`
    pub fn filter(&self, id: i64) -> BigmapEvents {
        BigmapEvents(self.0.iter().filter(|e| e.id == id).cloned().collect())
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for ev in &self.0 {
            let id = i32::try_from(ev.id)
                .map_err(|_| ContractError::shape(format!("big_map id {} out of range", ev.id)))?;
            out.extend_from_slice(&id.to_be_bytes());
            out.push(ev.action.as_u8());
            ev.payload()?.encode_into(&mut out)?;
        }
        Ok(out)
    }

    pub fn from_binary(data: &[u8]) -> Result<BigmapEvents> {
        let mut reader = Reader::new(data);
        let mut events = Vec::new();
        while !reader.is_empty() {
            let id = reader.read_u32()? as i32 as i64;
            let tag = reader.read_u8()?;
            let action = DiffAction::from_u8(tag)
                .ok_or_else(|| ContractError::shape(format!("unknown big_map action {}", tag)))?;
            let payload = reader.read_prim()?;
            events.push(BigmapEvent::from_payload(action, id, payload)?);
        }
        Ok(BigmapEvents(events))
    }
}

impl IntoIterator for BigmapEvents {
    type Item = BigmapEvent;
    type IntoIter = std::vec::IntoIter<BigmapEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<BigmapEvent> for BigmapEvents {
    fn from_iter<I: IntoIterator<Item = BigmapEvent>>(iter: I) -> Self {
        BigmapEvents(iter.into_iter().collect())
    }
}
