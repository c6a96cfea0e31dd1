//! Micheline JSON codec
//!
//! Literals are single-key objects (`{"int":"42"}`, `{"string":"a"}`,
//! `{"bytes":"00ff"}`), applications are `{"prim":..,"args":..,"annots":..}`
//! objects with empty members omitted, and sequences are bare arrays.

use crate::binary::DecodeOptions;
use crate::error::{MichelineError, Result};
use crate::opcode::OpCode;
use crate::prim::{App, Node, Prim};
use num_bigint::BigInt;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

impl Prim {
    /// Decode a Micheline JSON document
    pub fn from_json(data: &[u8]) -> Result<Prim> {
        let value: Value = serde_json::from_slice(data)?;
        Prim::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Prim> {
        Prim::from_json_value_with(value, DecodeOptions::default())
    }

    pub fn from_json_value_with(value: &Value, opts: DecodeOptions) -> Result<Prim> {
        decode_value(value, 0, &opts)
    }

    /// Render as a `serde_json::Value` tree
    pub fn to_json_value(&self) -> Value {
        match &self.node {
            Node::Int(v) => single("int", Value::String(v.to_string())),
            Node::String(s) => single("string", Value::String(s.clone())),
            Node::Bytes(b) => single("bytes", Value::String(hex::encode(b))),
            Node::Seq(items) => Value::Array(items.iter().map(Prim::to_json_value).collect()),
            Node::App(app) => {
                let mut obj = Map::new();
                obj.insert("prim".to_string(), Value::String(app.op.name().to_string()));
                if !app.args.is_empty() {
                    obj.insert(
                        "args".to_string(),
                        Value::Array(app.args.iter().map(Prim::to_json_value).collect()),
                    );
                }
                if !app.annots.is_empty() {
                    obj.insert(
                        "annots".to_string(),
                        Value::Array(app.annots.iter().cloned().map(Value::String).collect()),
                    );
                }
                Value::Object(obj)
            }
        }
    }

    /// Compact JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json_value())?)
    }
}

fn single(key: &str, v: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(key.to_string(), v);
    Value::Object(obj)
}

fn invalid(msg: impl Into<String>) -> MichelineError {
    MichelineError::InvalidJson(msg.into())
}

fn decode_value(value: &Value, depth: usize, opts: &DecodeOptions) -> Result<Prim> {
    if depth > opts.max_depth {
        return Err(MichelineError::DepthExceeded(opts.max_depth));
    }
    match value {
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|v| decode_value(v, depth + 1, opts))
                .collect::<Result<Vec<_>>>()?;
            Ok(Prim::seq(items))
        }
        Value::Object(obj) => {
            if let Some(name) = obj.get("prim") {
                return decode_app(obj, name, depth, opts);
            }
            if let Some(v) = obj.get("int") {
                let text = v.as_str().ok_or_else(|| invalid("int must be a string"))?;
                if !is_decimal(text) {
                    return Err(MichelineError::InvalidInteger(text.to_string()));
                }
                let n: BigInt = text
                    .parse()
                    .map_err(|_| MichelineError::InvalidInteger(text.to_string()))?;
                return Ok(Prim::big(n));
            }
            if let Some(v) = obj.get("string") {
                let s = v.as_str().ok_or_else(|| invalid("string must be a string"))?;
                return Ok(Prim::string(s));
            }
            if let Some(v) = obj.get("bytes") {
                let s = v.as_str().ok_or_else(|| invalid("bytes must be a hex string"))?;
                return Ok(Prim::bytes(hex::decode(s)?));
            }
            Err(invalid(format!(
                "unexpected object with keys {:?}",
                obj.keys().collect::<Vec<_>>()
            )))
        }
        other => Err(invalid(format!("unexpected value {}", other))),
    }
}

/// `-?[0-9]+`
fn is_decimal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn decode_app(
    obj: &Map<String, Value>,
    name: &Value,
    depth: usize,
    opts: &DecodeOptions,
) -> Result<Prim> {
    let name = name.as_str().ok_or_else(|| invalid("prim must be a string"))?;
    let op = OpCode::parse(name)?;
    let args = match obj.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| decode_value(v, depth + 1, opts))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("args must be an array")),
    };
    let annots = match obj.get("annots") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v.as_str() {
                Some(a) if !a.is_empty() && !a.contains(' ') => Ok(a.to_string()),
                _ => Err(MichelineError::InvalidAnnotation(v.to_string())),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("annots must be an array")),
    };
    let generic = args.len() > 2;
    Ok(Node::App(App {
        op,
        args,
        annots,
        generic,
    })
    .into())
}

impl Serialize for Prim {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Prim {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Prim::from_json_value(&value).map_err(D::Error::custom)
    }
}
