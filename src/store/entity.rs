//! The value stored under a key (§3).

use bytes::Bytes;

/// The payload carried by an [`Entity`]. Only the byte-string variant
/// is implemented; the shape leaves room for more without disturbing
/// callers, matching the "dynamic value typing" design note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Bytes),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bytes(_) => "string",
        }
    }
}

/// A stored value plus its expiration slot. No expiry engine reads or
/// sets `expire_at` yet — no command sets it, nothing checks it on
/// lookup — but the field itself is part of the data model, not an
/// implementation detail to add later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub data: Value,
    pub expire_at: Option<i64>,
}

impl Entity {
    pub fn new(data: Value) -> Entity {
        Entity { data, expire_at: None }
    }

    pub fn of_bytes(bytes: impl Into<Bytes>) -> Entity {
        Entity::new(Value::Bytes(bytes.into()))
    }
}
