//! Per-session type registry and the type-mapping collaborator.
//!
//! Every session discovers the server's `pg_type` catalog once, right
//! after authentication, by running the collaborator's bootstrap query.
//! The resulting registry maps each OID to its name, its binary
//! send-function name (the discriminant codecs dispatch on) and whether
//! the collaborator can decode it. Registries are never shared between
//! sessions: two servers may disagree about OIDs.

mod builtin;

pub use builtin::PgTypes;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::types::Oid;
use crate::value::Value;

/// One entry of the per-session type registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Type OID from `pg_type`
    pub oid: Oid,
    /// Type name (`typname`)
    pub name: String,
    /// Binary output function name (`typsend`)
    pub sender: String,
    /// Whether the session's `TypeSource` decodes this sender
    pub can_decode: bool,
}

impl TypeInfo {
    /// Placeholder entry for an OID the bootstrap did not cover.
    pub fn unknown(oid: Oid) -> Self {
        Self {
            oid,
            name: "unknown".to_string(),
            sender: String::new(),
            can_decode: false,
        }
    }
}

/// OID → type information, built once per session from bootstrap rows.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    by_oid: HashMap<Oid, TypeInfo>,
}

impl TypeRegistry {
    /// Build a registry from raw bootstrap rows.
    ///
    /// Each row carries `(oid, typname, typsend)` in text format: the
    /// bootstrap query runs before any registry exists, so every column
    /// arrives undecoded.
    pub fn from_rows(
        rows: &[Vec<Option<Vec<u8>>>],
        mut can_decode: impl FnMut(&str) -> bool,
    ) -> Result<Self> {
        let mut by_oid = HashMap::with_capacity(rows.len());

        for row in rows {
            let oid = text_field(row, 0)?
                .parse::<Oid>()
                .map_err(|e| Error::Protocol(format!("type bootstrap: bad oid: {e}")))?;
            let name = text_field(row, 1)?.to_string();
            let sender = text_field(row, 2)?.to_string();
            let decodes = can_decode(&sender);

            by_oid.insert(
                oid,
                TypeInfo {
                    oid,
                    name,
                    sender,
                    can_decode: decodes,
                },
            );
        }

        Ok(Self { by_oid })
    }

    /// Look up a registry entry.
    pub fn get(&self, oid: Oid) -> Option<&TypeInfo> {
        self.by_oid.get(&oid)
    }

    /// Map an OID to its (type name, sender name) pair.
    pub fn oid_to_type(&self, oid: Oid) -> Option<(&str, &str)> {
        self.get(oid).map(|t| (t.name.as_str(), t.sender.as_str()))
    }

    /// Whether the session can decode values of this OID.
    pub fn can_decode(&self, oid: Oid) -> bool {
        self.get(oid).map(|t| t.can_decode).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.by_oid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_oid.is_empty()
    }
}

fn text_field(row: &[Option<Vec<u8>>], index: usize) -> Result<&str> {
    let bytes = row
        .get(index)
        .and_then(|f| f.as_deref())
        .ok_or_else(|| Error::Protocol(format!("type bootstrap: missing column {index}")))?;
    simdutf8::basic::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("type bootstrap: invalid UTF-8: {e}")))
}

/// The type-mapping collaborator for a session.
///
/// Supplies the bootstrap SQL, turns its rows into a [`TypeRegistry`],
/// and converts values to and from the binary wire format, dispatching
/// on the sender name. [`PgTypes`] is the built-in implementation;
/// callers can substitute their own via [`Opts`](crate::Opts).
pub trait TypeSource: Send + Sync + 'static {
    /// SQL run once per session to enumerate the server's types.
    fn bootstrap_query(&self) -> &str;

    /// Whether `decode` understands values produced by this sender.
    fn can_decode(&self, sender: &str) -> bool;

    /// Encode a host value to the binary wire format of `oid`.
    ///
    /// Returns `None` when this sender/value pairing is not encodable;
    /// the value coder then falls back to text or fails the request.
    fn encode(&self, sender: &str, value: &Value, oid: Oid) -> Option<Vec<u8>>;

    /// Decode binary wire bytes produced by `sender`.
    fn decode(&self, sender: &str, bytes: &[u8]) -> Result<Value>;

    /// Build the per-session registry from raw bootstrap rows.
    fn build_types(&self, rows: &[Vec<Option<Vec<u8>>>]) -> Result<TypeRegistry> {
        TypeRegistry::from_rows(rows, |sender| self.can_decode(sender))
    }
}
