//! Parameter encoding and row decoding.
//!
//! Sits between the engine and the type registry: picks a wire format
//! per parameter and per result column, and runs the caller's override
//! hooks where configured.

use crate::error::{Error, Result};
use crate::protocol::frontend::extended::EncodedParam;
use crate::protocol::types::{FormatCode, Oid};
use crate::types::{TypeInfo, TypeRegistry, TypeSource};
use crate::value::Value;

/// Caller-supplied overrides for value conversion, fixed at connect time.
///
/// Every method receives the column's [`TypeInfo`] (name, sender, OID)
/// plus the default conversion so an override can fall back to it.
/// Returning `None` means "no override for this value"; the default
/// pipeline then applies.
pub trait ValueHooks: Send + Sync + 'static {
    /// Override parameter encoding.
    fn encode(
        &self,
        ty: &TypeInfo,
        value: &Value,
        default: &dyn Fn(&Value) -> Option<Vec<u8>>,
    ) -> Option<Result<EncodedParam>> {
        let _ = (ty, value, default);
        None
    }

    /// Override result-field decoding.
    fn decode(
        &self,
        ty: &TypeInfo,
        bytes: &[u8],
        default: &dyn Fn(&[u8]) -> Result<Value>,
    ) -> Option<Result<Value>> {
        let _ = (ty, bytes, default);
        None
    }

    /// Override the result format requested for a column.
    fn result_format(&self, ty: &TypeInfo) -> Option<FormatCode> {
        let _ = ty;
        None
    }
}

/// The no-override hook set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ValueHooks for DefaultHooks {}

/// One query's worth of conversion context.
pub(crate) struct Coder<'a> {
    registry: Option<&'a TypeRegistry>,
    source: &'a dyn TypeSource,
    hooks: &'a dyn ValueHooks,
}

impl<'a> Coder<'a> {
    pub fn new(
        registry: Option<&'a TypeRegistry>,
        source: &'a dyn TypeSource,
        hooks: &'a dyn ValueHooks,
    ) -> Self {
        Self {
            registry,
            source,
            hooks,
        }
    }

    /// Registry entry for an OID, or an unknown placeholder.
    pub fn type_info(&self, oid: Oid) -> TypeInfo {
        self.registry
            .and_then(|r| r.get(oid))
            .cloned()
            .unwrap_or_else(|| TypeInfo::unknown(oid))
    }

    /// Encode the caller's parameters against the server-described OIDs.
    pub fn encode_params(&self, oids: &[Oid], params: &[Value]) -> Result<Vec<EncodedParam>> {
        if oids.len() != params.len() {
            return Err(Error::Encode(format!(
                "expected {} parameters, got {}",
                oids.len(),
                params.len()
            )));
        }

        oids.iter()
            .zip(params)
            .map(|(&oid, param)| self.encode_param(oid, param))
            .collect()
    }

    fn encode_param(&self, oid: Oid, param: &Value) -> Result<EncodedParam> {
        if param.is_null() {
            return Ok(EncodedParam::null());
        }

        let info = self.type_info(oid);
        let default = |value: &Value| self.source.encode(&info.sender, value, oid);

        if let Some(result) = self.hooks.encode(&info, param, &default) {
            return result;
        }

        if self.registry.map(|r| r.get(oid).is_some()).unwrap_or(false) {
            if let Some(bytes) = default(param) {
                return Ok(EncodedParam::binary(bytes));
            }
        }

        // A value that is already a byte string goes out in text format
        // untouched; anything else cannot be represented for this type.
        match param {
            Value::Text(s) => Ok(EncodedParam::text(s.as_bytes().to_vec())),
            Value::Bytes(b) => Ok(EncodedParam::text(b.clone())),
            other => Err(Error::Encode(format!(
                "unable to encode value {} as type {}",
                other, info.name
            ))),
        }
    }

    /// The result format requested for a column: binary when the registry
    /// can decode it, text otherwise, unless a hook overrides.
    pub fn result_format(&self, info: &TypeInfo) -> FormatCode {
        if let Some(format) = self.hooks.result_format(info) {
            return format;
        }
        if info.can_decode {
            FormatCode::Binary
        } else {
            FormatCode::Text
        }
    }

    /// Decode one raw row against the positional column info captured at
    /// Describe time.
    pub fn decode_row(
        &self,
        row_info: &[TypeInfo],
        raw: &[Option<Vec<u8>>],
    ) -> Result<Vec<Value>> {
        row_info
            .iter()
            .zip(raw)
            .map(|(info, field)| match field {
                None => Ok(Value::Null),
                Some(bytes) => self.decode_field(info, bytes),
            })
            .collect()
    }

    fn decode_field(&self, info: &TypeInfo, bytes: &[u8]) -> Result<Value> {
        let default = |bytes: &[u8]| {
            if info.can_decode {
                self.source.decode(&info.sender, bytes)
            } else {
                Ok(Value::Bytes(bytes.to_vec()))
            }
        };

        match self.hooks.decode(info, bytes, &default) {
            Some(result) => result,
            None => default(bytes),
        }
    }
}
