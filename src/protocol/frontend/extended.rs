//! Extended query protocol messages.

use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid};

/// A single encoded Bind parameter: chosen wire format plus the value
/// bytes, where `None` encodes SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedParam {
    pub format: FormatCode,
    pub bytes: Option<Vec<u8>>,
}

impl EncodedParam {
    /// A binary-format NULL parameter.
    pub fn null() -> Self {
        Self {
            format: FormatCode::Binary,
            bytes: None,
        }
    }

    pub fn binary(bytes: Vec<u8>) -> Self {
        Self {
            format: FormatCode::Binary,
            bytes: Some(bytes),
        }
    }

    pub fn text(bytes: Vec<u8>) -> Self {
        Self {
            format: FormatCode::Text,
            bytes: Some(bytes),
        }
    }
}

/// Write a Parse message to create a prepared statement.
///
/// - `name`: Statement name (empty string for the unnamed statement)
/// - `query`: SQL query with $1, $2, ... placeholders
/// - `param_oids`: Parameter type OID hints (empty = let the server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) {
    let mut msg = MessageBuilder::tagged(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(param_oids.len() as i16);
    for &oid in param_oids {
        msg.write_i32(oid as i32);
    }
    msg.finish();
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// The per-parameter format list mirrors the format chosen for each
/// encoded parameter; `result_formats` carries the per-column format the
/// caller wants result fields delivered in.
pub fn write_bind(
    buf: &mut Vec<u8>,
    portal: &str,
    statement: &str,
    params: &[EncodedParam],
    result_formats: &[FormatCode],
) {
    let mut msg = MessageBuilder::tagged(buf, super::msg_type::BIND);

    msg.write_cstr(portal);
    msg.write_cstr(statement);

    // Parameter format codes, one per parameter
    msg.write_i16(params.len() as i16);
    for param in params {
        msg.write_i16(param.format as i16);
    }

    // Parameter values: i32 length (-1 for NULL) followed by value bytes
    msg.write_i16(params.len() as i16);
    for param in params {
        match &param.bytes {
            Some(bytes) => {
                msg.write_i32(bytes.len() as i32);
                msg.write_bytes(bytes);
            }
            None => msg.write_i32(-1),
        }
    }

    // Result format codes
    msg.write_i16(result_formats.len() as i16);
    for &fmt in result_formats {
        msg.write_i16(fmt as i16);
    }

    msg.finish();
}

/// Write a Describe message to get metadata.
///
/// - `kind`: 'S' for a prepared statement, 'P' for a portal
/// - `name`: Statement or portal name
pub fn write_describe(buf: &mut Vec<u8>, kind: u8, name: &str) {
    let mut msg = MessageBuilder::tagged(buf, super::msg_type::DESCRIBE);
    msg.write_u8(kind);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Describe message for a prepared statement.
pub fn write_describe_statement(buf: &mut Vec<u8>, name: &str) {
    write_describe(buf, b'S', name);
}

/// Write a Describe message for a portal.
pub fn write_describe_portal(buf: &mut Vec<u8>, name: &str) {
    write_describe(buf, b'P', name);
}

/// Write an Execute message to run a portal.
///
/// - `portal`: Portal name
/// - `max_rows`: Maximum number of rows to return (0 = unlimited)
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::tagged(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_i32(max_rows as i32);
    msg.finish();
}

/// Write a Sync message.
///
/// This ends an extended query sequence; the server responds with
/// ReadyForQuery once every queued step has been answered.
pub fn write_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::tagged(buf, super::msg_type::SYNC);
    msg.finish();
}
