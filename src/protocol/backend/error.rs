//! Error and notice response parsing.
//!
//! Both messages share the same body: a sequence of single-byte field
//! codes, each followed by a null-terminated string, terminated by a zero
//! byte.

use crate::error::{Result, ServerError};
use crate::protocol::codec::read_cstr;

/// Parse error/notice fields from payload into a ServerError.
pub fn parse_fields(payload: &[u8]) -> Result<ServerError> {
    let mut fields = std::collections::HashMap::new();
    let mut data = payload;

    while !data.is_empty() && data[0] != 0 {
        let field_code = data[0];
        let (value, rest) = read_cstr(&data[1..])?;
        fields.insert(field_code, value.to_string());
        data = rest;
    }

    Ok(ServerError::new(fields))
}
