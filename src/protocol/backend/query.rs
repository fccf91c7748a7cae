//! Query-result backend messages.

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_cstr, read_i16, read_i32, read_u16, read_u32};
use crate::protocol::types::{FormatCode, Oid};

/// Field description within a RowDescription.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    /// Field name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_attr: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_mod: i32,
    /// Format code (0=text, 1=binary)
    pub format: FormatCode,
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug, Clone)]
pub struct RowDescription {
    pub fields: Vec<FieldDescription>,
}

impl RowDescription {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_fields, mut data) = read_u16(payload)?;

        let mut fields = Vec::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (table_oid, rest) = read_u32(rest)?;
            let (column_attr, rest) = read_i16(rest)?;
            let (type_oid, rest) = read_u32(rest)?;
            let (type_size, rest) = read_i16(rest)?;
            let (type_mod, rest) = read_i32(rest)?;
            let (format_code, rest) = read_u16(rest)?;

            fields.push(FieldDescription {
                name: name.to_string(),
                table_oid,
                column_attr,
                type_oid,
                type_size,
                type_mod,
                format: FormatCode::from_u16(format_code),
            });

            data = rest;
        }

        Ok(Self { fields })
    }
}

/// DataRow message - a single row of data.
///
/// Each field is `Option<Vec<u8>>` where `None` is a SQL NULL (wire
/// length -1).
#[derive(Debug, Clone)]
pub struct DataRow {
    pub values: Vec<Option<Vec<u8>>>,
}

impl DataRow {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_columns, mut data) = read_u16(payload)?;

        let mut values = Vec::with_capacity(num_columns as usize);
        for _ in 0..num_columns {
            let (len, rest) = read_i32(data)?;
            if len == -1 {
                values.push(None);
                data = rest;
            } else if len < 0 {
                return Err(Error::Protocol(format!(
                    "DataRow: invalid field length: {len}"
                )));
            } else {
                let (bytes, rest) = read_bytes(rest, len as usize)?;
                values.push(Some(bytes.to_vec()));
                data = rest;
            }
        }

        Ok(Self { values })
    }
}

/// CommandComplete message - a command finished, with its tag text
/// (e.g. "SELECT 5", "INSERT 0 1").
#[derive(Debug, Clone)]
pub struct CommandComplete {
    pub tag: String,
}

impl CommandComplete {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self {
            tag: tag.to_string(),
        })
    }
}
