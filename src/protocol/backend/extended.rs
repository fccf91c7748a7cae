//! Extended-query backend messages.

use crate::error::Result;
use crate::protocol::codec::{read_i16, read_u32};
use crate::protocol::types::Oid;

/// ParameterDescription message - the OID of every statement parameter,
/// in placeholder order.
#[derive(Debug, Clone)]
pub struct ParameterDescription {
    pub oids: Vec<Oid>,
}

impl ParameterDescription {
    /// Parse a ParameterDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (count, mut rest) = read_i16(payload)?;

        let mut oids = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let (oid, remaining) = read_u32(rest)?;
            oids.push(oid);
            rest = remaining;
        }

        Ok(Self { oids })
    }
}
