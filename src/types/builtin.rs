//! Built-in type-mapping collaborator.
//!
//! Codecs dispatch on the `typsend` function name reported by the
//! server, not on hard-coded OIDs, so user-defined domains over built-in
//! types decode for free.

use crate::error::{Error, Result};
use crate::protocol::types::Oid;
use crate::value::Value;

use super::TypeSource;

#[cfg(feature = "with-chrono")]
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
#[cfg(feature = "with-rust-decimal")]
use rust_decimal::Decimal;

const BOOTSTRAP_QUERY: &str = "SELECT t.oid, t.typname, t.typsend FROM pg_type AS t";

/// PostgreSQL epoch: 2000-01-01
#[cfg(feature = "with-chrono")]
const PG_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => panic!("invalid date"),
};

/// The default [`TypeSource`], covering the common scalar types.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgTypes;

impl TypeSource for PgTypes {
    fn bootstrap_query(&self) -> &str {
        BOOTSTRAP_QUERY
    }

    fn can_decode(&self, sender: &str) -> bool {
        match sender {
            "boolsend" | "int2send" | "int4send" | "int8send" | "oidsend" | "float4send"
            | "float8send" | "textsend" | "varcharsend" | "bpcharsend" | "namesend"
            | "byteasend" => true,
            #[cfg(feature = "with-chrono")]
            "date_send" | "time_send" | "timestamp_send" | "timestamptz_send" => true,
            #[cfg(feature = "with-rust-decimal")]
            "numeric_send" => true,
            _ => false,
        }
    }

    fn encode(&self, sender: &str, value: &Value, _oid: Oid) -> Option<Vec<u8>> {
        match sender {
            "boolsend" => match value {
                Value::Bool(v) => Some(vec![u8::from(*v)]),
                _ => None,
            },
            "int2send" => i16::try_from(value.as_i64()?)
                .ok()
                .map(|v| v.to_be_bytes().to_vec()),
            "int4send" => i32::try_from(value.as_i64()?)
                .ok()
                .map(|v| v.to_be_bytes().to_vec()),
            "int8send" => value.as_i64().map(|v| v.to_be_bytes().to_vec()),
            "oidsend" => u32::try_from(value.as_i64()?)
                .ok()
                .map(|v| v.to_be_bytes().to_vec()),
            "float4send" => match value {
                Value::Float4(v) => Some(v.to_be_bytes().to_vec()),
                _ => None,
            },
            "float8send" => value.as_f64().map(|v| v.to_be_bytes().to_vec()),
            "textsend" | "varcharsend" | "bpcharsend" | "namesend" => match value {
                Value::Text(v) => Some(v.as_bytes().to_vec()),
                _ => None,
            },
            "byteasend" => match value {
                Value::Bytes(v) => Some(v.clone()),
                _ => None,
            },
            #[cfg(feature = "with-chrono")]
            "date_send" => match value {
                Value::Date(v) => {
                    let days = v.signed_duration_since(PG_EPOCH).num_days();
                    i32::try_from(days).ok().map(|d| d.to_be_bytes().to_vec())
                }
                _ => None,
            },
            #[cfg(feature = "with-chrono")]
            "time_send" => match value {
                Value::Time(v) => {
                    let micros = i64::from(v.num_seconds_from_midnight()) * 1_000_000
                        + i64::from(v.nanosecond() / 1_000);
                    Some(micros.to_be_bytes().to_vec())
                }
                _ => None,
            },
            #[cfg(feature = "with-chrono")]
            "timestamp_send" => match value {
                Value::Timestamp(v) => encode_pg_micros(v.signed_duration_since(pg_epoch())),
                _ => None,
            },
            #[cfg(feature = "with-chrono")]
            "timestamptz_send" => match value {
                Value::TimestampTz(v) => {
                    encode_pg_micros(v.signed_duration_since(pg_epoch_utc()))
                }
                _ => None,
            },
            #[cfg(feature = "with-rust-decimal")]
            "numeric_send" => match value {
                Value::Numeric(v) => Some(encode_numeric(v)),
                _ => None,
            },
            _ => None,
        }
    }

    fn decode(&self, sender: &str, bytes: &[u8]) -> Result<Value> {
        match sender {
            "boolsend" => match bytes {
                [v] => Ok(Value::Bool(*v != 0)),
                _ => Err(decode_len_error("bool", bytes.len())),
            },
            "int2send" => fixed(bytes, "int2").map(|b| Value::Int2(i16::from_be_bytes(b))),
            "int4send" => fixed(bytes, "int4").map(|b| Value::Int4(i32::from_be_bytes(b))),
            "int8send" => fixed(bytes, "int8").map(|b| Value::Int8(i64::from_be_bytes(b))),
            "oidsend" => {
                fixed(bytes, "oid").map(|b| Value::Int8(i64::from(u32::from_be_bytes(b))))
            }
            "float4send" => fixed(bytes, "float4").map(|b| Value::Float4(f32::from_be_bytes(b))),
            "float8send" => fixed(bytes, "float8").map(|b| Value::Float8(f64::from_be_bytes(b))),
            "textsend" | "varcharsend" | "bpcharsend" | "namesend" => {
                let s = simdutf8::basic::from_utf8(bytes)
                    .map_err(|e| Error::Decode(format!("invalid UTF-8 text: {e}")))?;
                Ok(Value::Text(s.to_string()))
            }
            "byteasend" => Ok(Value::Bytes(bytes.to_vec())),
            #[cfg(feature = "with-chrono")]
            "date_send" => {
                let days = i32::from_be_bytes(fixed(bytes, "date")?);
                PG_EPOCH
                    .checked_add_signed(Duration::days(i64::from(days)))
                    .map(Value::Date)
                    .ok_or_else(|| Error::Decode("date out of range".into()))
            }
            #[cfg(feature = "with-chrono")]
            "time_send" => {
                let micros = i64::from_be_bytes(fixed(bytes, "time")?);
                let secs = (micros / 1_000_000) as u32;
                let nanos = ((micros % 1_000_000) * 1_000) as u32;
                NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                    .map(Value::Time)
                    .ok_or_else(|| Error::Decode("time out of range".into()))
            }
            #[cfg(feature = "with-chrono")]
            "timestamp_send" => {
                let micros = i64::from_be_bytes(fixed(bytes, "timestamp")?);
                pg_epoch()
                    .checked_add_signed(Duration::microseconds(micros))
                    .map(Value::Timestamp)
                    .ok_or_else(|| Error::Decode("timestamp out of range".into()))
            }
            #[cfg(feature = "with-chrono")]
            "timestamptz_send" => {
                let micros = i64::from_be_bytes(fixed(bytes, "timestamptz")?);
                pg_epoch_utc()
                    .checked_add_signed(Duration::microseconds(micros))
                    .map(Value::TimestampTz)
                    .ok_or_else(|| Error::Decode("timestamptz out of range".into()))
            }
            #[cfg(feature = "with-rust-decimal")]
            "numeric_send" => decode_numeric(bytes),
            _ => Err(Error::Decode(format!("no decoder for sender {sender:?}"))),
        }
    }
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| decode_len_error(what, bytes.len()))
}

fn decode_len_error(what: &str, len: usize) -> Error {
    Error::Decode(format!("invalid {what} length: {len}"))
}

#[cfg(feature = "with-chrono")]
fn pg_epoch() -> NaiveDateTime {
    PG_EPOCH.and_hms_opt(0, 0, 0).expect("valid epoch")
}

#[cfg(feature = "with-chrono")]
fn pg_epoch_utc() -> DateTime<Utc> {
    Utc.from_utc_datetime(&pg_epoch())
}

#[cfg(feature = "with-chrono")]
fn encode_pg_micros(delta: Duration) -> Option<Vec<u8>> {
    delta
        .num_microseconds()
        .map(|micros| micros.to_be_bytes().to_vec())
}

// NUMERIC binary format:
// - ndigits: i16 - number of base-10000 digits
// - weight: i16 - power of 10000 of the first digit
// - sign: u16 - 0x0000 positive, 0x4000 negative, 0xC000 NaN,
//   0xD000 Infinity, 0xF000 -Infinity
// - dscale: u16 - display scale
// - digits: [u16] - base-10000 digits, most significant first
#[cfg(feature = "with-rust-decimal")]
const NUMERIC_POS: u16 = 0x0000;
#[cfg(feature = "with-rust-decimal")]
const NUMERIC_NEG: u16 = 0x4000;
#[cfg(feature = "with-rust-decimal")]
const NUMERIC_NAN: u16 = 0xC000;
#[cfg(feature = "with-rust-decimal")]
const NUMERIC_PINF: u16 = 0xD000;
#[cfg(feature = "with-rust-decimal")]
const NUMERIC_NINF: u16 = 0xF000;
#[cfg(feature = "with-rust-decimal")]
const NBASE: u128 = 10_000;

#[cfg(feature = "with-rust-decimal")]
fn encode_numeric(value: &Decimal) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);

    if value.is_zero() {
        buf.extend_from_slice(&0_i16.to_be_bytes()); // ndigits
        buf.extend_from_slice(&0_i16.to_be_bytes()); // weight
        buf.extend_from_slice(&NUMERIC_POS.to_be_bytes());
        buf.extend_from_slice(&(value.scale() as u16).to_be_bytes());
        return buf;
    }

    let dscale = value.scale() as u16;
    let mut mantissa = value.mantissa().unsigned_abs();
    let mut scale = value.scale();

    // Base-10000 digit groups must align with the decimal point: pad the
    // fractional part out to a whole number of groups.
    while scale % 4 != 0 {
        mantissa *= 10;
        scale += 1;
    }
    let frac_groups = (scale / 4) as i32;

    // Least-significant group first, then reverse.
    let mut digits: Vec<u16> = Vec::new();
    while mantissa > 0 {
        digits.push((mantissa % NBASE) as u16);
        mantissa /= NBASE;
    }
    digits.reverse();

    let weight = (digits.len() as i32 - 1 - frac_groups) as i16;
    let sign = if value.is_sign_negative() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    };

    buf.extend_from_slice(&(digits.len() as i16).to_be_bytes());
    buf.extend_from_slice(&weight.to_be_bytes());
    buf.extend_from_slice(&sign.to_be_bytes());
    buf.extend_from_slice(&dscale.to_be_bytes());
    for digit in &digits {
        buf.extend_from_slice(&digit.to_be_bytes());
    }
    buf
}

#[cfg(feature = "with-rust-decimal")]
fn decode_numeric(bytes: &[u8]) -> Result<Value> {
    if bytes.len() < 8 {
        return Err(decode_len_error("numeric", bytes.len()));
    }

    let ndigits = i16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let weight = i16::from_be_bytes([bytes[2], bytes[3]]) as i32;
    let sign = u16::from_be_bytes([bytes[4], bytes[5]]);
    let dscale = u16::from_be_bytes([bytes[6], bytes[7]]);

    // Special values carry ndigits == 0 and would otherwise read as zero.
    match sign {
        NUMERIC_NAN => {
            return Err(Error::Decode("NaN cannot be represented as Decimal".into()));
        }
        NUMERIC_PINF | NUMERIC_NINF => {
            return Err(Error::Decode(
                "infinity cannot be represented as Decimal".into(),
            ));
        }
        _ => {}
    }

    if ndigits == 0 {
        let mut zero = Decimal::ZERO;
        let _ = zero.set_scale(u32::from(dscale));
        return Ok(Value::Numeric(zero));
    }

    let expected_len = 8 + ndigits * 2;
    if bytes.len() < expected_len {
        return Err(decode_len_error("numeric", bytes.len()));
    }

    let mut value: i128 = 0;
    for i in 0..ndigits {
        let offset = 8 + i * 2;
        let digit = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        value = value
            .checked_mul(NBASE as i128)
            .and_then(|v| v.checked_add(i128::from(digit)))
            .ok_or_else(|| Error::Decode("numeric overflow".into()))?;
    }

    if sign == NUMERIC_NEG {
        value = -value;
    }

    // The integer read above is value * 10000^(weight - ndigits + 1).
    let exponent = (weight - ndigits as i32 + 1) * 4;
    let mut decimal = Decimal::from_i128_with_scale(value, 0);
    if exponent > 0 {
        for _ in 0..exponent {
            decimal = decimal
                .checked_mul(Decimal::TEN)
                .ok_or_else(|| Error::Decode("numeric overflow".into()))?;
        }
    } else if exponent < 0 {
        decimal
            .set_scale((-exponent) as u32)
            .map_err(|e| Error::Decode(format!("numeric scale error: {e}")))?;
    }

    if dscale > 0 {
        decimal = decimal.round_dp(u32::from(dscale));
    }

    Ok(Value::Numeric(decimal))
}
