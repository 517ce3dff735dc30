//! Tightly packed ABI encoding (`abi.encodePacked`)
//!
//! Each value is first run through the canonical ABI encoder and then cut down to
//! its packed form. Supported types:
//! - `bytes`, `string`: raw contents, no length prefix
//! - `bytesN`: the N left-aligned bytes
//! - `intN` / `uintN` (bare `int`/`uint` mean 256 bits): the N/8 low-order bytes
//! - `address`: the 20 low-order bytes
//! - `T[]` for any static scalar `T` above: the 32-byte element words, no offset or length

use crate::error::{ExecResult, SafeTxError};

use ethers::abi::{self, Token};
use ethers::types::U256;

const WORD: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    /// `bytes` or `string`
    Dynamic,
    FixedBytes(usize),
    Int { signed: bool, bytes: usize },
    Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackedType {
    Scalar(Scalar),
    Array(Scalar),
}

/// Encode an ordered list of `(type, value)` pairs back to back with no padding
pub fn encode_packed(params: &[(&str, Token)]) -> ExecResult<Vec<u8>> {
    let mut out = Vec::new();
    for (ty, value) in params {
        out.extend_from_slice(&encode_packed_value(ty, value)?);
    }
    Ok(out)
}

/// Packed encoding of a single value
pub fn encode_packed_value(ty: &str, value: &Token) -> ExecResult<Vec<u8>> {
    let packed_type = parse_type(ty)?;

    match (packed_type, value) {
        (PackedType::Scalar(scalar), _) => check_value(ty, scalar, value)?,
        (PackedType::Array(scalar), Token::Array(items)) => {
            for item in items {
                check_value(ty, scalar, item)?;
            }
        }
        (PackedType::Array(_), other) => {
            return Err(invalid_value(ty, format!("expected an array, got {:?}", other)));
        }
    }

    let canonical = abi::encode(std::slice::from_ref(value));

    let packed = match packed_type {
        PackedType::Array(_) => slice(ty, &canonical, 2 * WORD, canonical.len())?,
        PackedType::Scalar(Scalar::Dynamic) => {
            let len = U256::from_big_endian(slice(ty, &canonical, WORD, 2 * WORD)?);
            if len > U256::from(canonical.len()) {
                return Err(invalid_value(ty, "length word exceeds encoding".to_string()));
            }
            slice(ty, &canonical, 2 * WORD, 2 * WORD + len.as_usize())?
        }
        PackedType::Scalar(Scalar::FixedBytes(n)) => slice(ty, &canonical, 0, n)?,
        PackedType::Scalar(Scalar::Int { bytes, .. }) => slice(ty, &canonical, WORD - bytes, WORD)?,
        PackedType::Scalar(Scalar::Address) => slice(ty, &canonical, WORD - 20, WORD)?,
    };

    Ok(packed.to_vec())
}

fn parse_type(ty: &str) -> ExecResult<PackedType> {
    let unsupported = || SafeTxError::UnsupportedType(ty.to_string());

    if let Some(element) = ty.strip_suffix("[]") {
        // Only single-dimension arrays of static scalars
        return match parse_scalar(element) {
            Some(Scalar::Dynamic) | None => Err(unsupported()),
            Some(scalar) => Ok(PackedType::Array(scalar)),
        };
    }

    parse_scalar(ty).map(PackedType::Scalar).ok_or_else(unsupported)
}

fn parse_scalar(ty: &str) -> Option<Scalar> {
    match ty {
        "bytes" | "string" => return Some(Scalar::Dynamic),
        "address" => return Some(Scalar::Address),
        _ => {}
    }

    if let Some(width) = ty.strip_prefix("bytes") {
        let n = parse_digits(width)?;
        return (1..=WORD).contains(&n).then_some(Scalar::FixedBytes(n));
    }
    if let Some(width) = ty.strip_prefix("uint") {
        return int_bytes(width).map(|bytes| Scalar::Int { signed: false, bytes });
    }
    if let Some(width) = ty.strip_prefix("int") {
        return int_bytes(width).map(|bytes| Scalar::Int { signed: true, bytes });
    }
    None
}

fn int_bytes(width: &str) -> Option<usize> {
    if width.is_empty() {
        return Some(WORD);
    }
    let bits = parse_digits(width)?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits / 8)
}

fn parse_digits(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn check_value(ty: &str, scalar: Scalar, value: &Token) -> ExecResult<()> {
    match (scalar, value) {
        (Scalar::Dynamic, Token::Bytes(_) | Token::String(_)) => Ok(()),
        (Scalar::Address, Token::Address(_)) => Ok(()),
        (Scalar::FixedBytes(n), Token::FixedBytes(bytes)) => {
            if bytes.len() == n {
                Ok(())
            } else {
                Err(invalid_value(ty, format!("expected {} bytes, got {}", n, bytes.len())))
            }
        }
        (Scalar::Int { signed: false, bytes }, Token::Uint(v)) => {
            if v.bits() <= bytes * 8 {
                Ok(())
            } else {
                Err(invalid_value(ty, format!("{} overflows {} bits", v, bytes * 8)))
            }
        }
        (Scalar::Int { signed: true, bytes }, Token::Int(v)) => {
            if fits_signed(*v, bytes) {
                Ok(())
            } else {
                Err(invalid_value(ty, format!("{:#x} overflows {} bits", v, bytes * 8)))
            }
        }
        (_, other) => Err(invalid_value(ty, format!("mismatched token {:?}", other))),
    }
}

/// Two's complement range check: every dropped high byte must be sign extension
fn fits_signed(value: U256, bytes: usize) -> bool {
    if bytes == WORD {
        return true;
    }
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    let (head, tail) = word.split_at(WORD - bytes);
    let fill = if tail[0] & 0x80 != 0 { 0xff } else { 0x00 };
    head.iter().all(|b| *b == fill)
}

fn slice<'a>(ty: &str, data: &'a [u8], start: usize, end: usize) -> ExecResult<&'a [u8]> {
    data.get(start..end)
        .ok_or_else(|| invalid_value(ty, format!("canonical encoding too short ({} bytes)", data.len())))
}

fn invalid_value(ty: &str, message: String) -> SafeTxError {
    SafeTxError::InvalidValue {
        ty: ty.to_string(),
        message,
    }
}
