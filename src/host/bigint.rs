//! Arbitrary-precision integer family: `TC_BigIntAdd/Sub/Mul/Div/Mod/Cmp`,
//! `TC_BigIntToInt64`.
//!
//! The wire representation in guest memory is decimal or auto-base: a
//! `0x`/`0X` prefix selects base 16, `0b`/`0B` selects base 2, a bare
//! leading `0` selects base 8, anything else is decimal. The host value is
//! `num_bigint::BigInt` re-exported as `crate::domain::value_objects::BigInt`.
//! Division/modulo by zero trap with `InvalidApiArgs` rather than panicking,
//! since `num-bigint` itself panics on a zero divisor.

use super::{charge, frame_memory, host_err, write_str};
use crate::domain::value_objects::BigInt;
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::gas::costs;
use num_traits::ToPrimitive;
use wasmi::{Caller, Linker};

/// Parses a BigInt operand in decimal or auto-detected base, per the
/// `0x`/`0X` → 16, `0b`/`0B` → 2, leading `0` → 8 prefix rules. An optional
/// leading `+`/`-` sign applies after the prefix is stripped.
fn parse_auto_base(s: &str) -> Result<BigInt, EngineError> {
    let s = s.trim();
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (radix, digits) = if let Some(d) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16, d)
    } else if let Some(d) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        (2, d)
    } else if rest.len() > 1 && rest.starts_with('0') {
        (8, &rest[1..])
    } else {
        (10, rest)
    };
    if digits.is_empty() {
        return Err(EngineError::InvalidApiArgs);
    }
    let value = BigInt::parse_bytes(digits.as_bytes(), radix).ok_or(EngineError::InvalidApiArgs)?;
    Ok(if neg { -value } else { value })
}

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_BigIntAdd", add)?;
    linker.func_wrap("env", "TC_BigIntSub", sub)?;
    linker.func_wrap("env", "TC_BigIntMul", mul)?;
    linker.func_wrap("env", "TC_BigIntDiv", div)?;
    linker.func_wrap("env", "TC_BigIntMod", rem)?;
    linker.func_wrap("env", "TC_BigIntCmp", cmp)?;
    linker.func_wrap("env", "TC_BigIntToInt64", to_int64)?;
    Ok(())
}

fn read_pair(caller: &mut Caller<'_, HostState>, a: u32, b: u32) -> Result<(BigInt, BigInt), wasmi::Error> {
    let mem = frame_memory(caller).map_err(host_err)?;
    let lhs = mem.get_string(caller, a).map_err(host_err)?;
    let rhs = mem.get_string(caller, b).map_err(host_err)?;
    let lhs = parse_auto_base(&lhs).map_err(host_err)?;
    let rhs = parse_auto_base(&rhs).map_err(host_err)?;
    Ok((lhs, rhs))
}

fn add(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let (lhs, rhs) = read_pair(&mut caller, a, b)?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &(lhs + rhs).to_string())
}

fn sub(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let (lhs, rhs) = read_pair(&mut caller, a, b)?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &(lhs - rhs).to_string())
}

fn mul(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let (lhs, rhs) = read_pair(&mut caller, a, b)?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &(lhs * rhs).to_string())
}

fn div(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let (lhs, rhs) = read_pair(&mut caller, a, b)?;
    if rhs == BigInt::from(0) {
        return Err(host_err(EngineError::InvalidApiArgs));
    }
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &(lhs / rhs).to_string())
}

fn rem(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let (lhs, rhs) = read_pair(&mut caller, a, b)?;
    if rhs == BigInt::from(0) {
        return Err(host_err(EngineError::InvalidApiArgs));
    }
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &(lhs % rhs).to_string())
}

fn cmp(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<i32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let (lhs, rhs) = read_pair(&mut caller, a, b)?;
    Ok(match lhs.cmp(&rhs) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    })
}

fn to_int64(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<i64, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let s = mem.get_string(&mut caller, ptr).map_err(host_err)?;
    let value = parse_auto_base(&s).map_err(host_err)?;
    Ok(truncate_to_i64(&value))
}

/// Truncates an arbitrary-precision value to its low 64 bits, two's
/// complement, matching native integer wraparound rather than failing on
/// out-of-`i64`-range input.
fn truncate_to_i64(value: &BigInt) -> i64 {
    if let Some(v) = value.to_i64() {
        return v;
    }
    let modulus = BigInt::from(u64::MAX) + BigInt::from(1u8);
    let wrapped = ((value % &modulus) + &modulus) % &modulus;
    wrapped.to_u64().expect("reduced modulo 2^64 fits in u64") as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_hex_binary_and_octal() {
        assert_eq!(parse_auto_base("26").unwrap(), BigInt::from(26));
        assert_eq!(parse_auto_base("0x1a").unwrap(), BigInt::from(26));
        assert_eq!(parse_auto_base("0X1A").unwrap(), BigInt::from(26));
        assert_eq!(parse_auto_base("0b11010").unwrap(), BigInt::from(26));
        assert_eq!(parse_auto_base("032").unwrap(), BigInt::from(26));
        assert_eq!(parse_auto_base("-0x1a").unwrap(), BigInt::from(-26));
    }

    #[test]
    fn rejects_empty_digits() {
        assert!(parse_auto_base("0x").is_err());
        assert!(parse_auto_base("").is_err());
    }

    #[test]
    fn truncate_passes_through_in_range_values() {
        assert_eq!(truncate_to_i64(&BigInt::from(-5)), -5);
        assert_eq!(truncate_to_i64(&BigInt::from(i64::MAX)), i64::MAX);
    }

    #[test]
    fn truncate_wraps_values_outside_i64_range() {
        let over = BigInt::from(i64::MAX) + BigInt::from(1);
        assert_eq!(truncate_to_i64(&over), i64::MIN);
        let two_pow_64 = BigInt::from(u64::MAX) + BigInt::from(1u8);
        assert_eq!(truncate_to_i64(&two_pow_64), 0);
    }
}
