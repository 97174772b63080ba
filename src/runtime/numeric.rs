// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Numeric instruction semantics.
//!
//! Integer arithmetic is modulo 2^n over the unsigned representation, with
//! signedness applied per operator. Float operations follow IEEE-754 with
//! the WASM-specific refinements: `min`/`max` return NaN if either operand
//! is one and order the zero signs, `nearest` rounds ties to even, and
//! float-to-integer truncation traps on NaN and out-of-range inputs.

use crate::runtime::RuntimeError;
use crate::runtime::Trap;
use crate::runtime::stack::ValueStack;
use crate::types::Opcode;
use crate::values::{Value, f32_canonical_nan, f64_canonical_nan};

/// Apply an immediate-free numeric operator to the operand stack.
pub(crate) fn apply(op: Opcode, stack: &mut ValueStack) -> Result<(), RuntimeError> {
    use Opcode::*;

    macro_rules! iunop32 {
        ($f:expr) => {{
            let a = stack.pop_i32()?;
            stack.push(Value::I32($f(a)));
        }};
    }
    macro_rules! iunop64 {
        ($f:expr) => {{
            let a = stack.pop_i64()?;
            stack.push(Value::I64($f(a)));
        }};
    }
    macro_rules! ibin32 {
        ($f:expr) => {{
            let b = stack.pop_i32()?;
            let a = stack.pop_i32()?;
            stack.push(Value::I32($f(a, b)));
        }};
    }
    macro_rules! ibin64 {
        ($f:expr) => {{
            let b = stack.pop_i64()?;
            let a = stack.pop_i64()?;
            stack.push(Value::I64($f(a, b)));
        }};
    }
    macro_rules! ibin32_trap {
        ($f:expr) => {{
            let b = stack.pop_i32()?;
            let a = stack.pop_i32()?;
            stack.push(Value::I32($f(a, b)?));
        }};
    }
    macro_rules! ibin64_trap {
        ($f:expr) => {{
            let b = stack.pop_i64()?;
            let a = stack.pop_i64()?;
            stack.push(Value::I64($f(a, b)?));
        }};
    }
    macro_rules! irel32 {
        ($f:expr) => {{
            let b = stack.pop_i32()?;
            let a = stack.pop_i32()?;
            stack.push(Value::I32(u32::from($f(a, b))));
        }};
    }
    macro_rules! irel64 {
        ($f:expr) => {{
            let b = stack.pop_i64()?;
            let a = stack.pop_i64()?;
            stack.push(Value::I32(u32::from($f(a, b))));
        }};
    }
    macro_rules! funop32 {
        ($f:expr) => {{
            let a = stack.pop_f32()?;
            stack.push(Value::F32($f(a)));
        }};
    }
    macro_rules! funop64 {
        ($f:expr) => {{
            let a = stack.pop_f64()?;
            stack.push(Value::F64($f(a)));
        }};
    }
    macro_rules! fbin32 {
        ($f:expr) => {{
            let b = stack.pop_f32()?;
            let a = stack.pop_f32()?;
            stack.push(Value::F32($f(a, b)));
        }};
    }
    macro_rules! fbin64 {
        ($f:expr) => {{
            let b = stack.pop_f64()?;
            let a = stack.pop_f64()?;
            stack.push(Value::F64($f(a, b)));
        }};
    }
    macro_rules! frel32 {
        ($f:expr) => {{
            let b = stack.pop_f32()?;
            let a = stack.pop_f32()?;
            stack.push(Value::I32(u32::from($f(a, b))));
        }};
    }
    macro_rules! frel64 {
        ($f:expr) => {{
            let b = stack.pop_f64()?;
            let a = stack.pop_f64()?;
            stack.push(Value::I32(u32::from($f(a, b))));
        }};
    }

    match op {
        // Test operators.
        I32Eqz => {
            let a = stack.pop_i32()?;
            stack.push(Value::I32(u32::from(a == 0)));
        }
        I64Eqz => {
            let a = stack.pop_i64()?;
            stack.push(Value::I32(u32::from(a == 0)));
        }

        // i32 comparisons.
        I32Eq => irel32!(|a, b| a == b),
        I32Ne => irel32!(|a, b| a != b),
        I32LtS => irel32!(|a: u32, b: u32| (a as i32) < (b as i32)),
        I32LtU => irel32!(|a, b| a < b),
        I32GtS => irel32!(|a: u32, b: u32| (a as i32) > (b as i32)),
        I32GtU => irel32!(|a, b| a > b),
        I32LeS => irel32!(|a: u32, b: u32| (a as i32) <= (b as i32)),
        I32LeU => irel32!(|a, b| a <= b),
        I32GeS => irel32!(|a: u32, b: u32| (a as i32) >= (b as i32)),
        I32GeU => irel32!(|a, b| a >= b),

        // i64 comparisons.
        I64Eq => irel64!(|a, b| a == b),
        I64Ne => irel64!(|a, b| a != b),
        I64LtS => irel64!(|a: u64, b: u64| (a as i64) < (b as i64)),
        I64LtU => irel64!(|a, b| a < b),
        I64GtS => irel64!(|a: u64, b: u64| (a as i64) > (b as i64)),
        I64GtU => irel64!(|a, b| a > b),
        I64LeS => irel64!(|a: u64, b: u64| (a as i64) <= (b as i64)),
        I64LeU => irel64!(|a, b| a <= b),
        I64GeS => irel64!(|a: u64, b: u64| (a as i64) >= (b as i64)),
        I64GeU => irel64!(|a, b| a >= b),

        // f32 comparisons (NaN compares false except through `ne`).
        F32Eq => frel32!(|a, b| a == b),
        F32Ne => frel32!(|a, b| a != b),
        F32Lt => frel32!(|a, b| a < b),
        F32Gt => frel32!(|a, b| a > b),
        F32Le => frel32!(|a, b| a <= b),
        F32Ge => frel32!(|a, b| a >= b),

        // f64 comparisons.
        F64Eq => frel64!(|a, b| a == b),
        F64Ne => frel64!(|a, b| a != b),
        F64Lt => frel64!(|a, b| a < b),
        F64Gt => frel64!(|a, b| a > b),
        F64Le => frel64!(|a, b| a <= b),
        F64Ge => frel64!(|a, b| a >= b),

        // i32 unary.
        I32Clz => iunop32!(u32::leading_zeros),
        I32Ctz => iunop32!(u32::trailing_zeros),
        I32Popcnt => iunop32!(u32::count_ones),

        // i64 unary.
        I64Clz => iunop64!(|a: u64| u64::from(a.leading_zeros())),
        I64Ctz => iunop64!(|a: u64| u64::from(a.trailing_zeros())),
        I64Popcnt => iunop64!(|a: u64| u64::from(a.count_ones())),

        // i32 binary.
        I32Add => ibin32!(u32::wrapping_add),
        I32Sub => ibin32!(u32::wrapping_sub),
        I32Mul => ibin32!(u32::wrapping_mul),
        I32DivS => ibin32_trap!(div_s32),
        I32DivU => ibin32_trap!(div_u32),
        I32RemS => ibin32_trap!(rem_s32),
        I32RemU => ibin32_trap!(rem_u32),
        I32And => ibin32!(|a, b| a & b),
        I32Or => ibin32!(|a, b| a | b),
        I32Xor => ibin32!(|a, b| a ^ b),
        I32Shl => ibin32!(u32::wrapping_shl),
        I32ShrS => ibin32!(|a: u32, b: u32| (a as i32).wrapping_shr(b) as u32),
        I32ShrU => ibin32!(u32::wrapping_shr),
        I32Rotl => ibin32!(|a: u32, b: u32| a.rotate_left(b % 32)),
        I32Rotr => ibin32!(|a: u32, b: u32| a.rotate_right(b % 32)),

        // i64 binary.
        I64Add => ibin64!(u64::wrapping_add),
        I64Sub => ibin64!(u64::wrapping_sub),
        I64Mul => ibin64!(u64::wrapping_mul),
        I64DivS => ibin64_trap!(div_s64),
        I64DivU => ibin64_trap!(div_u64),
        I64RemS => ibin64_trap!(rem_s64),
        I64RemU => ibin64_trap!(rem_u64),
        I64And => ibin64!(|a, b| a & b),
        I64Or => ibin64!(|a, b| a | b),
        I64Xor => ibin64!(|a, b| a ^ b),
        I64Shl => ibin64!(|a: u64, b: u64| a.wrapping_shl(b as u32)),
        I64ShrS => ibin64!(|a: u64, b: u64| (a as i64).wrapping_shr(b as u32) as u64),
        I64ShrU => ibin64!(|a: u64, b: u64| a.wrapping_shr(b as u32)),
        I64Rotl => ibin64!(|a: u64, b: u64| a.rotate_left((b % 64) as u32)),
        I64Rotr => ibin64!(|a: u64, b: u64| a.rotate_right((b % 64) as u32)),

        // f32 unary.
        F32Abs => funop32!(f32::abs),
        F32Neg => funop32!(|a: f32| -a),
        F32Ceil => funop32!(f32::ceil),
        F32Floor => funop32!(f32::floor),
        F32Trunc => funop32!(f32::trunc),
        F32Nearest => funop32!(f32::round_ties_even),
        F32Sqrt => funop32!(f32::sqrt),

        // f64 unary.
        F64Abs => funop64!(f64::abs),
        F64Neg => funop64!(|a: f64| -a),
        F64Ceil => funop64!(f64::ceil),
        F64Floor => funop64!(f64::floor),
        F64Trunc => funop64!(f64::trunc),
        F64Nearest => funop64!(f64::round_ties_even),
        F64Sqrt => funop64!(f64::sqrt),

        // f32 binary.
        F32Add => fbin32!(|a, b| a + b),
        F32Sub => fbin32!(|a, b| a - b),
        F32Mul => fbin32!(|a, b| a * b),
        F32Div => fbin32!(|a, b| a / b),
        F32Min => fbin32!(fmin32),
        F32Max => fbin32!(fmax32),
        F32Copysign => fbin32!(f32::copysign),

        // f64 binary.
        F64Add => fbin64!(|a, b| a + b),
        F64Sub => fbin64!(|a, b| a - b),
        F64Mul => fbin64!(|a, b| a * b),
        F64Div => fbin64!(|a, b| a / b),
        F64Min => fbin64!(fmin64),
        F64Max => fbin64!(fmax64),
        F64Copysign => fbin64!(f64::copysign),

        // Conversions.
        I32WrapI64 => {
            let a = stack.pop_i64()?;
            stack.push(Value::I32(a as u32));
        }
        I32TruncF32S => {
            let a = stack.pop_f32()?;
            stack.push(Value::I32(trunc_to_i32(f64::from(a))?));
        }
        I32TruncF32U => {
            let a = stack.pop_f32()?;
            stack.push(Value::I32(trunc_to_u32(f64::from(a))?));
        }
        I32TruncF64S => {
            let a = stack.pop_f64()?;
            stack.push(Value::I32(trunc_to_i32(a)?));
        }
        I32TruncF64U => {
            let a = stack.pop_f64()?;
            stack.push(Value::I32(trunc_to_u32(a)?));
        }
        I64ExtendI32S => {
            let a = stack.pop_i32()?;
            stack.push(Value::I64((i64::from(a as i32)) as u64));
        }
        I64ExtendI32U => {
            let a = stack.pop_i32()?;
            stack.push(Value::I64(u64::from(a)));
        }
        I64TruncF32S => {
            let a = stack.pop_f32()?;
            stack.push(Value::I64(trunc_to_i64(f64::from(a))?));
        }
        I64TruncF32U => {
            let a = stack.pop_f32()?;
            stack.push(Value::I64(trunc_to_u64(f64::from(a))?));
        }
        I64TruncF64S => {
            let a = stack.pop_f64()?;
            stack.push(Value::I64(trunc_to_i64(a)?));
        }
        I64TruncF64U => {
            let a = stack.pop_f64()?;
            stack.push(Value::I64(trunc_to_u64(a)?));
        }
        F32ConvertI32S => {
            let a = stack.pop_i32()?;
            stack.push(Value::F32((a as i32) as f32));
        }
        F32ConvertI32U => {
            let a = stack.pop_i32()?;
            stack.push(Value::F32(a as f32));
        }
        F32ConvertI64S => {
            let a = stack.pop_i64()?;
            stack.push(Value::F32((a as i64) as f32));
        }
        F32ConvertI64U => {
            let a = stack.pop_i64()?;
            stack.push(Value::F32(a as f32));
        }
        F32DemoteF64 => {
            let a = stack.pop_f64()?;
            stack.push(Value::F32(a as f32));
        }
        F64ConvertI32S => {
            let a = stack.pop_i32()?;
            stack.push(Value::F64(f64::from(a as i32)));
        }
        F64ConvertI32U => {
            let a = stack.pop_i32()?;
            stack.push(Value::F64(f64::from(a)));
        }
        F64ConvertI64S => {
            let a = stack.pop_i64()?;
            stack.push(Value::F64((a as i64) as f64));
        }
        F64ConvertI64U => {
            let a = stack.pop_i64()?;
            stack.push(Value::F64(a as f64));
        }
        F64PromoteF32 => {
            let a = stack.pop_f32()?;
            stack.push(Value::F64(f64::from(a)));
        }
        I32ReinterpretF32 => {
            let a = stack.pop_f32()?;
            stack.push(Value::I32(a.to_bits()));
        }
        I64ReinterpretF64 => {
            let a = stack.pop_f64()?;
            stack.push(Value::I64(a.to_bits()));
        }
        F32ReinterpretI32 => {
            let a = stack.pop_i32()?;
            stack.push(Value::F32(f32::from_bits(a)));
        }
        F64ReinterpretI64 => {
            let a = stack.pop_i64()?;
            stack.push(Value::F64(f64::from_bits(a)));
        }

        _ => return Err(RuntimeError::Internal("non-numeric opcode dispatched")),
    }
    Ok(())
}

fn div_s32(a: u32, b: u32) -> Result<u32, Trap> {
    let (a, b) = (a as i32, b as i32);
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    if a == i32::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a.wrapping_div(b) as u32)
}

fn div_u32(a: u32, b: u32) -> Result<u32, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(a / b)
}

fn rem_s32(a: u32, b: u32) -> Result<u32, Trap> {
    let (a, b) = (a as i32, b as i32);
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    // i32::MIN % -1 is 0, not an overflow.
    Ok(a.wrapping_rem(b) as u32)
}

fn rem_u32(a: u32, b: u32) -> Result<u32, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(a % b)
}

fn div_s64(a: u64, b: u64) -> Result<u64, Trap> {
    let (a, b) = (a as i64, b as i64);
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    if a == i64::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a.wrapping_div(b) as u64)
}

fn div_u64(a: u64, b: u64) -> Result<u64, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(a / b)
}

fn rem_s64(a: u64, b: u64) -> Result<u64, Trap> {
    let (a, b) = (a as i64, b as i64);
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(a.wrapping_rem(b) as u64)
}

fn rem_u64(a: u64, b: u64) -> Result<u64, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(a % b)
}

// WASM min/max: NaN if either operand is NaN, and -0 orders below +0.

fn fmin32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        return f32_canonical_nan();
    }
    if a == b {
        // min(+0, -0) = -0.
        return if a.is_sign_negative() { a } else { b };
    }
    if a < b { a } else { b }
}

fn fmax32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        return f32_canonical_nan();
    }
    if a == b {
        // max(+0, -0) = +0.
        return if a.is_sign_positive() { a } else { b };
    }
    if a > b { a } else { b }
}

fn fmin64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64_canonical_nan();
    }
    if a == b {
        return if a.is_sign_negative() { a } else { b };
    }
    if a < b { a } else { b }
}

fn fmax64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64_canonical_nan();
    }
    if a == b {
        return if a.is_sign_positive() { a } else { b };
    }
    if a > b { a } else { b }
}

// Float-to-integer truncation. NaN is an invalid conversion; a truncated
// value outside the target range is an overflow. All checks run in f64,
// which represents every f32 and every range boundary exactly.

fn trunc_checked(x: f64) -> Result<f64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    Ok(x.trunc())
}

fn trunc_to_i32(x: f64) -> Result<u32, Trap> {
    let t = trunc_checked(x)?;
    if t < -2_147_483_648.0 || t >= 2_147_483_648.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok((t as i32) as u32)
}

fn trunc_to_u32(x: f64) -> Result<u32, Trap> {
    let t = trunc_checked(x)?;
    if t <= -1.0 || t >= 4_294_967_296.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u32)
}

fn trunc_to_i64(x: f64) -> Result<u64, Trap> {
    let t = trunc_checked(x)?;
    if t < -9_223_372_036_854_775_808.0 || t >= 9_223_372_036_854_775_808.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok((t as i64) as u64)
}

fn trunc_to_u64(x: f64) -> Result<u64, Trap> {
    let t = trunc_checked(x)?;
    if t <= -1.0 || t >= 18_446_744_073_709_551_616.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{f32_is_arithmetic_nan, f32_is_canonical_nan, f64_is_arithmetic_nan};
    use quickcheck_macros::quickcheck;

    fn run_binop(op: Opcode, a: Value, b: Value) -> Result<Value, RuntimeError> {
        let mut stack = ValueStack::new();
        stack.push(a);
        stack.push(b);
        apply(op, &mut stack)?;
        stack.pop()
    }

    fn run_unop(op: Opcode, a: Value) -> Result<Value, RuntimeError> {
        let mut stack = ValueStack::new();
        stack.push(a);
        apply(op, &mut stack)?;
        stack.pop()
    }

    #[test]
    fn i32_add_wraps() {
        assert_eq!(
            run_binop(Opcode::I32Add, Value::I32(0x7fff_ffff), Value::I32(1)),
            Ok(Value::I32(0x8000_0000))
        );
    }

    #[test]
    fn division_semantics() {
        // Division by zero traps, signed and unsigned.
        assert_eq!(
            run_binop(Opcode::I32DivS, Value::I32(10), Value::I32(0)),
            Err(RuntimeError::Trap(Trap::IntegerDivideByZero))
        );
        assert_eq!(
            run_binop(Opcode::I32DivU, Value::I32(10), Value::I32(0)),
            Err(RuntimeError::Trap(Trap::IntegerDivideByZero))
        );

        // INT_MIN / -1 overflows.
        assert_eq!(
            run_binop(
                Opcode::I32DivS,
                Value::from(i32::MIN),
                Value::from(-1i32)
            ),
            Err(RuntimeError::Trap(Trap::IntegerOverflow))
        );
        assert_eq!(
            run_binop(
                Opcode::I64DivS,
                Value::from(i64::MIN),
                Value::from(-1i64)
            ),
            Err(RuntimeError::Trap(Trap::IntegerOverflow))
        );

        // Signed division truncates toward zero: 7 / -2 = -3.
        assert_eq!(
            run_binop(Opcode::I32DivS, Value::from(7i32), Value::from(-2i32)),
            Ok(Value::I32(0xffff_fffd))
        );

        // INT_MIN % -1 is 0, not a trap.
        assert_eq!(
            run_binop(
                Opcode::I32RemS,
                Value::from(i32::MIN),
                Value::from(-1i32)
            ),
            Ok(Value::I32(0))
        );

        // Signed remainder takes the dividend's sign.
        assert_eq!(
            run_binop(Opcode::I32RemS, Value::from(-7i32), Value::from(2i32)),
            Ok(Value::from(-1i32))
        );
    }

    #[test]
    fn shift_counts_wrap_modulo_width() {
        assert_eq!(
            run_binop(Opcode::I32Shl, Value::I32(1), Value::I32(33)),
            Ok(Value::I32(2))
        );
        assert_eq!(
            run_binop(Opcode::I64Shl, Value::I64(1), Value::I64(65)),
            Ok(Value::I64(2))
        );
        assert_eq!(
            run_binop(Opcode::I32ShrS, Value::from(-8i32), Value::I32(34)),
            Ok(Value::from(-2i32))
        );
        assert_eq!(
            run_binop(Opcode::I32Rotl, Value::I32(0x8000_0001), Value::I32(1)),
            Ok(Value::I32(3))
        );
        assert_eq!(
            run_binop(Opcode::I32Rotr, Value::I32(3), Value::I32(33)),
            Ok(Value::I32(0x8000_0001))
        );
    }

    #[test]
    fn bit_counting_on_zero() {
        assert_eq!(run_unop(Opcode::I32Clz, Value::I32(0)), Ok(Value::I32(32)));
        assert_eq!(run_unop(Opcode::I32Ctz, Value::I32(0)), Ok(Value::I32(32)));
        assert_eq!(
            run_unop(Opcode::I32Popcnt, Value::I32(0)),
            Ok(Value::I32(0))
        );
        assert_eq!(run_unop(Opcode::I64Clz, Value::I64(0)), Ok(Value::I64(64)));
    }

    #[test]
    fn float_special_values() {
        // inf - inf = NaN, 0/0 = NaN.
        let diff = run_unop_pair_f64(Opcode::F64Sub, f64::INFINITY, f64::INFINITY);
        assert!(f64_is_arithmetic_nan(diff));
        let quot = run_unop_pair_f64(Opcode::F64Div, 0.0, 0.0);
        assert!(f64_is_arithmetic_nan(quot));

        // x/0 for x != 0 is a signed infinity.
        assert_eq!(run_unop_pair_f64(Opcode::F64Div, 1.0, 0.0), f64::INFINITY);
        assert_eq!(
            run_unop_pair_f64(Opcode::F64Div, -1.0, 0.0),
            f64::NEG_INFINITY
        );
        assert_eq!(
            run_unop_pair_f64(Opcode::F64Div, 1.0, -0.0),
            f64::NEG_INFINITY
        );
    }

    fn run_unop_pair_f64(op: Opcode, a: f64, b: f64) -> f64 {
        match run_binop(op, Value::F64(a), Value::F64(b)) {
            Ok(Value::F64(v)) => v,
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn min_max_zero_signs() {
        let min = run_binop(Opcode::F32Min, Value::F32(0.0), Value::F32(-0.0)).unwrap();
        assert_eq!(min.to_bits(), u64::from(0x8000_0000u32)); // -0.0

        let max = run_binop(Opcode::F32Max, Value::F32(-0.0), Value::F32(0.0)).unwrap();
        assert_eq!(max.to_bits(), 0); // +0.0
    }

    #[test]
    fn min_max_nan() {
        let min = run_binop(Opcode::F32Min, Value::F32(1.0), Value::F32(f32::NAN)).unwrap();
        match min {
            Value::F32(v) => assert!(f32_is_canonical_nan(v)),
            other => panic!("unexpected result {other:?}"),
        }
        let max = run_binop(Opcode::F64Max, Value::F64(f64::NAN), Value::F64(1.0)).unwrap();
        match max {
            Value::F64(v) => assert!(f64_is_arithmetic_nan(v)),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn nearest_rounds_ties_to_even() {
        for (input, expected) in [
            (2.5f64, 2.0f64),
            (3.5, 4.0),
            (-2.5, -2.0),
            (0.5, 0.0),
            (1.5, 2.0),
        ] {
            assert_eq!(
                run_unop(Opcode::F64Nearest, Value::F64(input)),
                Ok(Value::F64(expected))
            );
        }
    }

    #[test]
    fn nearest_of_nan_is_arithmetic_nan() {
        let result = run_unop(Opcode::F32Nearest, Value::F32(f32::NAN)).unwrap();
        match result {
            Value::F32(v) => assert!(f32_is_arithmetic_nan(v)),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn sqrt_signs() {
        let neg_zero = run_unop(Opcode::F64Sqrt, Value::F64(-0.0)).unwrap();
        assert_eq!(neg_zero.to_bits(), 0x8000_0000_0000_0000); // sqrt(-0) = -0

        let neg = run_unop(Opcode::F64Sqrt, Value::F64(-1.0)).unwrap();
        match neg {
            Value::F64(v) => assert!(v.is_nan()),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn copysign_transplants_the_sign_bit() {
        assert_eq!(
            run_binop(Opcode::F32Copysign, Value::F32(1.5), Value::F32(-0.0)),
            Ok(Value::F32(-1.5))
        );
        assert_eq!(
            run_binop(Opcode::F64Copysign, Value::F64(-1.5), Value::F64(2.0)),
            Ok(Value::F64(1.5))
        );
    }

    #[test]
    fn truncation_traps() {
        // NaN is an invalid conversion.
        assert_eq!(
            run_unop(Opcode::I32TruncF32S, Value::F32(f32::NAN)),
            Err(RuntimeError::Trap(Trap::InvalidConversionToInteger))
        );
        // Infinities and out-of-range values overflow.
        assert_eq!(
            run_unop(Opcode::I32TruncF32S, Value::F32(f32::INFINITY)),
            Err(RuntimeError::Trap(Trap::IntegerOverflow))
        );
        assert_eq!(
            run_unop(Opcode::I32TruncF64S, Value::F64(2_147_483_648.0)),
            Err(RuntimeError::Trap(Trap::IntegerOverflow))
        );
        assert_eq!(
            run_unop(Opcode::I32TruncF64U, Value::F64(-1.0)),
            Err(RuntimeError::Trap(Trap::IntegerOverflow))
        );

        // Boundary values convert exactly.
        assert_eq!(
            run_unop(Opcode::I32TruncF64S, Value::F64(-2_147_483_648.0)),
            Ok(Value::from(i32::MIN))
        );
        assert_eq!(
            run_unop(Opcode::I32TruncF64U, Value::F64(4_294_967_295.0)),
            Ok(Value::I32(u32::MAX))
        );
        // Fractions truncate toward zero; -0.9 truncates to 0 for u32.
        assert_eq!(
            run_unop(Opcode::I32TruncF64U, Value::F64(-0.9)),
            Ok(Value::I32(0))
        );
        assert_eq!(
            run_unop(Opcode::I64TruncF64S, Value::F64(-9_223_372_036_854_775_808.0)),
            Ok(Value::from(i64::MIN))
        );
    }

    #[test]
    fn extension_and_wrap() {
        assert_eq!(
            run_unop(Opcode::I64ExtendI32S, Value::from(-1i32)),
            Ok(Value::from(-1i64))
        );
        assert_eq!(
            run_unop(Opcode::I64ExtendI32U, Value::from(-1i32)),
            Ok(Value::I64(0xffff_ffff))
        );
        assert_eq!(
            run_unop(Opcode::I32WrapI64, Value::I64(0x1_2345_6789)),
            Ok(Value::I32(0x2345_6789))
        );
    }

    #[test]
    fn reinterpret_preserves_bits() {
        assert_eq!(
            run_unop(Opcode::I32ReinterpretF32, Value::F32(1.0)),
            Ok(Value::I32(0x3f80_0000))
        );
        assert_eq!(
            run_unop(Opcode::F32ReinterpretI32, Value::I32(0x3f80_0000)),
            Ok(Value::F32(1.0))
        );
        assert_eq!(
            run_unop(Opcode::F64ReinterpretI64, Value::I64(0x3ff0_0000_0000_0000)),
            Ok(Value::F64(1.0))
        );
    }

    #[test]
    fn conversion_rounds_to_nearest() {
        // u64::MAX is not representable in f32; conversion rounds.
        assert_eq!(
            run_unop(Opcode::F32ConvertI64U, Value::I64(u64::MAX)),
            Ok(Value::F32(18_446_744_073_709_551_616.0))
        );
        assert_eq!(
            run_unop(Opcode::F64ConvertI32S, Value::from(-5i32)),
            Ok(Value::F64(-5.0))
        );
    }

    #[quickcheck]
    fn add_is_modular(a: u32, b: u32) -> bool {
        let expected = ((u64::from(a) + u64::from(b)) % (1u64 << 32)) as u32;
        run_binop(Opcode::I32Add, Value::I32(a), Value::I32(b)) == Ok(Value::I32(expected))
    }

    #[quickcheck]
    fn sub_is_modular(a: u32, b: u32) -> bool {
        let expected = (u64::from(a).wrapping_sub(u64::from(b)) % (1u64 << 32)) as u32;
        run_binop(Opcode::I32Sub, Value::I32(a), Value::I32(b)) == Ok(Value::I32(expected))
    }

    #[quickcheck]
    fn mul_is_modular(a: u32, b: u32) -> bool {
        let expected = ((u64::from(a) * u64::from(b)) % (1u64 << 32)) as u32;
        run_binop(Opcode::I32Mul, Value::I32(a), Value::I32(b)) == Ok(Value::I32(expected))
    }

    #[quickcheck]
    fn float_binops_propagate_nan(a: f64) -> bool {
        let ops = [Opcode::F64Add, Opcode::F64Sub, Opcode::F64Mul, Opcode::F64Div];
        ops.iter().all(|&op| {
            match run_binop(op, Value::F64(a), Value::F64(f64::NAN)) {
                Ok(Value::F64(v)) => f64_is_arithmetic_nan(v),
                _ => false,
            }
        })
    }
}
