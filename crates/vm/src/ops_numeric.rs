//! Bitwise, arithmetic, boolean and comparison opcodes.

use crate::{ExecutionEngine, OpCode, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

impl ExecutionEngine {
    pub(crate) fn execute_numeric_op(&mut self, opcode: OpCode) -> VmResult<()> {
        match opcode {
            OpCode::Invert => {
                let value = self.pop_int()?;
                self.push_integer(!value)
            }
            OpCode::And => self.binary_integer(|a, b| Ok(a & b)),
            OpCode::Or => self.binary_integer(|a, b| Ok(a | b)),
            OpCode::Xor => self.binary_integer(|a, b| Ok(a ^ b)),
            OpCode::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                let equal = a.equals(&b)?;
                self.push(StackItem::from_bool(equal))
            }
            OpCode::NotEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                let equal = a.equals(&b)?;
                self.push(StackItem::from_bool(!equal))
            }
            OpCode::Sign => {
                let value = self.pop_int()?;
                self.push(StackItem::from_int(value.signum()))
            }
            OpCode::Abs => {
                let value = self.pop_int()?;
                self.push_integer(value.abs())
            }
            OpCode::Negate => {
                let value = self.pop_int()?;
                self.push_integer(-value)
            }
            OpCode::Inc => {
                let value = self.pop_int()?;
                self.push_integer(value + 1)
            }
            OpCode::Dec => {
                let value = self.pop_int()?;
                self.push_integer(value - 1)
            }
            OpCode::Add => self.binary_integer(|a, b| Ok(a + b)),
            OpCode::Sub => self.binary_integer(|a, b| Ok(a - b)),
            OpCode::Mul => self.binary_integer(|a, b| Ok(a * b)),
            OpCode::Div => self.binary_integer(|a, b| {
                if b.is_zero() {
                    return Err(VmError::DivisionByZero);
                }
                Ok(a / b)
            }),
            OpCode::Mod => self.binary_integer(|a, b| {
                if b.is_zero() {
                    return Err(VmError::DivisionByZero);
                }
                Ok(a % b)
            }),
            OpCode::Pow => {
                let exponent = self.pop_int()?;
                let base = self.pop_int()?;
                let exponent = exponent
                    .to_u32()
                    .ok_or_else(|| VmError::OutOfRange("exponent outside u32".into()))?;
                self.push_integer(base.pow(exponent))
            }
            OpCode::Sqrt => {
                let value = self.pop_int()?;
                if value.is_negative() {
                    return Err(VmError::OutOfRange("SQRT of a negative value".into()));
                }
                self.push_integer(value.sqrt())
            }
            OpCode::ModMul => {
                let modulus = self.pop_int()?;
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                if modulus.is_zero() {
                    return Err(VmError::DivisionByZero);
                }
                self.push_integer((a * b) % modulus)
            }
            OpCode::ModPow => {
                let modulus = self.pop_int()?;
                let exponent = self.pop_int()?;
                let base = self.pop_int()?;
                if modulus.is_zero() {
                    return Err(VmError::DivisionByZero);
                }
                let result = if exponent == BigInt::from(-1) {
                    mod_inverse(&base, &modulus)
                        .ok_or_else(|| VmError::OutOfRange("no modular inverse".into()))?
                } else if exponent.is_negative() {
                    return Err(VmError::OutOfRange("negative exponent".into()));
                } else {
                    base.modpow(&exponent, &modulus)
                };
                self.push_integer(result)
            }
            OpCode::Shl => {
                let shift = self.pop_shift()?;
                let value = self.pop_int()?;
                if shift == 0 {
                    return self.push_integer(value);
                }
                self.push_integer(value << shift)
            }
            OpCode::Shr => {
                let shift = self.pop_shift()?;
                let value = self.pop_int()?;
                if shift == 0 {
                    return self.push_integer(value);
                }
                self.push_integer(value >> shift)
            }
            OpCode::Not => {
                let value = self.pop()?.to_boolean();
                self.push(StackItem::from_bool(!value))
            }
            OpCode::BoolAnd => {
                let b = self.pop()?.to_boolean();
                let a = self.pop()?.to_boolean();
                self.push(StackItem::from_bool(a && b))
            }
            OpCode::BoolOr => {
                let b = self.pop()?.to_boolean();
                let a = self.pop()?.to_boolean();
                self.push(StackItem::from_bool(a || b))
            }
            OpCode::Nz => {
                let value = self.pop_int()?;
                self.push(StackItem::from_bool(!value.is_zero()))
            }
            OpCode::NumEqual => self.compare_integers(|a, b| a == b),
            OpCode::NumNotEqual => self.compare_integers(|a, b| a != b),
            OpCode::Lt => self.compare_integers(|a, b| a < b),
            OpCode::Le => self.compare_integers(|a, b| a <= b),
            OpCode::Gt => self.compare_integers(|a, b| a > b),
            OpCode::Ge => self.compare_integers(|a, b| a >= b),
            OpCode::Min => self.binary_integer(|a, b| Ok(a.min(b))),
            OpCode::Max => self.binary_integer(|a, b| Ok(a.max(b))),
            OpCode::Within => {
                let upper = self.pop_int()?;
                let lower = self.pop_int()?;
                let value = self.pop_int()?;
                self.push(StackItem::from_bool(lower <= value && value < upper))
            }
            other => Err(VmError::InvalidOperation(format!(
                "{other:?} is not a numeric opcode"
            ))),
        }
    }

    fn binary_integer(
        &mut self,
        op: impl FnOnce(BigInt, BigInt) -> VmResult<BigInt>,
    ) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        let result = op(a, b)?;
        self.push_integer(result)
    }

    fn compare_integers(&mut self, compare: fn(&BigInt, &BigInt) -> bool) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(StackItem::from_bool(compare(&a, &b)))
    }

    fn pop_shift(&mut self) -> VmResult<u32> {
        let shift = self.pop_index()? as u32;
        if shift > self.limits().max_shift {
            return Err(VmError::OutOfRange(format!(
                "shift of {shift} exceeds {}",
                self.limits().max_shift
            )));
        }
        Ok(shift)
    }

    /// Pushes an integer after enforcing the 256-bit range.
    pub(crate) fn push_integer(&mut self, value: BigInt) -> VmResult<()> {
        ensure_integer_range(&value)?;
        self.push(StackItem::Integer(value))
    }
}

/// The representable range is [-2^255, 2^255).
fn ensure_integer_range(value: &BigInt) -> VmResult<()> {
    let bound = BigInt::one() << 255;
    if value >= &bound || value < &(-&bound) {
        return Err(VmError::IntegerOverflow);
    }
    Ok(())
}

/// Modular inverse by the extended Euclidean algorithm.
fn mod_inverse(value: &BigInt, modulus: &BigInt) -> Option<BigInt> {
    let modulus = modulus.abs();
    if modulus.is_one() {
        return Some(BigInt::zero());
    }
    let (mut old_r, mut r) = (value.mod_floor_like(&modulus), modulus.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    if !old_r.is_one() {
        return None;
    }
    Some(old_s.mod_floor_like(&modulus))
}

trait ModFloorLike {
    fn mod_floor_like(&self, modulus: &BigInt) -> BigInt;
}

impl ModFloorLike for BigInt {
    /// Euclidean remainder: always in [0, modulus).
    fn mod_floor_like(&self, modulus: &BigInt) -> BigInt {
        let remainder = self % modulus;
        if remainder.is_negative() {
            remainder + modulus
        } else {
            remainder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_inverse_of_three_mod_seven() {
        assert_eq!(
            mod_inverse(&BigInt::from(3), &BigInt::from(7)),
            Some(BigInt::from(5))
        );
        assert_eq!(mod_inverse(&BigInt::from(2), &BigInt::from(4)), None);
    }

    #[test]
    fn integer_range_bounds() {
        let max = (BigInt::one() << 255) - 1;
        assert!(ensure_integer_range(&max).is_ok());
        assert!(ensure_integer_range(&(BigInt::one() << 255)).is_err());
        assert!(ensure_integer_range(&(-(BigInt::one() << 255usize))).is_ok());
        assert!(ensure_integer_range(&(-(BigInt::one() << 255usize) - 1)).is_err());
    }
}
