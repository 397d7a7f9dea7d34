//! Twos-complement helpers over 256-bit words

use primitive_types::{U256, U512};
use std::cmp::Ordering;

/// Bit width of a word
pub const WORD_BITS: u64 = 256;

/// A word read as a signed 256-bit integer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct I256 {
    negative: bool,
    magnitude: U256,
}

impl I256 {
    /// Decode a twos-complement word
    pub fn from_u256(word: U256) -> Self {
        if word.bit(255) {
            Self {
                negative: true,
                magnitude: twos_complement(word),
            }
        } else {
            Self {
                negative: false,
                magnitude: word,
            }
        }
    }

    /// Build from sign and magnitude. A zero magnitude is never negative.
    pub fn new(negative: bool, magnitude: U256) -> Self {
        Self {
            negative: negative && !magnitude.is_zero(),
            magnitude,
        }
    }

    /// Encode as a twos-complement word (mod 2^256)
    pub fn to_u256(self) -> U256 {
        if self.negative {
            twos_complement(self.magnitude)
        } else {
            self.magnitude
        }
    }

    /// Sign
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Absolute value
    pub fn magnitude(&self) -> U256 {
        self.magnitude
    }

    /// Quotient truncated toward zero; division by zero yields zero.
    pub fn div(self, rhs: I256) -> I256 {
        if rhs.magnitude.is_zero() {
            return I256::new(false, U256::zero());
        }
        I256::new(self.negative != rhs.negative, self.magnitude / rhs.magnitude)
    }

    /// Remainder taking the sign of the dividend; modulo zero yields zero.
    pub fn rem(self, rhs: I256) -> I256 {
        if rhs.magnitude.is_zero() {
            return I256::new(false, U256::zero());
        }
        I256::new(self.negative, self.magnitude % rhs.magnitude)
    }
}

impl Ord for I256 {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
        }
    }
}

impl PartialOrd for I256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn twos_complement(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

/// Take the low 256 bits of a 512-bit value
fn truncate(value: U512) -> U256 {
    let U512(limbs) = value;
    U256([limbs[0], limbs[1], limbs[2], limbs[3]])
}

/// `(x + y) % m` without intermediate overflow; zero when `m` is zero.
pub fn add_mod(x: U256, y: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    truncate((U512::from(x) + U512::from(y)) % U512::from(m))
}

/// `(x * y) % m` without intermediate overflow; zero when `m` is zero.
pub fn mul_mod(x: U256, y: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    truncate(x.full_mul(y) % U512::from(m))
}

/// Shift left; zero once the shift reaches the word width.
pub fn shl(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(WORD_BITS) {
        U256::zero()
    } else {
        value << shift.as_usize()
    }
}

/// Logical shift right; zero once the shift reaches the word width.
pub fn shr(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(WORD_BITS) {
        U256::zero()
    } else {
        value >> shift.as_usize()
    }
}

/// Arithmetic shift right. Shifting a negative value by 256 or more gives -1.
pub fn sar(shift: U256, value: U256) -> U256 {
    let negative = value.bit(255);
    if shift >= U256::from(WORD_BITS) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let shift = shift.as_usize();
    if negative {
        !((!value) >> shift)
    } else {
        value >> shift
    }
}

/// Sign-extend `value` from its low `bits` bits.
pub fn sign_extend(value: U256, bits: usize) -> U256 {
    if bits == 0 || bits >= WORD_BITS as usize {
        return value;
    }
    let mask = (U256::one() << bits) - U256::one();
    if value.bit(bits - 1) {
        value | !mask
    } else {
        value & mask
    }
}
