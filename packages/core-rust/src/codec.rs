//! Order-preserving numeric codec.
//!
//! Maps IEEE-754 doubles onto `u64` so that unsigned integer comparison of the
//! encoded terms agrees with floating-point comparison of the inputs. The
//! encoded `u64` is the plaintext handed to the order-revealing cipher.
//!
//! # Transform
//!
//! The float's bit pattern is reinterpreted as a `u64`. Non-negative values
//! get their sign bit set; negative values have every bit complemented. This
//! places all negatives below all non-negatives and reverses the magnitude
//! ordering of negatives, which is what two's-complement-free sign-magnitude
//! floats need. `-0.0` is folded into `+0.0` first so that both encode to the
//! same term.

use crate::error::DomainError;

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Smallest encodable term.
pub const TERM_MIN: u64 = u64::MIN;

/// Largest encodable term.
pub const TERM_MAX: u64 = u64::MAX;

/// Encodes a double into an order-preserving `u64`.
///
/// NaN has no place in a total order; callers that accept untrusted input go
/// through [`OrePlaintext::from_f64`], which rejects it.
///
/// # Examples
///
/// ```
/// use termvault_core::codec::encode_f64;
///
/// assert!(encode_f64(-1.0) < encode_f64(0.0));
/// assert!(encode_f64(0.0) < encode_f64(1.5));
/// assert_eq!(encode_f64(0.0), encode_f64(-0.0));
/// ```
#[must_use]
pub fn encode_f64(value: f64) -> u64 {
    // -0.0 == 0.0 so this folds both zeros into +0.0.
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    if bits & SIGN_BIT == 0 {
        bits | SIGN_BIT
    } else {
        !bits
    }
}

/// Decodes a term produced by [`encode_f64`].
///
/// # Errors
///
/// Returns [`DomainError::NotANumber`] when the term decodes to a NaN bit
/// pattern, which `encode_f64` never produces for an orderable input.
pub fn decode_f64(term: u64) -> Result<f64, DomainError> {
    let bits = if term & SIGN_BIT == 0 {
        !term
    } else {
        term & !SIGN_BIT
    };
    let value = f64::from_bits(bits);
    if value.is_nan() {
        return Err(DomainError::NotANumber);
    }
    Ok(value)
}

/// A term in the `u64` domain accepted by the order-revealing cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrePlaintext(pub u64);

impl OrePlaintext {
    /// Encodes a double through the order-preserving transform.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotANumber`] for NaN.
    pub fn from_f64(value: f64) -> Result<Self, DomainError> {
        if value.is_nan() {
            return Err(DomainError::NotANumber);
        }
        Ok(Self(encode_f64(value)))
    }

    /// Wraps an integer that is already ordered as an unsigned 64-bit value.
    ///
    /// Integers are not bit-flipped: unsigned comparison already orders them.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::OutOfRange`] for negative values or values
    /// above `u64::MAX`.
    pub fn from_wide(value: i128) -> Result<Self, DomainError> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| DomainError::OutOfRange)
    }

    /// Encodes a boolean as `1.0`/`0.0`.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        Self(encode_f64(if value { 1.0 } else { 0.0 }))
    }

    /// Encodes a timestamp given in milliseconds since the Unix epoch.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_epoch_millis(millis: i64) -> Self {
        Self(encode_f64(millis as f64))
    }

    /// The next term below this one, if any.
    #[must_use]
    pub fn pred(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    /// The next term above this one, if any.
    #[must_use]
    pub fn succ(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Range bounds
// ---------------------------------------------------------------------------

/// Inclusive bounds on the encoded term domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OreRange {
    pub min: OrePlaintext,
    pub max: OrePlaintext,
}

impl OreRange {
    /// Both bounds inclusive. `None` when `min > max`.
    #[must_use]
    pub fn between(min: OrePlaintext, max: OrePlaintext) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    #[must_use]
    pub fn eq(value: OrePlaintext) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// `None` when `value` is already the smallest term.
    #[must_use]
    pub fn lt(value: OrePlaintext) -> Option<Self> {
        value.pred().map(|max| Self {
            min: OrePlaintext(TERM_MIN),
            max,
        })
    }

    #[must_use]
    pub fn lte(value: OrePlaintext) -> Self {
        Self {
            min: OrePlaintext(TERM_MIN),
            max: value,
        }
    }

    /// `None` when `value` is already the largest term.
    #[must_use]
    pub fn gt(value: OrePlaintext) -> Option<Self> {
        value.succ().map(|min| Self {
            min,
            max: OrePlaintext(TERM_MAX),
        })
    }

    #[must_use]
    pub fn gte(value: OrePlaintext) -> Self {
        Self {
            min: value,
            max: OrePlaintext(TERM_MAX),
        }
    }
}
