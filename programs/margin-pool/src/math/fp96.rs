// =============================================================================
// Q96 Fixed Point
// =============================================================================
// Unsigned binary fixed point with 96 fractional bits, stored in a u128.
// Products are taken in 256 bits so two Q96 values (or a Q96 value and a
// u128 amount) never overflow in the intermediate step.
//
// Rounding: every operation floors unless its name says `_up`. Callers pick
// the direction per use so that rounding always favours the pool:
// - collateral (what the pool owes) is rounded down
// - debt (what the pool is owed) is rounded up
// Always multiply before dividing.
// =============================================================================

use anchor_lang::prelude::*;
use primitive_types::U256;

use crate::error::MarginPoolError;

/// Number of fractional bits
pub const Q96_BITS: usize = 96;

/// 1.0 in Q96
pub const Q96: u128 = 1 << Q96_BITS;

/// Narrow a 256-bit intermediate back to u128, failing instead of truncating.
fn narrow(value: U256) -> Result<u128> {
    if value.bits() > 128 {
        return err!(MarginPoolError::MathOverflow);
    }
    Ok(value.low_u128())
}

/// `a * b / denominator`, floored, with a 256-bit intermediate.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128> {
    require!(denominator != 0, MarginPoolError::DivisionByZero);
    narrow(U256::from(a) * U256::from(b) / U256::from(denominator))
}

/// `a * b / denominator`, floored, together with the division remainder.
pub fn mul_div_rem(a: u128, b: u128, denominator: u128) -> Result<(u128, u128)> {
    require!(denominator != 0, MarginPoolError::DivisionByZero);
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    // remainder < denominator, which fits
    Ok((narrow(product / denominator)?, (product % denominator).low_u128()))
}

/// `a * b / denominator`, rounded up.
pub fn mul_div_up(a: u128, b: u128, denominator: u128) -> Result<u128> {
    require!(denominator != 0, MarginPoolError::DivisionByZero);
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if !(product % denominator).is_zero() {
        quotient += U256::one();
    }
    narrow(quotient)
}

/// A Q96 fixed-point number.
///
/// Used for the six pool coefficients, system leverage, prices and the
/// per-second rates that feed interest accrual.
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, InitSpace,
)]
pub struct Fp96 {
    pub inner: u128,
}

impl Fp96 {
    pub const fn from_inner(inner: u128) -> Self {
        Self { inner }
    }

    pub const fn one() -> Self {
        Self { inner: Q96 }
    }

    pub const fn zero() -> Self {
        Self { inner: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.inner == 0
    }

    /// Whole number `n` as Q96.
    pub fn from_integer(n: u64) -> Self {
        Self { inner: (n as u128) << Q96_BITS }
    }

    /// `numerator / denominator` as Q96, floored.
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self> {
        require!(denominator != 0, MarginPoolError::DivisionByZero);
        let inner = narrow((U256::from(numerator) << Q96_BITS) / U256::from(denominator))?;
        Ok(Self { inner })
    }

    /// `numerator / denominator` as Q96, saturating at `u128::MAX`.
    ///
    /// Only used for heap sort keys, where a saturated key still sorts above
    /// every representable one.
    pub fn from_ratio_saturating(numerator: u128, denominator: u128) -> Self {
        if denominator == 0 {
            return Self { inner: u128::MAX };
        }
        let value = (U256::from(numerator) << Q96_BITS) / U256::from(denominator);
        let inner = if value.bits() > 128 { u128::MAX } else { value.low_u128() };
        Self { inner }
    }

    pub fn add(self, other: Self) -> Result<Self> {
        let inner = self
            .inner
            .checked_add(other.inner)
            .ok_or(MarginPoolError::MathOverflow)?;
        Ok(Self { inner })
    }

    pub fn sub(self, other: Self) -> Result<Self> {
        let inner = self
            .inner
            .checked_sub(other.inner)
            .ok_or(MarginPoolError::MathUnderflow)?;
        Ok(Self { inner })
    }

    pub fn mul(self, other: Self) -> Result<Self> {
        let inner = narrow((U256::from(self.inner) * U256::from(other.inner)) >> Q96_BITS)?;
        Ok(Self { inner })
    }

    pub fn div(self, other: Self) -> Result<Self> {
        require!(other.inner != 0, MarginPoolError::DivisionByZero);
        let inner = narrow((U256::from(self.inner) << Q96_BITS) / U256::from(other.inner))?;
        Ok(Self { inner })
    }

    /// `self * amount`, floored. Converts a discounted amount to a real one.
    pub fn mul_amount(self, amount: u128) -> Result<u128> {
        narrow((U256::from(self.inner) * U256::from(amount)) >> Q96_BITS)
    }

    /// `self * amount`, rounded up.
    pub fn mul_amount_up(self, amount: u128) -> Result<u128> {
        mul_div_up(self.inner, amount, Q96)
    }

    /// `amount / self`, floored. Converts a real amount to a discounted one.
    pub fn recip_mul_amount(self, amount: u128) -> Result<u128> {
        require!(self.inner != 0, MarginPoolError::DivisionByZero);
        narrow((U256::from(amount) << Q96_BITS) / U256::from(self.inner))
    }

    /// `amount / self`, rounded up.
    pub fn recip_mul_amount_up(self, amount: u128) -> Result<u128> {
        require!(self.inner != 0, MarginPoolError::DivisionByZero);
        mul_div_up(amount, Q96, self.inner)
    }

    /// Exact `self^exponent` by repeated squaring.
    pub fn pow(self, exponent: u64) -> Result<Self> {
        let mut result = Self::one();
        let mut base = self;
        let mut exponent = exponent;
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result.mul(base)?;
            }
            exponent >>= 1;
            if exponent > 0 {
                base = base.mul(base)?;
            }
        }
        Ok(result)
    }

    /// `(1 + x)^n` for `self = 1 + x` using the first four Taylor terms:
    ///
    /// `1 + n·x + n(n-1)/2·x² + n(n-1)(n-2)/6·x³`
    ///
    /// Only valid for small `x` (per-second rates). Rejects `x >= 1` and
    /// `self < 1`.
    pub fn pow_taylor(self, exponent: u64) -> Result<Self> {
        require!(self.inner >= Q96, MarginPoolError::InvalidTaylorBase);
        let x = self.inner - Q96;
        require!(x < Q96, MarginPoolError::InvalidTaylorBase);

        if exponent == 0 || x == 0 {
            return Ok(Self::one());
        }

        let n = U256::from(exponent);
        let n1 = U256::from(exponent - 1);
        let n2 = U256::from(exponent.saturating_sub(2));

        let x1 = U256::from(x);
        let x2 = (x1 * x1) >> Q96_BITS;
        let x3 = (x2 * x1) >> Q96_BITS;

        let term1 = n * x1;
        let term2 = n * n1 / U256::from(2u8) * x2;
        let term3 = n * n1 * n2 / U256::from(6u8) * x3;

        let inner = narrow(U256::from(Q96) + term1 + term2 + term3)?;
        Ok(Self { inner })
    }
}
