//! Text to number conversions: `i64` / `u64` parsing and an IEEE-754 `f64`
//! parser built from an exact fast path plus a high-precision decimal
//! fallback.
//!
//! The fast path applies when the significand fits 15 digits and the
//! decimal exponent is within the exactly-representable powers of ten; it
//! is pure `f64` arithmetic with exact operands, so the result is correctly
//! rounded. Everything else goes through [`Decimal`]: up to 800 significant
//! digits shifted by powers of two until the mantissa can be extracted with
//! round-to-nearest-even.

use crate::status::Status;

pub const ERROR_BAD_NUMBER: Status = Status::Error("#bad number");
pub const ERROR_NUMBER_TOO_LARGE: Status = Status::Error("#number too large");

/// Options accepted by the `parse_number_*` family.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseNumberOptions {
    /// Permit `_` separators between digits.
    pub allow_underscores: bool,
    /// Permit `00`, `007` and similar.
    pub allow_multiple_leading_zeroes: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Integer parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parses an optionally-signed decimal integer.
pub fn parse_number_i64(src: &[u8], opts: ParseNumberOptions) -> Result<i64, Status> {
    let (negative, rest) = match src.first() {
        Some(b'-') => (true, &src[1..]),
        Some(b'+') => (false, &src[1..]),
        _ => (false, src),
    };
    let magnitude = parse_number_u64(rest, opts)?;
    if negative {
        if magnitude > (i64::MAX as u64) + 1 {
            return Err(ERROR_NUMBER_TOO_LARGE);
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        if magnitude > i64::MAX as u64 {
            return Err(ERROR_NUMBER_TOO_LARGE);
        }
        Ok(magnitude as i64)
    }
}

/// Parses an unsigned decimal integer.
pub fn parse_number_u64(src: &[u8], opts: ParseNumberOptions) -> Result<u64, Status> {
    if src.is_empty() {
        return Err(ERROR_BAD_NUMBER);
    }
    if !opts.allow_multiple_leading_zeroes && src.len() > 1 && src[0] == b'0' {
        let next = src[1];
        if next.is_ascii_digit() || (opts.allow_underscores && next == b'_') {
            return Err(ERROR_BAD_NUMBER);
        }
    }
    let mut v: u64 = 0;
    let mut any = false;
    let mut prev_underscore = true; // a leading underscore is also invalid
    for &b in src {
        if b == b'_' && opts.allow_underscores {
            if prev_underscore {
                return Err(ERROR_BAD_NUMBER);
            }
            prev_underscore = true;
            continue;
        }
        if !b.is_ascii_digit() {
            return Err(ERROR_BAD_NUMBER);
        }
        v = v
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or(ERROR_NUMBER_TOO_LARGE)?;
        any = true;
        prev_underscore = false;
    }
    if !any || prev_underscore {
        return Err(ERROR_BAD_NUMBER);
    }
    Ok(v)
}

// ─────────────────────────────────────────────────────────────────────────────
// High-precision decimal
// ─────────────────────────────────────────────────────────────────────────────

const MAX_DIGITS: usize = 800;

/// A multiple-precision decimal in the form `0.digits x 10^decimal_point`,
/// with the digits most significant first.
struct Decimal {
    digits: [u8; MAX_DIGITS],
    num_digits: usize,
    decimal_point: i32,
    truncated: bool,
}

impl Decimal {
    fn zero() -> Self {
        Decimal { digits: [0; MAX_DIGITS], num_digits: 0, decimal_point: 0, truncated: false }
    }

    fn push_digit(&mut self, d: u8) {
        if d == 0 && self.num_digits == 0 {
            // Leading zeroes only move the decimal point.
            self.decimal_point -= 1;
            return;
        }
        if self.num_digits < MAX_DIGITS {
            self.digits[self.num_digits] = d;
            self.num_digits += 1;
        } else if d != 0 {
            self.truncated = true;
        }
    }

    fn trim(&mut self) {
        while self.num_digits > 0 && self.digits[self.num_digits - 1] == 0 {
            self.num_digits -= 1;
        }
        if self.num_digits == 0 {
            self.decimal_point = 0;
        }
    }

    /// Multiplies by 2^k for 1 <= k <= 4.
    fn left_shift_small(&mut self, k: u32) {
        let mut carry: u32 = 0;
        for i in (0..self.num_digits).rev() {
            let v = (u32::from(self.digits[i]) << k) + carry;
            self.digits[i] = (v % 10) as u8;
            carry = v / 10;
        }
        // Prepend the carry digits.
        let mut prefix = [0u8; 2];
        let mut n = 0;
        while carry > 0 {
            prefix[n] = (carry % 10) as u8;
            carry /= 10;
            n += 1;
        }
        if n > 0 {
            let keep = self.num_digits.min(MAX_DIGITS - n);
            if keep < self.num_digits {
                for i in keep..self.num_digits {
                    if self.digits[i] != 0 {
                        self.truncated = true;
                    }
                }
            }
            self.digits.copy_within(0..keep, n);
            for i in 0..n {
                self.digits[i] = prefix[n - 1 - i];
            }
            self.num_digits = keep + n;
            self.decimal_point += n as i32;
        }
        self.trim();
    }

    /// Divides by 2^k for 1 <= k <= 4.
    fn right_shift_small(&mut self, k: u32) {
        let mask = (1u32 << k) - 1;
        let mut r: u32 = 0;
        for i in 0..self.num_digits {
            let acc = r * 10 + u32::from(self.digits[i]);
            self.digits[i] = (acc >> k) as u8;
            r = acc & mask;
        }
        while r != 0 {
            r *= 10;
            let d = (r >> k) as u8;
            r &= mask;
            if self.num_digits < MAX_DIGITS {
                self.digits[self.num_digits] = d;
                self.num_digits += 1;
            } else if d != 0 {
                self.truncated = true;
            }
        }
        // Strip any leading zeroes the division introduced.
        let mut lead = 0;
        while lead < self.num_digits && self.digits[lead] == 0 {
            lead += 1;
        }
        if lead > 0 {
            self.digits.copy_within(lead..self.num_digits, 0);
            self.num_digits -= lead;
            self.decimal_point -= lead as i32;
        }
        self.trim();
    }

    /// Multiplies (positive `shift`) or divides (negative) by 2^|shift|.
    fn shift(&mut self, shift: i32) {
        let mut n = shift;
        while n > 0 {
            let k = n.min(4) as u32;
            self.left_shift_small(k);
            n -= k as i32;
        }
        while n < 0 {
            let k = (-n).min(4) as u32;
            self.right_shift_small(k);
            n += k as i32;
        }
    }

    /// Whether truncating after `nd` digits should round the integer up,
    /// breaking exact ties to even.
    fn should_round_up(&self, nd: i32) -> bool {
        if nd < 0 || nd as usize >= self.num_digits {
            return false;
        }
        let nd = nd as usize;
        if self.digits[nd] == 5 && nd + 1 == self.num_digits {
            if self.truncated {
                return true;
            }
            return nd > 0 && self.digits[nd - 1] % 2 != 0;
        }
        self.digits[nd] >= 5
    }

    /// The integer part, rounded to nearest even.
    fn rounded_integer(&self) -> u64 {
        if self.decimal_point > 20 {
            return u64::MAX;
        }
        let dp = self.decimal_point.max(0) as usize;
        let mut n: u64 = 0;
        let mut i = 0;
        while i < dp && i < self.num_digits {
            n = n * 10 + u64::from(self.digits[i]);
            i += 1;
        }
        while i < dp {
            n *= 10;
            i += 1;
        }
        if self.should_round_up(self.decimal_point) {
            n += 1;
        }
        n
    }

    /// Converts to the nearest `f64` magnitude.
    fn to_f64_magnitude(&mut self) -> f64 {
        const MANT_BITS: i32 = 52;
        const EXP_BITS: i32 = 11;
        const BIAS: i32 = -1023;
        // Smallest power of two at least 10^i, for scaling step sizes.
        const POWTAB: [i32; 9] = [1, 3, 6, 9, 13, 16, 19, 23, 26];

        if self.num_digits == 0 {
            return 0.0;
        }
        if self.decimal_point < -330 {
            return 0.0;
        }
        if self.decimal_point > 310 {
            return f64::INFINITY;
        }

        let mut exp2: i32 = 0;
        while self.decimal_point > 0 {
            let n = if self.decimal_point as usize >= POWTAB.len() {
                27
            } else {
                POWTAB[self.decimal_point as usize]
            };
            self.shift(-n);
            exp2 += n;
        }
        while self.decimal_point < 0 || (self.decimal_point == 0 && self.digits[0] < 5) {
            let n = if (-self.decimal_point) as usize >= POWTAB.len() {
                27
            } else {
                POWTAB[(-self.decimal_point) as usize]
            };
            self.shift(n);
            exp2 -= n;
        }
        // The value is now in [0.5, 1); the binary mantissa lives in [1, 2).
        exp2 -= 1;

        if exp2 < BIAS + 1 {
            let n = BIAS + 1 - exp2;
            self.shift(-n);
            exp2 += n;
        }
        if exp2 - BIAS >= (1 << EXP_BITS) - 1 {
            return f64::INFINITY;
        }

        self.shift(1 + MANT_BITS);
        let mut mant = self.rounded_integer();
        if mant == 2 << MANT_BITS {
            mant >>= 1;
            exp2 += 1;
            if exp2 - BIAS >= (1 << EXP_BITS) - 1 {
                return f64::INFINITY;
            }
        }
        let exp_field = if mant & (1 << MANT_BITS) == 0 {
            // Subnormal.
            0
        } else {
            (exp2 - BIAS) as u64
        };
        let bits = (mant & ((1u64 << MANT_BITS) - 1)) | (exp_field << MANT_BITS);
        f64::from_bits(bits)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// f64 parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Exact powers of ten in `f64`.
const F64_POW10: [f64; 23] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15,
    1e16, 1e17, 1e18, 1e19, 1e20, 1e21, 1e22,
];

/// Parses a decimal floating-point number: optional sign, digits with an
/// optional fraction, an optional exponent, or one of `inf`, `infinity`,
/// `nan` (ASCII case-insensitive). Out-of-range magnitudes saturate to
/// infinity rather than erroring, matching `strtod`.
pub fn parse_number_f64(src: &[u8], opts: ParseNumberOptions) -> Result<f64, Status> {
    let (negative, rest) = match src.first() {
        Some(b'-') => (true, &src[1..]),
        Some(b'+') => (false, &src[1..]),
        _ => (false, src),
    };
    if let Some(special) = parse_special(rest) {
        return Ok(if negative { -special } else { special });
    }

    let mut d = Decimal::zero();
    let mut mant: u64 = 0;
    let mut mant_digits: usize = 0;
    let mut seen_int = false;
    let mut seen_frac_digit = false;
    let mut exp10_frac: i32 = 0;
    let mut i = 0;
    let mut int_digits = 0usize;
    let mut prev_underscore = true;

    // Integer part.
    while i < rest.len() {
        let b = rest[i];
        if b == b'_' && opts.allow_underscores {
            if prev_underscore {
                return Err(ERROR_BAD_NUMBER);
            }
            prev_underscore = true;
            i += 1;
            continue;
        }
        if !b.is_ascii_digit() {
            break;
        }
        prev_underscore = false;
        if int_digits == 1 && rest[i - 1] == b'0' && !opts.allow_multiple_leading_zeroes {
            return Err(ERROR_BAD_NUMBER);
        }
        d.push_digit(b - b'0');
        d.decimal_point += 1;
        if mant_digits < 19 {
            mant = mant * 10 + u64::from(b - b'0');
            if mant != 0 {
                mant_digits += 1;
            }
        } else {
            mant_digits += 1;
        }
        int_digits += 1;
        seen_int = true;
        i += 1;
    }
    if seen_int && prev_underscore && i > 0 {
        return Err(ERROR_BAD_NUMBER);
    }

    // Fraction part.
    if i < rest.len() && rest[i] == b'.' {
        i += 1;
        prev_underscore = true;
        while i < rest.len() {
            let b = rest[i];
            if b == b'_' && opts.allow_underscores {
                if prev_underscore && seen_frac_digit {
                    return Err(ERROR_BAD_NUMBER);
                }
                prev_underscore = true;
                i += 1;
                continue;
            }
            if !b.is_ascii_digit() {
                break;
            }
            prev_underscore = false;
            d.push_digit(b - b'0');
            if mant_digits < 19 {
                mant = mant * 10 + u64::from(b - b'0');
                if mant != 0 {
                    mant_digits += 1;
                }
            } else if b != b'0' {
                mant_digits += 1;
            }
            exp10_frac -= 1;
            seen_frac_digit = true;
            i += 1;
        }
    }
    if !seen_int && !seen_frac_digit {
        return Err(ERROR_BAD_NUMBER);
    }

    // Exponent part.
    let mut exp10_explicit: i32 = 0;
    if i < rest.len() && (rest[i] == b'e' || rest[i] == b'E') {
        i += 1;
        let exp_negative = match rest.get(i) {
            Some(b'-') => {
                i += 1;
                true
            }
            Some(b'+') => {
                i += 1;
                false
            }
            _ => false,
        };
        let start = i;
        let mut e: i32 = 0;
        while i < rest.len() && rest[i].is_ascii_digit() {
            e = e.saturating_mul(10).saturating_add(i32::from(rest[i] - b'0'));
            i += 1;
        }
        if i == start {
            return Err(ERROR_BAD_NUMBER);
        }
        exp10_explicit = if exp_negative { -e } else { e };
    }
    if i != rest.len() {
        return Err(ERROR_BAD_NUMBER);
    }

    d.decimal_point = d.decimal_point.saturating_add(exp10_explicit);
    d.trim();

    // Exact fast path: a 15-digit significand and a small power of ten are
    // both exactly representable, so one multiply or divide rounds once.
    let exp10 = exp10_frac + exp10_explicit;
    if mant_digits <= 15 {
        let f = mant as f64;
        let value = if exp10 == 0 {
            Some(f)
        } else if (1..=22 + 15).contains(&exp10) {
            if exp10 <= 22 {
                Some(f * F64_POW10[exp10 as usize])
            } else {
                let g = f * F64_POW10[(exp10 - 22) as usize];
                // g must still be an exactly-representable integer.
                if g <= 9e15 { Some(g * F64_POW10[22]) } else { None }
            }
        } else if (-22..0).contains(&exp10) {
            Some(f / F64_POW10[(-exp10) as usize])
        } else {
            None
        };
        if let Some(v) = value {
            return Ok(if negative { -v } else { v });
        }
    }

    let magnitude = d.to_f64_magnitude();
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_special(rest: &[u8]) -> Option<f64> {
    let eq = |a: &[u8], b: &[u8]| {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == *y)
    };
    if eq(rest, b"inf") || eq(rest, b"infinity") {
        Some(f64::INFINITY)
    } else if eq(rest, b"nan") {
        Some(f64::NAN)
    } else {
        None
    }
}
