//! Fixed-width unsigned numbers with decimal, hexadecimal and binary text representations
//!
//! A [`NumField`] owns a value that always fits in its bit width. The text shown for the value is
//! derived from the value and the active [`DisplayBase`] on demand, and text entered by a user is
//! validated against a grammar derived from the bit width before it is accepted.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, PoisonError},
};

use crate::error::{FormatError, RangeError};
use lazy_static::lazy_static;
use regex::Regex;
use strum::{Display, EnumIter, EnumString};

/// Number base used to render and to validate the text of a [`NumField`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum DisplayBase {
    #[strum(to_string = "decimal", serialize = "dec")]
    Decimal,
    #[default]
    #[strum(to_string = "hex", serialize = "hexadecimal")]
    Hex,
    #[strum(to_string = "binary", serialize = "bin")]
    Binary,
}

impl DisplayBase {
    pub const fn radix(self) -> u32 {
        match self {
            Self::Decimal => 10,
            Self::Hex => 16,
            Self::Binary => 2,
        }
    }
}

/// Direction of a single increment or decrement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Up,
    Down,
}

/// An unsigned number of `bit_width` bits, kept together with the base it is displayed in
///
/// The value is `0` and the base is [`DisplayBase::Hex`] on construction.
#[derive(Clone, Debug)]
pub struct NumField {
    bit_width: u32,
    value: u64,
    base: DisplayBase,
    /// Grammar of valid text for the current base and width
    validator: Regex,
}

impl NumField {
    /// Largest supported bit width
    pub const MAX_BIT_WIDTH: u32 = u64::BITS;

    /// # Panics
    ///
    /// Panics if `bit_width` is zero or greater than [`NumField::MAX_BIT_WIDTH`].
    pub fn new(bit_width: u32) -> Self {
        // This would usually be a library programming error
        assert!(
            (1..=Self::MAX_BIT_WIDTH).contains(&bit_width),
            "bit width must be within 1..={}, got {bit_width}",
            Self::MAX_BIT_WIDTH
        );
        let base = DisplayBase::default();
        Self {
            bit_width,
            value: 0,
            base,
            validator: validator(base, bit_width),
        }
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// Largest value representable in this field, `2^bit_width - 1`
    pub fn max_value(&self) -> u64 {
        max_value(self.bit_width)
    }

    pub fn get(&self) -> u64 {
        self.value
    }

    /// # Errors
    ///
    /// `value` does not fit in the bit width of this field. The previous value is kept.
    pub fn set_value(&mut self, value: u64) -> Result<(), RangeError> {
        if value > self.max_value() {
            return Err(RangeError {
                value,
                bit_width: self.bit_width,
            });
        }
        self.value = value;
        Ok(())
    }

    pub fn display_base(&self) -> DisplayBase {
        self.base
    }

    /// Change the base used for rendering and for validating future text edits
    ///
    /// The value is not affected.
    pub fn set_display_base(&mut self, base: DisplayBase) {
        if base != self.base {
            self.base = base;
            self.validator = validator(base, self.bit_width);
        }
    }

    /// Text representation of the current value in the current base
    pub fn text(&self) -> String {
        self.format(self.value)
    }

    /// Render an arbitrary `value` using the width and base of this field
    ///
    /// Hexadecimal and binary output is always padded to the width of the field, never to the
    /// magnitude of the value.
    pub fn format(&self, value: u64) -> String {
        format_value(value, self.base, self.bit_width)
    }

    /// Store `value` truncated to the bit width of this field
    pub(crate) fn set_masked(&mut self, value: u64) {
        self.value = value & self.max_value();
    }

    /// Parse `raw` according to the current base
    ///
    /// # Errors
    ///
    /// The text does not match the grammar of the current base and width, or encodes a value that
    /// does not fit in the field.
    pub fn parse_text(&self, raw: &str) -> Result<u64, FormatError> {
        let err = || FormatError {
            text: raw.to_owned(),
            base: self.base,
            bit_width: self.bit_width,
        };

        if !self.validator.is_match(raw) {
            return Err(err());
        }

        let digits: String = match self.base {
            DisplayBase::Decimal => raw.to_owned(),
            DisplayBase::Hex => raw.trim_start_matches("0x").to_owned(),
            DisplayBase::Binary => raw.chars().filter(|c| !c.is_whitespace()).collect(),
        };
        let value = u64::from_str_radix(&digits, self.base.radix()).map_err(|_| err())?;
        if value > self.max_value() {
            return Err(err());
        }
        Ok(value)
    }

    /// Parse `raw` and store the result, keeping the previous value on failure
    pub fn set_text(&mut self, raw: &str) -> Result<u64, FormatError> {
        let value = self.parse_text(raw)?;
        self.value = value;
        Ok(value)
    }

    /// Value after taking one `step`, or `None` when the step would leave the valid range
    pub fn stepped(&self, step: Step) -> Option<u64> {
        match step {
            Step::Up => self.value.checked_add(1).filter(|v| *v <= self.max_value()),
            Step::Down => self.value.checked_sub(1),
        }
    }

    /// Increment or decrement the value by one
    ///
    /// Saturates at both ends of the range instead of wrapping. Returns whether the value changed.
    pub fn step(&mut self, step: Step) -> bool {
        match self.stepped(step) {
            Some(value) => {
                self.value = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for NumField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

pub(crate) const fn max_value(bit_width: u32) -> u64 {
    u64::MAX >> (u64::BITS - bit_width)
}

/// Number of hexadecimal digits needed to represent `bit_width` bits
const fn hex_digits(bit_width: u32) -> usize {
    bit_width.div_ceil(4) as usize
}

/// Render `value` as text of `base`, padded to `bit_width` where the base calls for it
pub fn format_value(value: u64, base: DisplayBase, bit_width: u32) -> String {
    match base {
        DisplayBase::Decimal => value.to_string(),
        DisplayBase::Hex => format!("0x{value:0width$x}", width = hex_digits(bit_width)),
        DisplayBase::Binary => {
            let bits = format!("{value:0width$b}", width = bit_width as usize);
            let len = bits.len();
            let mut out = String::with_capacity(len + len / 4);
            for (idx, c) in bits.chars().enumerate() {
                // Nibble boundaries are counted from the least significant bit
                if idx != 0 && (len - idx) % 4 == 0 {
                    out.push(' ');
                }
                out.push(c);
            }
            out
        }
    }
}

lazy_static! {
    static ref VALIDATORS: Mutex<HashMap<(DisplayBase, u32), Regex>> = Mutex::new(HashMap::new());
}

/// Grammar of valid text for `base` and `bit_width`, compiled once per combination
fn validator(base: DisplayBase, bit_width: u32) -> Regex {
    let mut validators = VALIDATORS.lock().unwrap_or_else(PoisonError::into_inner);
    validators
        .entry((base, bit_width))
        .or_insert_with(|| compile_validator(base, bit_width))
        .clone()
}

fn compile_validator(base: DisplayBase, bit_width: u32) -> Regex {
    let partial = bit_width % 4;
    let nibbles = bit_width / 4;

    let pattern = match base {
        DisplayBase::Decimal => r"^[0-9]+$".to_owned(),
        DisplayBase::Hex => {
            let mut p = "^0x".to_owned();
            if partial > 0 {
                // The most significant digit can only use the bits left over from full nibbles
                p.push_str(&format!("[0-{}]", (1u32 << partial) - 1));
            }
            if nibbles > 0 {
                p.push_str(&format!("[[:xdigit:]]{{{nibbles}}}"));
            }
            p.push('$');
            p
        }
        DisplayBase::Binary => {
            let mut p = "^".to_owned();
            let mut groups = nibbles;
            if partial > 0 {
                p.push_str(&format!("[01]{{{partial}}}"));
            } else {
                p.push_str("[01]{4}");
                groups -= 1;
            }
            if groups > 0 {
                p.push_str(&format!(r"(?:\s?[01]{{4}}){{{groups}}}"));
            }
            p.push('$');
            p
        }
    };

    Regex::new(&pattern)
        .unwrap_or_else(|err| panic!("internal error: invalid validator {pattern:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn field(bit_width: u32, base: DisplayBase) -> NumField {
        let mut f = NumField::new(bit_width);
        f.set_display_base(base);
        f
    }

    /// Deterministic sample values for a width: the boundaries and a few scattered bit patterns
    fn samples(bit_width: u32) -> Vec<u64> {
        let max = max_value(bit_width);
        let mut state = 0x9E37_79B9_7F4A_7C15u64 ^ u64::from(bit_width);
        let mut v = vec![0, 1 & max, max, max >> 1, max.saturating_sub(1)];
        for _ in 0..16 {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            v.push(state & max);
        }
        v
    }

    #[test]
    fn text_round_trips_for_every_width_and_base() {
        for bit_width in 1..=64 {
            for base in DisplayBase::iter() {
                let f = field(bit_width, base);
                for value in samples(bit_width) {
                    let text = f.format(value);
                    assert_eq!(
                        f.parse_text(&text),
                        Ok(value),
                        "width {bit_width}, base {base}, text {text:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn set_value_rejects_first_value_out_of_range() {
        for bit_width in 1..64 {
            let mut f = NumField::new(bit_width);
            let too_big = 1u64 << bit_width;
            assert_eq!(
                f.set_value(too_big),
                Err(RangeError {
                    value: too_big,
                    bit_width
                })
            );
            assert_eq!(f.get(), 0);
            assert!(f.set_value(too_big - 1).is_ok());
        }
        let mut f = NumField::new(64);
        assert!(f.set_value(u64::MAX).is_ok());
    }

    #[test]
    fn step_saturates_at_both_ends() {
        let mut f = NumField::new(4);
        f.set_value(15).unwrap();
        assert!(!f.step(Step::Up));
        assert_eq!(f.get(), 15);
        assert!(f.step(Step::Down));
        assert_eq!(f.get(), 14);

        f.set_value(0).unwrap();
        assert!(!f.step(Step::Down));
        assert_eq!(f.get(), 0);
        assert!(f.step(Step::Up));
        assert_eq!(f.get(), 1);

        let mut wide = NumField::new(64);
        wide.set_value(u64::MAX).unwrap();
        assert_eq!(wide.stepped(Step::Up), None);
    }

    #[test]
    fn hex_is_padded_to_width() {
        let mut f = NumField::new(6);
        f.set_value(1).unwrap();
        assert_eq!(f.text(), "0x01");
        f.set_value(5).unwrap();
        assert_eq!(f.text(), "0x05");
        f.set_value(0x3f).unwrap();
        assert_eq!(f.text(), "0x3f");

        assert_eq!(format_value(0, DisplayBase::Hex, 32), "0x00000000");
        assert_eq!(format_value(0xA5, DisplayBase::Hex, 1 + 8), "0x0a5");
    }

    #[test]
    fn hex_grammar_limits_leading_digit_and_length() {
        let f = field(6, DisplayBase::Hex);
        assert_eq!(f.parse_text("0x3F"), Ok(0x3f));
        assert_eq!(f.parse_text("0x3f"), Ok(0x3f));
        assert!(f.parse_text("0x41").is_err());
        assert!(f.parse_text("0x5").is_err());
        assert!(f.parse_text("0x005").is_err());
        assert!(f.parse_text("05").is_err());
        assert!(f.parse_text("0X05").is_err());

        let f = field(8, DisplayBase::Hex);
        assert_eq!(f.parse_text("0xfF"), Ok(0xff));
        assert!(f.parse_text("0xg0").is_err());
    }

    #[test]
    fn binary_is_grouped_by_nibble_from_the_right() {
        let mut f = field(9, DisplayBase::Binary);
        f.set_value(0b1_0101_0101).unwrap();
        assert_eq!(f.text(), "1 0101 0101");
        assert_eq!(f.parse_text("1 0101 0101"), Ok(0b1_0101_0101));

        assert_eq!(format_value(0b1010, DisplayBase::Binary, 4), "1010");
        assert_eq!(format_value(0b10, DisplayBase::Binary, 3), "010");
        assert_eq!(format_value(0, DisplayBase::Binary, 8), "0000 0000");
    }

    #[test]
    fn binary_grammar_checks_group_sizes() {
        let f = field(9, DisplayBase::Binary);
        // Separators are optional
        assert_eq!(f.parse_text("101010101"), Ok(0b1_0101_0101));
        assert_eq!(f.parse_text("1 01010101"), Ok(0b1_0101_0101));
        assert!(f.parse_text("10 101 0101").is_err());
        assert!(f.parse_text("01 0101 0101").is_err());
        assert!(f.parse_text("1 0101 0102").is_err());
        assert!(f.parse_text(" 1 0101 0101").is_err());

        let f = field(8, DisplayBase::Binary);
        assert_eq!(f.parse_text("1111 0000"), Ok(0xf0));
        assert!(f.parse_text("1111 000").is_err());
    }

    #[test]
    fn decimal_grammar_checks_range() {
        let f = field(8, DisplayBase::Decimal);
        assert_eq!(f.parse_text("255"), Ok(255));
        assert_eq!(f.parse_text("007"), Ok(7));
        assert!(f.parse_text("256").is_err());
        assert!(f.parse_text("-1").is_err());
        assert!(f.parse_text("0x10").is_err());
        assert!(f.parse_text("").is_err());

        let f = field(64, DisplayBase::Decimal);
        assert_eq!(f.parse_text(&u64::MAX.to_string()), Ok(u64::MAX));
        assert!(f.parse_text("18446744073709551616").is_err());
    }

    #[test]
    fn changing_base_keeps_value() {
        let mut f = NumField::new(12);
        f.set_value(0x5a3).unwrap();
        assert_eq!(f.text(), "0x5a3");
        f.set_display_base(DisplayBase::Decimal);
        assert_eq!(f.text(), "1443");
        f.set_display_base(DisplayBase::Binary);
        assert_eq!(f.text(), "0101 1010 0011");
        assert_eq!(f.get(), 0x5a3);
    }

    #[test]
    fn rejected_text_keeps_previous_value() {
        let mut f = field(4, DisplayBase::Decimal);
        assert_eq!(f.set_text("9"), Ok(9));
        let err = f.set_text("16").unwrap_err();
        assert_eq!(err.text(), "16");
        assert_eq!(err.base(), DisplayBase::Decimal);
        assert_eq!(f.get(), 9);
    }

    #[test]
    fn validators_are_shared_between_fields() {
        let a = field(13, DisplayBase::Binary);
        let b = field(13, DisplayBase::Binary);
        assert_eq!(a.validator.as_str(), b.validator.as_str());
        assert!(VALIDATORS
            .lock()
            .unwrap()
            .contains_key(&(DisplayBase::Binary, 13)));
        assert_eq!(b.parse_text("1 0000 0000 0001"), Ok(0x1001));
    }

    #[test]
    fn display_base_parses_from_str() {
        assert_eq!("hex".parse::<DisplayBase>(), Ok(DisplayBase::Hex));
        assert_eq!("dec".parse::<DisplayBase>(), Ok(DisplayBase::Decimal));
        assert_eq!("binary".parse::<DisplayBase>(), Ok(DisplayBase::Binary));
        assert_eq!(DisplayBase::Binary.to_string(), "binary");
    }
}
