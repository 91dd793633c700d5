//! IEC 61850 quality descriptor.

use crate::error::{IedClientError, Result};
use crate::types::MmsValue;

/// Number of bits of the quality bit string on the wire.
pub const QUALITY_BIT_STRING_SIZE: u8 = 13;

/// Validity part of a [`Quality`] (low two bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum Validity {
    /// Good (0)
    #[default]
    Good = 0,
    /// Invalid (1)
    Invalid = 1,
    /// Reserved (2)
    Reserved = 2,
    /// Questionable (3)
    Questionable = 3,
}

impl Validity {
    #[inline]
    const fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => Self::Good,
            1 => Self::Invalid,
            2 => Self::Reserved,
            _ => Self::Questionable,
        }
    }
}

impl std::fmt::Display for Validity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => f.write_str("GOOD"),
            Self::Invalid => f.write_str("INVALID"),
            Self::Reserved => f.write_str("RESERVED"),
            Self::Questionable => f.write_str("QUESTIONABLE"),
        }
    }
}

/// Quality of a data attribute.
///
/// Packed into 16 bits. Bit layout:
/// - Bits 0-1: validity
/// - Bit 2: overflow
/// - Bit 3: out of range
/// - Bit 4: bad reference
/// - Bit 5: oscillatory
/// - Bit 6: failure
/// - Bit 7: old data
/// - Bit 8: inconsistent
/// - Bit 9: inaccurate
/// - Bit 10: source substituted
/// - Bit 11: test
/// - Bit 12: operator blocked
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Quality(u16);

impl Quality {
    const VALIDITY_MASK: u16 = 0x0003;
    const OVERFLOW_MASK: u16 = 1 << 2;
    const OUT_OF_RANGE_MASK: u16 = 1 << 3;
    const BAD_REFERENCE_MASK: u16 = 1 << 4;
    const OSCILLATORY_MASK: u16 = 1 << 5;
    const FAILURE_MASK: u16 = 1 << 6;
    const OLD_DATA_MASK: u16 = 1 << 7;
    const INCONSISTENT_MASK: u16 = 1 << 8;
    const INACCURATE_MASK: u16 = 1 << 9;
    const SUBSTITUTED_MASK: u16 = 1 << 10;
    const TEST_MASK: u16 = 1 << 11;
    const OPERATOR_BLOCKED_MASK: u16 = 1 << 12;

    /// Create from the raw packed value.
    #[inline(always)]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Get the raw packed value.
    #[inline(always)]
    pub const fn as_raw(&self) -> u16 {
        self.0
    }

    /// Create from a 13 bit quality bit string value.
    pub fn from_mms_value(value: &MmsValue) -> Result<Self> {
        let size = value.bit_string_size()?;
        if size != QUALITY_BIT_STRING_SIZE {
            return Err(IedClientError::invalid_argument(format!(
                "quality bit string has {size} bits, expected {QUALITY_BIT_STRING_SIZE}"
            )));
        }
        Ok(Self(value.bit_string_as_integer()? as u16))
    }

    /// Convert to a 13 bit bit string value.
    pub fn to_mms_value(&self) -> MmsValue {
        MmsValue::bit_string_from_integer(u32::from(self.0), QUALITY_BIT_STRING_SIZE)
    }

    /// Get the validity.
    #[inline(always)]
    pub const fn validity(&self) -> Validity {
        Validity::from_bits(self.0)
    }

    /// Set the validity, leaving every other flag untouched.
    #[inline(always)]
    pub fn set_validity(&mut self, validity: Validity) {
        self.0 = (self.0 & !Self::VALIDITY_MASK) | validity as u16;
    }

    /// Check if the validity is good.
    #[inline(always)]
    pub const fn is_good(&self) -> bool {
        matches!(self.validity(), Validity::Good)
    }

    #[inline(always)]
    const fn flag(&self, mask: u16) -> bool {
        (self.0 & mask) != 0
    }

    #[inline(always)]
    fn set_flag(&mut self, mask: u16, value: bool) {
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// Overflow
    pub const fn overflow(&self) -> bool {
        self.flag(Self::OVERFLOW_MASK)
    }

    /// Set overflow flag
    pub fn set_overflow(&mut self, value: bool) {
        self.set_flag(Self::OVERFLOW_MASK, value);
    }

    /// Out of range
    pub const fn out_of_range(&self) -> bool {
        self.flag(Self::OUT_OF_RANGE_MASK)
    }

    /// Set out of range flag
    pub fn set_out_of_range(&mut self, value: bool) {
        self.set_flag(Self::OUT_OF_RANGE_MASK, value);
    }

    /// Bad reference
    pub const fn bad_reference(&self) -> bool {
        self.flag(Self::BAD_REFERENCE_MASK)
    }

    /// Set bad reference flag
    pub fn set_bad_reference(&mut self, value: bool) {
        self.set_flag(Self::BAD_REFERENCE_MASK, value);
    }

    /// Oscillatory
    pub const fn oscillatory(&self) -> bool {
        self.flag(Self::OSCILLATORY_MASK)
    }

    /// Set oscillatory flag
    pub fn set_oscillatory(&mut self, value: bool) {
        self.set_flag(Self::OSCILLATORY_MASK, value);
    }

    /// Failure
    pub const fn failure(&self) -> bool {
        self.flag(Self::FAILURE_MASK)
    }

    /// Set failure flag
    pub fn set_failure(&mut self, value: bool) {
        self.set_flag(Self::FAILURE_MASK, value);
    }

    /// Old data
    pub const fn old_data(&self) -> bool {
        self.flag(Self::OLD_DATA_MASK)
    }

    /// Set old data flag
    pub fn set_old_data(&mut self, value: bool) {
        self.set_flag(Self::OLD_DATA_MASK, value);
    }

    /// Inconsistent
    pub const fn inconsistent(&self) -> bool {
        self.flag(Self::INCONSISTENT_MASK)
    }

    /// Set inconsistent flag
    pub fn set_inconsistent(&mut self, value: bool) {
        self.set_flag(Self::INCONSISTENT_MASK, value);
    }

    /// Inaccurate
    pub const fn inaccurate(&self) -> bool {
        self.flag(Self::INACCURATE_MASK)
    }

    /// Set inaccurate flag
    pub fn set_inaccurate(&mut self, value: bool) {
        self.set_flag(Self::INACCURATE_MASK, value);
    }

    /// Source is substituted instead of process
    pub const fn substituted(&self) -> bool {
        self.flag(Self::SUBSTITUTED_MASK)
    }

    /// Set substituted flag
    pub fn set_substituted(&mut self, value: bool) {
        self.set_flag(Self::SUBSTITUTED_MASK, value);
    }

    /// Test
    pub const fn test(&self) -> bool {
        self.flag(Self::TEST_MASK)
    }

    /// Set test flag
    pub fn set_test(&mut self, value: bool) {
        self.set_flag(Self::TEST_MASK, value);
    }

    /// Operator blocked
    pub const fn operator_blocked(&self) -> bool {
        self.flag(Self::OPERATOR_BLOCKED_MASK)
    }

    /// Set operator blocked flag
    pub fn set_operator_blocked(&mut self, value: bool) {
        self.set_flag(Self::OPERATOR_BLOCKED_MASK, value);
    }
}

impl std::fmt::Debug for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quality")
            .field("validity", &self.validity())
            .field("overflow", &self.overflow())
            .field("out_of_range", &self.out_of_range())
            .field("bad_reference", &self.bad_reference())
            .field("oscillatory", &self.oscillatory())
            .field("failure", &self.failure())
            .field("old_data", &self.old_data())
            .field("inconsistent", &self.inconsistent())
            .field("inaccurate", &self.inaccurate())
            .field("substituted", &self.substituted())
            .field("test", &self.test())
            .field("operator_blocked", &self.operator_blocked())
            .finish()
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.validity())?;

        let flags = [
            (self.overflow(), "OV"),
            (self.out_of_range(), "OR"),
            (self.bad_reference(), "BR"),
            (self.oscillatory(), "OS"),
            (self.failure(), "FA"),
            (self.old_data(), "OD"),
            (self.inconsistent(), "IC"),
            (self.inaccurate(), "IA"),
            (self.substituted(), "SB"),
            (self.test(), "T"),
            (self.operator_blocked(), "OB"),
        ];
        for (_, name) in flags.iter().filter(|(set, _)| *set) {
            write!(f, "|{name}")?;
        }
        Ok(())
    }
}
