//! Typed MMS values.
//!
//! [`MmsValue`] is a tagged union over every data type an IEC 61850 server
//! exchanges through MMS. Exactly one variant is active and accessors never
//! coerce between kinds: asking an integer for its boolean value is a
//! [`IedClientError::TypeMismatch`].

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{IedClientError, Result};

/// Maximum width of a bit string value in bits.
pub const MAX_BIT_STRING_SIZE: u8 = 32;

/// MMS data type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmsType {
    /// Array (elements of the same type)
    Array,
    /// Structure (elements of different types)
    Structure,
    /// Boolean
    Boolean,
    /// Bit string
    BitString,
    /// Signed integer
    Integer,
    /// Unsigned integer
    Unsigned,
    /// Floating point (32 or 64 bit)
    Float,
    /// Octet string
    OctetString,
    /// Visible string
    VisibleString,
    /// Generalized time
    GeneralizedTime,
    /// Binary time
    BinaryTime,
    /// Binary coded decimal
    Bcd,
    /// Object identifier
    ObjectId,
    /// Unicode string
    MmsString,
    /// UTC time
    UtcTime,
    /// Per-item data access error
    DataAccessError,
}

impl MmsType {
    /// Short lowercase name of the type.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Structure => "structure",
            Self::Boolean => "boolean",
            Self::BitString => "bit-string",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned",
            Self::Float => "float",
            Self::OctetString => "octet-string",
            Self::VisibleString => "visible-string",
            Self::GeneralizedTime => "generalized-time",
            Self::BinaryTime => "binary-time",
            Self::Bcd => "bcd",
            Self::ObjectId => "object-id",
            Self::MmsString => "mms-string",
            Self::UtcTime => "utc-time",
            Self::DataAccessError => "data-access-error",
        }
    }

    /// Check if values of this type contain child elements.
    #[inline]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Array | Self::Structure)
    }
}

impl std::fmt::Display for MmsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// MMS data access error returned in place of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataAccessError {
    /// Object invalidated (0)
    ObjectInvalidated = 0,
    /// Hardware fault (1)
    HardwareFault = 1,
    /// Temporarily unavailable (2)
    TemporarilyUnavailable = 2,
    /// Object access denied (3)
    ObjectAccessDenied = 3,
    /// Object undefined (4)
    ObjectUndefined = 4,
    /// Invalid address (5)
    InvalidAddress = 5,
    /// Type unsupported (6)
    TypeUnsupported = 6,
    /// Type inconsistent (7)
    TypeInconsistent = 7,
    /// Object attribute inconsistent (8)
    ObjectAttributeInconsistent = 8,
    /// Object access unsupported (9)
    ObjectAccessUnsupported = 9,
    /// Object non-existent (10)
    ObjectNonExistent = 10,
    /// Object value invalid (11)
    ObjectValueInvalid = 11,
}

impl DataAccessError {
    /// Create from the MMS wire code.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Self::ObjectInvalidated),
            1 => Ok(Self::HardwareFault),
            2 => Ok(Self::TemporarilyUnavailable),
            3 => Ok(Self::ObjectAccessDenied),
            4 => Ok(Self::ObjectUndefined),
            5 => Ok(Self::InvalidAddress),
            6 => Ok(Self::TypeUnsupported),
            7 => Ok(Self::TypeInconsistent),
            8 => Ok(Self::ObjectAttributeInconsistent),
            9 => Ok(Self::ObjectAccessUnsupported),
            10 => Ok(Self::ObjectNonExistent),
            11 => Ok(Self::ObjectValueInvalid),
            other => Err(IedClientError::Decode(format!(
                "unknown data access error code {other}"
            ))),
        }
    }

    /// Convert to the MMS wire code.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Check if the error means the addressed object is not there at all.
    #[inline]
    pub const fn is_missing_object(self) -> bool {
        matches!(self, Self::ObjectNonExistent | Self::ObjectUndefined)
    }

    /// Map to the client error taxonomy.
    pub fn to_client_error(self) -> IedClientError {
        match self {
            Self::ObjectNonExistent | Self::ObjectUndefined => IedClientError::ObjectDoesNotExist,
            Self::ObjectAccessDenied => IedClientError::AccessDenied,
            Self::ObjectAccessUnsupported => IedClientError::ObjectAccessUnsupported,
            other => IedClientError::Unknown(format!("data access error: {other}")),
        }
    }
}

impl std::fmt::Display for DataAccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ObjectInvalidated => "object-invalidated",
            Self::HardwareFault => "hardware-fault",
            Self::TemporarilyUnavailable => "temporarily-unavailable",
            Self::ObjectAccessDenied => "object-access-denied",
            Self::ObjectUndefined => "object-undefined",
            Self::InvalidAddress => "invalid-address",
            Self::TypeUnsupported => "type-unsupported",
            Self::TypeInconsistent => "type-inconsistent",
            Self::ObjectAttributeInconsistent => "object-attribute-inconsistent",
            Self::ObjectAccessUnsupported => "object-access-unsupported",
            Self::ObjectNonExistent => "object-non-existent",
            Self::ObjectValueInvalid => "object-value-invalid",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// A typed MMS value.
#[derive(Debug, Clone, PartialEq)]
pub enum MmsValue {
    /// Ordered elements of one type
    Array(Vec<MmsValue>),

    /// Ordered elements of mixed types
    Structure(Vec<MmsValue>),

    /// Boolean
    Boolean(bool),

    /// Bit string: bit `n` is `(bits >> n) & 1`, `size` bits are valid
    BitString { bits: u32, size: u8 },

    /// Signed integer up to 64 bit
    Integer(i64),

    /// Unsigned integer up to 32 bit
    Unsigned(u32),

    /// 32 bit IEEE 754 floating point
    Float(f32),

    /// 64 bit IEEE 754 floating point
    Double(f64),

    /// Octet string
    OctetString(Bytes),

    /// Visible string
    VisibleString(String),

    /// Generalized time in its textual form
    GeneralizedTime(String),

    /// Binary time, milliseconds since epoch
    BinaryTime(u64),

    /// Binary coded decimal
    Bcd(u32),

    /// Object identifier arcs
    ObjectId(Vec<u32>),

    /// Unicode string
    MmsString(String),

    /// UTC time, milliseconds since epoch
    UtcTime(u64),

    /// Data access error in place of a value
    DataAccessError(DataAccessError),
}

impl MmsValue {
    /// Create a visible string value.
    pub fn visible_string(value: impl Into<String>) -> Self {
        Self::VisibleString(value.into())
    }

    /// Create a unicode string value.
    pub fn mms_string(value: impl Into<String>) -> Self {
        Self::MmsString(value.into())
    }

    /// Create an octet string value.
    pub fn octet_string(value: impl Into<Bytes>) -> Self {
        Self::OctetString(value.into())
    }

    /// Create a bit string with all bits cleared.
    ///
    /// Sizes above [`MAX_BIT_STRING_SIZE`] saturate.
    pub fn bit_string(size: u8) -> Self {
        Self::BitString {
            bits: 0,
            size: size.min(MAX_BIT_STRING_SIZE),
        }
    }

    /// Create a bit string from its integer encoding; bits beyond `size` are dropped.
    pub fn bit_string_from_integer(bits: u32, size: u8) -> Self {
        let size = size.min(MAX_BIT_STRING_SIZE);
        Self::BitString {
            bits: bits & bit_mask(size),
            size,
        }
    }

    /// Create a UTC time value from milliseconds since epoch.
    #[inline]
    pub const fn utc_time(millis: u64) -> Self {
        Self::UtcTime(millis)
    }

    /// Create a binary time value from milliseconds since epoch.
    #[inline]
    pub const fn binary_time(millis: u64) -> Self {
        Self::BinaryTime(millis)
    }

    /// Create a generalized time value.
    pub fn generalized_time(value: impl Into<String>) -> Self {
        Self::GeneralizedTime(value.into())
    }

    /// Create an object identifier value.
    pub fn object_id(arcs: impl Into<Vec<u32>>) -> Self {
        Self::ObjectId(arcs.into())
    }

    /// Create an array value.
    pub fn array(elements: impl Into<Vec<MmsValue>>) -> Self {
        Self::Array(elements.into())
    }

    /// Create a structure value.
    pub fn structure(elements: impl Into<Vec<MmsValue>>) -> Self {
        Self::Structure(elements.into())
    }

    /// Create a data access error value.
    #[inline]
    pub const fn data_access_error(err: DataAccessError) -> Self {
        Self::DataAccessError(err)
    }

    /// Get the active variant tag.
    pub const fn kind(&self) -> MmsType {
        match self {
            Self::Array(_) => MmsType::Array,
            Self::Structure(_) => MmsType::Structure,
            Self::Boolean(_) => MmsType::Boolean,
            Self::BitString { .. } => MmsType::BitString,
            Self::Integer(_) => MmsType::Integer,
            Self::Unsigned(_) => MmsType::Unsigned,
            Self::Float(_) | Self::Double(_) => MmsType::Float,
            Self::OctetString(_) => MmsType::OctetString,
            Self::VisibleString(_) => MmsType::VisibleString,
            Self::GeneralizedTime(_) => MmsType::GeneralizedTime,
            Self::BinaryTime(_) => MmsType::BinaryTime,
            Self::Bcd(_) => MmsType::Bcd,
            Self::ObjectId(_) => MmsType::ObjectId,
            Self::MmsString(_) => MmsType::MmsString,
            Self::UtcTime(_) => MmsType::UtcTime,
            Self::DataAccessError(_) => MmsType::DataAccessError,
        }
    }

    fn mismatch(&self, expected: MmsType) -> IedClientError {
        IedClientError::TypeMismatch {
            expected,
            actual: self.kind(),
        }
    }

    fn composite(&self) -> Result<&[MmsValue]> {
        match self {
            Self::Array(elements) | Self::Structure(elements) => Ok(elements),
            _ => Err(self.mismatch(MmsType::Structure)),
        }
    }

    /// Number of elements of an array or structure.
    pub fn size(&self) -> Result<usize> {
        self.composite().map(<[MmsValue]>::len)
    }

    /// Element `index` of an array or structure.
    pub fn element(&self, index: usize) -> Result<&MmsValue> {
        let elements = self.composite()?;
        elements.get(index).ok_or(IedClientError::IndexOutOfRange {
            index,
            size: elements.len(),
        })
    }

    /// Replace element `index` of an array or structure.
    pub fn set_element(&mut self, index: usize, value: MmsValue) -> Result<()> {
        let actual = self.kind();
        match self {
            Self::Array(elements) | Self::Structure(elements) => {
                let size = elements.len();
                let slot = elements
                    .get_mut(index)
                    .ok_or(IedClientError::IndexOutOfRange { index, size })?;
                *slot = value;
                Ok(())
            }
            _ => Err(IedClientError::TypeMismatch {
                expected: MmsType::Structure,
                actual,
            }),
        }
    }

    /// Iterate the elements of an array or structure.
    ///
    /// Each call starts again from element 0.
    pub fn elements(&self) -> Result<std::slice::Iter<'_, MmsValue>> {
        self.composite().map(<[MmsValue]>::iter)
    }

    /// Get the boolean value.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            _ => Err(self.mismatch(MmsType::Boolean)),
        }
    }

    /// Get a signed integer value.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Integer(v) => Ok(*v),
            _ => Err(self.mismatch(MmsType::Integer)),
        }
    }

    /// Get a signed integer value that must fit in 32 bits.
    pub fn as_i32(&self) -> Result<i32> {
        let v = self.as_i64()?;
        i32::try_from(v)
            .map_err(|_| IedClientError::invalid_argument(format!("integer {v} exceeds 32 bit")))
    }

    /// Get an unsigned integer value.
    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Self::Unsigned(v) => Ok(*v),
            _ => Err(self.mismatch(MmsType::Unsigned)),
        }
    }

    /// Get a floating point value as `f32`.
    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Double(v) => Ok(*v as f32),
            _ => Err(self.mismatch(MmsType::Float)),
        }
    }

    /// Get a floating point value as `f64`.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Float(v) => Ok(f64::from(*v)),
            Self::Double(v) => Ok(*v),
            _ => Err(self.mismatch(MmsType::Float)),
        }
    }

    /// Get the text of a visible or unicode string.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::VisibleString(s) | Self::MmsString(s) => Ok(s),
            _ => Err(self.mismatch(MmsType::VisibleString)),
        }
    }

    /// Get the content of an octet string.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Self::OctetString(b) => Ok(b),
            _ => Err(self.mismatch(MmsType::OctetString)),
        }
    }

    /// Get a UTC time as milliseconds since epoch.
    pub fn as_utc_time_millis(&self) -> Result<u64> {
        match self {
            Self::UtcTime(ms) => Ok(*ms),
            _ => Err(self.mismatch(MmsType::UtcTime)),
        }
    }

    /// Get a UTC time as seconds since epoch.
    pub fn as_unix_timestamp(&self) -> Result<u32> {
        let ms = self.as_utc_time_millis()?;
        u32::try_from(ms / 1000)
            .map_err(|_| IedClientError::invalid_argument("timestamp exceeds 32 bit seconds"))
    }

    /// Get a binary time as milliseconds since epoch.
    pub fn as_binary_time_millis(&self) -> Result<u64> {
        match self {
            Self::BinaryTime(ms) => Ok(*ms),
            _ => Err(self.mismatch(MmsType::BinaryTime)),
        }
    }

    /// Get the data access error carried in place of a value.
    pub fn as_data_access_error(&self) -> Result<DataAccessError> {
        match self {
            Self::DataAccessError(e) => Ok(*e),
            _ => Err(self.mismatch(MmsType::DataAccessError)),
        }
    }

    /// Check if this value is a data access error.
    #[inline]
    pub const fn is_data_access_error(&self) -> bool {
        matches!(self, Self::DataAccessError(_))
    }

    /// Number of valid bits of a bit string.
    pub fn bit_string_size(&self) -> Result<u8> {
        match self {
            Self::BitString { size, .. } => Ok(*size),
            _ => Err(self.mismatch(MmsType::BitString)),
        }
    }

    /// Integer encoding of a bit string.
    pub fn bit_string_as_integer(&self) -> Result<u32> {
        match self {
            Self::BitString { bits, .. } => Ok(*bits),
            _ => Err(self.mismatch(MmsType::BitString)),
        }
    }

    /// Read bit `pos` of a bit string.
    pub fn bit_string_bit(&self, pos: u8) -> Result<bool> {
        match self {
            Self::BitString { bits, size } => {
                check_bit_pos(pos, *size)?;
                Ok((bits >> pos) & 1 == 1)
            }
            _ => Err(self.mismatch(MmsType::BitString)),
        }
    }

    /// Set bit `pos` of a bit string.
    pub fn set_bit_string_bit(&mut self, pos: u8, value: bool) -> Result<()> {
        let actual = self.kind();
        match self {
            Self::BitString { bits, size } => {
                check_bit_pos(pos, *size)?;
                if value {
                    *bits |= 1 << pos;
                } else {
                    *bits &= !(1 << pos);
                }
                Ok(())
            }
            _ => Err(IedClientError::TypeMismatch {
                expected: MmsType::BitString,
                actual,
            }),
        }
    }
}

#[inline]
const fn bit_mask(size: u8) -> u32 {
    if size >= 32 {
        u32::MAX
    } else {
        (1u32 << size) - 1
    }
}

fn check_bit_pos(pos: u8, size: u8) -> Result<()> {
    if pos < size {
        Ok(())
    } else {
        Err(IedClientError::IndexOutOfRange {
            index: pos as usize,
            size: size as usize,
        })
    }
}

/// Textual rendering of a UTC millisecond time.
pub(crate) fn render_utc_millis(millis: u64) -> Option<String> {
    let millis = i64::try_from(millis).ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

impl std::fmt::Display for MmsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VisibleString(s) | Self::MmsString(s) => f.write_str(s),
            Self::Boolean(true) => f.write_str("True"),
            Self::Boolean(false) => f.write_str("False"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::UtcTime(ms) => match render_utc_millis(*ms) {
                Some(text) => f.write_str(&text),
                None => f.write_str("unknown"),
            },
            _ => f.write_str("unknown"),
        }
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for MmsValue {
            fn from(v: $t) -> Self {
                Self::Integer(i64::from(v))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for MmsValue {
            fn from(v: $t) -> Self {
                Self::Unsigned(u32::from(v))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32);

impl From<bool> for MmsValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f32> for MmsValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for MmsValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for MmsValue {
    fn from(v: &str) -> Self {
        Self::VisibleString(v.to_owned())
    }
}

impl From<String> for MmsValue {
    fn from(v: String) -> Self {
        Self::VisibleString(v)
    }
}
