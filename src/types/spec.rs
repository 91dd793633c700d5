//! MMS variable access attributes (type specifications).

use crate::types::{MmsType, MmsValue};

/// Type specification of a named MMS variable or structure component.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    /// Component name (empty for array elements)
    pub name: String,
    /// Type of the component
    pub kind: TypeSpec,
}

/// MMS type description.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    /// Fixed size array of one element type
    Array {
        /// Number of elements
        element_count: u32,
        /// Element type
        element: Box<VariableSpec>,
    },
    /// Ordered named components
    Structure(Vec<VariableSpec>),
    /// Boolean
    Boolean,
    /// Bit string with the number of bits
    BitString(u8),
    /// Signed integer with the number of bits
    Integer(u8),
    /// Unsigned integer with the number of bits
    Unsigned(u8),
    /// Floating point; a format width above 32 bits is a double
    Float {
        /// Total width in bits
        format_width: u8,
        /// Exponent width in bits
        exponent_width: u8,
    },
    /// Octet string
    OctetString,
    /// Visible string
    VisibleString,
    /// Unicode string
    MmsString,
    /// Generalized time
    GeneralizedTime,
    /// Binary time
    BinaryTime,
    /// UTC time
    UtcTime,
    /// Object identifier
    ObjectId,
}

impl VariableSpec {
    /// Create a named component.
    pub fn new(name: impl Into<String>, kind: TypeSpec) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Find a direct structure component by name.
    pub fn child(&self, name: &str) -> Option<&VariableSpec> {
        match &self.kind {
            TypeSpec::Structure(children) => children.iter().find(|c| c.name == name),
            _ => None,
        }
    }

    /// Check if the variable is a structure with the given component.
    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// MMS type tag of this component.
    pub fn mms_type(&self) -> MmsType {
        self.kind.mms_type()
    }

    /// Zero value of this type, structures and arrays filled recursively.
    pub fn default_value(&self) -> MmsValue {
        self.kind.default_value()
    }
}

impl TypeSpec {
    /// MMS type tag.
    pub const fn mms_type(&self) -> MmsType {
        match self {
            Self::Array { .. } => MmsType::Array,
            Self::Structure(_) => MmsType::Structure,
            Self::Boolean => MmsType::Boolean,
            Self::BitString(_) => MmsType::BitString,
            Self::Integer(_) => MmsType::Integer,
            Self::Unsigned(_) => MmsType::Unsigned,
            Self::Float { .. } => MmsType::Float,
            Self::OctetString => MmsType::OctetString,
            Self::VisibleString => MmsType::VisibleString,
            Self::MmsString => MmsType::MmsString,
            Self::GeneralizedTime => MmsType::GeneralizedTime,
            Self::BinaryTime => MmsType::BinaryTime,
            Self::UtcTime => MmsType::UtcTime,
            Self::ObjectId => MmsType::ObjectId,
        }
    }

    /// Zero value of this type.
    pub fn default_value(&self) -> MmsValue {
        match self {
            Self::Array {
                element_count,
                element,
            } => MmsValue::array(
                (0..*element_count)
                    .map(|_| element.default_value())
                    .collect::<Vec<_>>(),
            ),
            Self::Structure(children) => MmsValue::structure(
                children
                    .iter()
                    .map(VariableSpec::default_value)
                    .collect::<Vec<_>>(),
            ),
            Self::Boolean => MmsValue::Boolean(false),
            Self::BitString(size) => MmsValue::bit_string(*size),
            Self::Integer(_) => MmsValue::Integer(0),
            Self::Unsigned(_) => MmsValue::Unsigned(0),
            Self::Float { format_width, .. } => {
                if *format_width > 32 {
                    MmsValue::Double(0.0)
                } else {
                    MmsValue::Float(0.0)
                }
            }
            Self::OctetString => MmsValue::octet_string(Vec::new()),
            Self::VisibleString => MmsValue::visible_string(""),
            Self::MmsString => MmsValue::mms_string(""),
            Self::GeneralizedTime => MmsValue::generalized_time(""),
            Self::BinaryTime => MmsValue::binary_time(0),
            Self::UtcTime => MmsValue::utc_time(0),
            Self::ObjectId => MmsValue::object_id(Vec::new()),
        }
    }
}
