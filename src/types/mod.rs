//! IEC 61850 / MMS type definitions.
//!
//! This module contains the value model shared by the client and the
//! transport seam:
//!
//! - `MmsValue` - Typed MMS value (tagged union)
//! - `Quality` - 16 bit quality descriptor with validity
//! - `FunctionalConstraint` - FC codes
//! - `ObjectReference` - `LD/LN.DO[FC]` references and MMS name mapping
//! - `ControlModel`, `OrCat`, `Origin` - control service enums
//! - `VariableSpec` - MMS variable access attributes

mod control;
mod fc;
mod quality;
mod reference;
mod spec;
mod value;

pub use control::*;
pub use fc::*;
pub use quality::*;
pub use reference::*;
pub use spec::*;
pub use value::*;
