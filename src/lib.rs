//! # iec61850_client
//!
//! IEC 61850 / MMS client core for Rust.
//!
//! This crate provides the client side of IEC 61850 over MMS: a typed value
//! model, object reference mapping, and the select/operate/cancel control
//! state machine. The ISO/ACSE/MMS stack itself is supplied by the caller
//! through the [`MmsTransport`] trait.
//!
//! ## Features
//!
//! - **Typed values**: `MmsValue` with checked accessors and conversions
//! - **Control**: Direct and select-before-operate models, time activated operate
//! - **Error taxonomy**: Argument, connection and service errors with stable codes
//! - **Event-driven**: Connection close and control reports via a channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use iec61850_client::{ClientConfig, FunctionalConstraint, IedConnection, MmsValue, OrCat};
//!
//! #[tokio::main]
//! async fn main() -> iec61850_client::Result<()> {
//!     let config = ClientConfig::new("192.168.1.50");
//!     let mut conn = IedConnection::new(config, my_mms_stack());
//!
//!     conn.connect().await?;
//!
//!     let power = conn.read_float("LD1/MMXU1.TotW.mag.f", FunctionalConstraint::MX).await?;
//!     println!("TotW = {power}");
//!
//!     // Select before operate
//!     let handle = conn.create_control_object("LD1/CSWI1.Pos").await?;
//!     let mut control = conn.control(handle)?;
//!     control.set_origin("operator-1", OrCat::StationControl);
//!     if control.select().await? {
//!         control.operate(MmsValue::Boolean(true)).await?;
//!     }
//!
//!     conn.release().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## MMS Mapping
//!
//! ```text
//! LD1/CSWI1.Pos.stVal[ST]  ──▶  domain "LD1", item "CSWI1$ST$Pos$stVal"
//! LD1/CSWI1.Pos (control)  ──▶  CSWI1$CO$Pos$Oper | $SBO | $SBOw | $Cancel
//!                               CSWI1$CF$Pos$ctlModel
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod control;
pub mod error;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock;

// Re-export main types
pub use client::{ClientConfig, CloseReason, ConnectionState, IedConnection, IedEvent};
pub use control::{ControlHandle, ControlObjectClient, ControlState};
pub use error::{ErrorCategory, IedClientError, MmsError, Result};
pub use transport::{ConnectionParameters, MmsRequest, MmsResponse, MmsTransport, TransportEvent};
pub use types::*;
