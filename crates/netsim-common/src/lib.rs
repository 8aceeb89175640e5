//! Shared building blocks for the netsim engine.
//!
//! This crate contains:
//! - **Address algebra** — [`MacAddress`] and [`Ipv4Address`] value types
//! - **Error taxonomy** — [`error`] module, the `kind`-not-`type` classification
//!   every other crate in the workspace reports against
//! - **Observation bus** — [`observe::Subject`], the mutate-then-publish
//!   container every sim kernel and node state wraps itself in

pub mod address;
pub mod error;
pub mod observe;

pub use address::{Ipv4Address, MacAddress};
pub use error::{AddressError, DiagnosticKind};
pub use observe::Subject;
