//! Policy handling.
//!
//! Turns raw `POLICY_CHANGE` actions into validated [`Policy`] records and
//! decides whether an incoming revision replaces the stored one.
//!
//! [`Policy`]: crate::storage::Policy

pub mod fields;
pub mod interval;
pub mod parser;
pub mod revision;

pub use interval::*;
pub use parser::*;
pub use revision::*;
