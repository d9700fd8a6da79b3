//! Network module.
//!
//! Transport interface, TLS policy, Fleet wire types and the Fleet and bulk
//! clients built on top of them.

pub mod bulk;
pub mod fleet;
pub mod metadata;
pub mod tls;
pub mod transport;
pub mod wire;

pub use bulk::*;
pub use fleet::*;
pub use metadata::*;
pub use tls::*;
pub use transport::*;
