//! Storage module.
//!
//! Agent records and the store interface engines persist through.
//! Note: The durable store itself belongs to the embedder. `MemoryStore`
//! covers tests and embedders that persist elsewhere.

pub mod memory;
pub mod models;
pub mod store;

pub use memory::*;
pub use models::*;
pub use store::*;
