//! Collector capability, registry and document envelope.
//!
//! Collectors produce documents into per-kind buffers; the upload engine
//! drains those buffers on its own cadence.

pub mod component;
pub mod document;
pub mod path;
pub mod registry;

pub use component::*;
pub use document::*;
pub use path::*;
pub use registry::*;
