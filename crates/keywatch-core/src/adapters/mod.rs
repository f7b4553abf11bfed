//! Adapters bundled with the core crate.
//!
//! Production network adapters (mail provider, key directory, message
//! source) live in the runtime crate; here are only the in-memory store and
//! the mocks.

pub mod memory;
pub mod mock;

pub use memory::MemoryStore;
