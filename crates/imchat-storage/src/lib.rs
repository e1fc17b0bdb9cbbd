//! Storage for the imchat core.
//!
//! The core never touches a concrete store; it talks to the
//! [`MessageLog`] port. Two backends ship here: [`MemoryLog`] for tests
//! and embedding, and [`JsonFileLog`], a single JSON document on disk
//! that several processes can share.

pub mod json_file;
pub mod log;
pub mod memory;

pub use json_file::JsonFileLog;
pub use log::MessageLog;
pub use memory::MemoryLog;
