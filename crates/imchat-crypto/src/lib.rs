//! Cryptographic primitives for the imchat chat core.
//!
//! This crate is the **sole** location for cryptographic operations.
//! No other crate in the workspace may perform raw crypto directly.
//!
//! # Modules
//!
//! - [`kdf`]: PBKDF2-HMAC-SHA256 session key derivation from a wallet signature
//! - [`aead`]: AES-256-GCM sealing of message payloads into base64 envelopes

pub mod aead;
pub mod kdf;
