//! Message protocol for the imchat end-to-end encrypted chat core.
//!
//! Defines the persisted envelope format, its decrypted view form,
//! the login message a wallet signs to derive the session key, and
//! contact address validation.
//!
//! # Modules
//!
//! - [`message`]: `MessageEnvelope`, `ChatMessage`, sealing and opening
//! - [`login`]: Login message template
//! - [`validation`]: Strict wallet address parsing and contact rules

pub mod login;
pub mod message;
pub mod validation;
