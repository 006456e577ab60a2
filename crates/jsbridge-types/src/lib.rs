//! JsBridge Types - Wire envelopes for the native <-> script bridge
//!
//! This crate contains the foundational types for JsBridge with zero dependencies
//! on other jsbridge crates. It defines:
//!
//! - `Request` and `Response` envelopes and their JSON wire codec
//! - The bridge error taxonomy (`BridgeError`)
//!
//! # Wire Schema
//!
//! ```text
//! Request   {"id"?: string, "handlerName"?: string, "data"?: string}
//! Response  {"id": string, "data"?: string}
//! ```
//!
//! Absent fields are omitted on encode. On decode, a missing field, a JSON
//! `null` and an empty string are all the same thing: absent.

pub mod envelope;
pub mod error;

pub use envelope::*;
pub use error::*;
