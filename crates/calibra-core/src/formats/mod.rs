//! # Formats Module
//!
//! Serialization formats for data the core persists.

pub mod persistence;

pub use persistence::{SelectionRecord, decode_selection, encode_selection, selection_key};
