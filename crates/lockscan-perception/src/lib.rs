//! `lockscan-perception` – turns camera frames into decoded text.
//!
//! # Modules
//!
//! - [`decoder`] – the [`Decoder`][decoder::Decoder] trait and
//!   [`QrDecoder`][decoder::QrDecoder], which finds and decodes every QR
//!   symbol in a frame.

pub mod decoder;

pub use decoder::{Decoder, QrDecoder};
