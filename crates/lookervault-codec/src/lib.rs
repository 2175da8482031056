//! Deterministic binary encode/decode of Looker API payloads.
//!
//! The wire format is a hand-rolled tagged, length-prefixed encoding (see
//! [`codec::BinCodec`]) chosen so that map key order is preserved exactly
//! and decoding never runs arbitrary code.

mod codec;
mod error;
pub mod timestamp;
mod value;
mod varint;

pub use codec::{BinCodec, Codec};
pub use error::CodecError;
pub use value::Value;
