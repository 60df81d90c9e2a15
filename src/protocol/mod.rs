//! RESP2 wire codec for the client side: reply decoding and command encoding.

mod parser;
mod types;

pub use parser::{Command, Parser};
pub use types::RespValue;
