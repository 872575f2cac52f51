//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (big-endian, self-delimiting)
//!
//! ### Request / Response
//! ```text
//! ┌──────────┬──────────────────────────────────┬────────────────┐
//! │ Code (1) │ Contestant record × N            │ 0xFFFFFFFF (4) │
//! └──────────┴──────────────────────────────────┴────────────────┘
//! ```
//!
//! ### Contestant Record
//! ```text
//! ┌─────────┬───────┬─────────┬──────┬─────────┬─────┬─────────┬────────────┐
//! │ Len (4) │ First │ Len (4) │ Last │ Len (4) │ Doc │ Len (4) │ YYYY-MM-DD │
//! └─────────┴───────┴─────────┴──────┴─────────┴─────┴─────────┴────────────┘
//! ```
//!
//! ### Error
//! ```text
//! ┌──────────┬─────────┬──────────────────┐
//! │ Code (1) │ Len (4) │ UTF-8 message    │
//! └──────────┴─────────┴──────────────────┘
//! ```
//!
//! ### Message Codes
//! - 0x00: NORMAL
//! - 0x01: ERROR

mod frame;
mod codec;

pub use frame::{Frame, MessageCode};
pub use codec::{
    decode_frame, decode_request, decode_response, encode_error, encode_request,
    encode_response, read_frame, read_next_request, read_request, read_response, write_error,
    write_request, write_response, BATCH_TERMINATOR, MAX_BATCH_BYTES, MAX_BATCH_RECORDS,
    MAX_FIELD_LEN,
};
