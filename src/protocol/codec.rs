//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! Reads are exact: a frame is consumed byte by byte until complete, and a
//! peer that goes away halfway surfaces as [`DrawError::ConnectionClosed`]
//! instead of a short buffer.

use std::io::{Cursor, ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::contest::Contestant;
use crate::error::{DrawError, Result};
use super::{Frame, MessageCode};

/// Value in a record's first length slot that ends a batch
pub const BATCH_TERMINATOR: u32 = u32::MAX;

/// Maximum length of a single string field (1 MiB)
pub const MAX_FIELD_LEN: u32 = 1024 * 1024;

/// Maximum number of contestant records in one frame
pub const MAX_BATCH_RECORDS: usize = 100_000;

/// Maximum total field bytes in one frame (64 MiB)
pub const MAX_BATCH_BYTES: u64 = 64 * 1024 * 1024;

/// Length prefix size
const LEN_SIZE: usize = 4;

/// Fields per contestant record
const RECORD_FIELDS: usize = 4;

// =============================================================================
// Encoding
// =============================================================================

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn encode_batch(contestants: &[Contestant]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + LEN_SIZE + contestants.len() * 64);
    buf.put_u8(MessageCode::Normal as u8);
    for contestant in contestants {
        put_string(&mut buf, contestant.first_name());
        put_string(&mut buf, contestant.last_name());
        put_string(&mut buf, contestant.document());
        put_string(&mut buf, &contestant.birth_date_iso());
    }
    buf.put_u32(BATCH_TERMINATOR);
    buf.freeze()
}

/// Encode a request carrying `contestants`
///
/// Format: Normal (1) + records + terminator (4)
pub fn encode_request(contestants: &[Contestant]) -> Bytes {
    encode_batch(contestants)
}

/// Encode a response carrying the winners of one request
///
/// Same layout as a request.
pub fn encode_response(winners: &[Contestant]) -> Bytes {
    encode_batch(winners)
}

/// Encode an error frame
///
/// Format: Error (1) + len (4) + message
pub fn encode_error(message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + LEN_SIZE + message.len());
    buf.put_u8(MessageCode::Error as u8);
    put_string(&mut buf, message);
    buf.freeze()
}

// =============================================================================
// Stream primitives
// =============================================================================

/// Fill `buf` completely, looping over short reads
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(DrawError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(DrawError::ConnectionClosed)
            }
            Err(e) => return Err(DrawError::Transport(e)),
        }
    }
    Ok(())
}

/// Read the leading byte of a frame
///
/// `None` means the peer closed cleanly on a frame boundary.
fn read_leading_byte<R: Read>(reader: &mut R) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(DrawError::Transport(e)),
        }
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    read_full(reader, &mut byte)?;
    Ok(byte[0])
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut word = [0u8; LEN_SIZE];
    read_full(reader, &mut word)?;
    Ok(u32::from_be_bytes(word))
}

/// Read `len` raw bytes of a string field
fn read_field<R: Read>(reader: &mut R, len: u32) -> Result<Vec<u8>> {
    if len > MAX_FIELD_LEN {
        return Err(DrawError::Protocol(format!(
            "Malformed field length: {} bytes (max {})",
            len, MAX_FIELD_LEN
        )));
    }
    let mut field = vec![0u8; len as usize];
    read_full(reader, &mut field)?;
    Ok(field)
}

fn read_length_prefixed<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_u32(reader)?;
    read_field(reader, len)
}

fn into_text(bytes: Vec<u8>, what: &str) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| DrawError::Application(format!("{} is not valid UTF-8: {}", what, e)))
}

// =============================================================================
// Frame decoding
// =============================================================================

/// Read the records of a Normal frame up to and including the terminator
///
/// The whole frame is consumed before any field is validated so that a
/// bad record leaves the stream positioned at the next frame.
///
/// A frame over [`MAX_BATCH_RECORDS`] records or [`MAX_BATCH_BYTES`] field
/// bytes is a protocol violation.
fn read_batch<R: Read>(reader: &mut R) -> Result<Vec<Contestant>> {
    let mut raw: Vec<[Vec<u8>; RECORD_FIELDS]> = Vec::new();
    let mut frame_bytes: u64 = 0;
    loop {
        let first_len = read_u32(reader)?;
        if first_len == BATCH_TERMINATOR {
            break;
        }
        if raw.len() >= MAX_BATCH_RECORDS {
            return Err(DrawError::Protocol(format!(
                "Malformed batch: more than {} records",
                MAX_BATCH_RECORDS
            )));
        }
        let first_name = read_field(reader, first_len)?;
        let last_name = read_length_prefixed(reader)?;
        let document = read_length_prefixed(reader)?;
        let birth_date = read_length_prefixed(reader)?;

        frame_bytes += [&first_name, &last_name, &document, &birth_date]
            .iter()
            .map(|field| field.len() as u64)
            .sum::<u64>();
        if frame_bytes > MAX_BATCH_BYTES {
            return Err(DrawError::Protocol(format!(
                "Malformed batch: more than {} field bytes",
                MAX_BATCH_BYTES
            )));
        }
        raw.push([first_name, last_name, document, birth_date]);
    }

    raw.into_iter()
        .map(|[first_name, last_name, document, birth_date]| {
            let birth_date = into_text(birth_date, "birth date")?;
            Contestant::parse(
                into_text(first_name, "first name")?,
                into_text(last_name, "last name")?,
                into_text(document, "document")?,
                &birth_date,
            )
        })
        .collect()
}

/// Read one complete frame of either kind
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let code = read_u8(reader)?;
    read_frame_body(reader, code)
}

fn read_frame_body<R: Read>(reader: &mut R, code: u8) -> Result<Frame> {
    match MessageCode::try_from(code) {
        Ok(MessageCode::Normal) => Ok(Frame::Normal(read_batch(reader)?)),
        Ok(MessageCode::Error) => {
            let message = read_length_prefixed(reader)?;
            Ok(Frame::Error(String::from_utf8_lossy(&message).into_owned()))
        }
        Err(unknown) => Err(DrawError::Protocol(format!(
            "Unknown message code: 0x{:02x}",
            unknown
        ))),
    }
}

/// Read a frame where a contestant batch is expected
///
/// An Error frame from the peer becomes [`DrawError::Application`].
fn read_batch_frame<R: Read>(reader: &mut R) -> Result<Vec<Contestant>> {
    expect_batch(read_frame(reader)?)
}

fn expect_batch(frame: Frame) -> Result<Vec<Contestant>> {
    match frame {
        Frame::Normal(contestants) => Ok(contestants),
        Frame::Error(message) => Err(DrawError::Application(format!(
            "Error received: {}",
            message
        ))),
    }
}

/// Read a complete request from a stream
///
/// Blocks until the terminator is received or an error occurs
pub fn read_request<R: Read>(reader: &mut R) -> Result<Vec<Contestant>> {
    read_batch_frame(reader)
}

/// Read the next request on a connection
///
/// Returns `Ok(None)` when the peer closed before sending another frame.
/// A close anywhere after the leading byte is [`DrawError::ConnectionClosed`].
pub fn read_next_request<R: Read>(reader: &mut R) -> Result<Option<Vec<Contestant>>> {
    match read_leading_byte(reader)? {
        None => Ok(None),
        Some(code) => expect_batch(read_frame_body(reader, code)?).map(Some),
    }
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Vec<Contestant>> {
    read_batch_frame(reader)
}

fn ensure_consumed(cursor: &Cursor<&[u8]>) -> Result<()> {
    let trailing = cursor.get_ref().len() as u64 - cursor.position();
    if trailing > 0 {
        return Err(DrawError::Protocol(format!(
            "{} trailing bytes after frame",
            trailing
        )));
    }
    Ok(())
}

/// Decode a single frame from bytes
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let mut cursor = Cursor::new(bytes);
    let frame = read_frame(&mut cursor)?;
    ensure_consumed(&cursor)?;
    Ok(frame)
}

/// Decode a request from bytes
pub fn decode_request(bytes: &[u8]) -> Result<Vec<Contestant>> {
    let mut cursor = Cursor::new(bytes);
    let contestants = read_request(&mut cursor)?;
    ensure_consumed(&cursor)?;
    Ok(contestants)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Vec<Contestant>> {
    let mut cursor = Cursor::new(bytes);
    let winners = read_response(&mut cursor)?;
    ensure_consumed(&cursor)?;
    Ok(winners)
}

// =============================================================================
// Stream writers
// =============================================================================

fn write_frame<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, contestants: &[Contestant]) -> Result<()> {
    write_frame(writer, &encode_request(contestants))
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, winners: &[Contestant]) -> Result<()> {
    write_frame(writer, &encode_response(winners))
}

/// Write an error frame to a stream
pub fn write_error<W: Write>(writer: &mut W, message: &str) -> Result<()> {
    write_frame(writer, &encode_error(message))
}
