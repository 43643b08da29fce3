//! Length-prefixed message framing for IPC.
//!
//! Every frame is a fixed-width ASCII decimal length followed by exactly that
//! many payload bytes:
//!
//! ```text
//! +------------------------+------------------+
//! | length (10 digits, 0-  |  JSON payload    |
//! | padded decimal ASCII)  |                  |
//! +------------------------+------------------+
//! ```
//!
//! No maximum is enforced on the receive side beyond what the header can
//! express; the payload buffer grows as bytes arrive rather than being
//! allocated up front from the header value.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::HEADER_LEN;
use crate::error::{ProtocolError, ProtocolResult};

/// Largest payload the header can describe.
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// Initial capacity reserved for an incoming payload.
const READ_CHUNK: usize = 64 * 1024;

/// Encodes a payload into a complete frame.
///
/// # Example
///
/// ```rust
/// use lsm_protocol::encode_frame;
///
/// let frame = encode_frame(b"{}").unwrap();
/// assert_eq!(frame, b"0000000002{}");
/// ```
pub fn encode_frame(payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buffer = Vec::with_capacity(HEADER_LEN + payload.len());
    buffer.extend_from_slice(format!("{:0width$}", payload.len(), width = HEADER_LEN).as_bytes());
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

/// Decodes one complete frame, returning its payload.
///
/// Trailing bytes after the payload are ignored.
pub fn decode_frame(data: &[u8]) -> ProtocolResult<&[u8]> {
    if data.len() < HEADER_LEN {
        return Err(incomplete(HEADER_LEN, data.len()));
    }

    let len = parse_header(&data[..HEADER_LEN])?;
    let end = HEADER_LEN + len;
    if data.len() < end {
        return Err(incomplete(end, data.len()));
    }

    Ok(&data[HEADER_LEN..end])
}

/// Parses a length header.
///
/// Only ASCII digits are accepted; signs, whitespace and values that do not
/// fit in 32 bits are reported as [`ProtocolError::InvalidHeader`].
pub fn parse_header(header: &[u8]) -> ProtocolResult<usize> {
    let invalid = || ProtocolError::InvalidHeader {
        header: String::from_utf8_lossy(header).into_owned(),
    };

    if header.len() != HEADER_LEN || !header.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    std::str::from_utf8(header)
        .ok()
        .and_then(|digits| digits.parse::<u32>().ok())
        .map(|len| len as usize)
        .ok_or_else(invalid)
}

/// Writes one frame, retrying partial writes until every byte is accepted.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    trace!(payload = %String::from_utf8_lossy(payload), "send frame");
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` if the stream ends cleanly before the first header
/// byte. End of stream anywhere inside a frame is an IO error.
pub async fn read_frame<R>(reader: &mut R) -> ProtocolResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(incomplete(HEADER_LEN, filled));
        }
        filled += n;
    }

    let len = parse_header(&header)?;

    let mut payload = Vec::with_capacity(len.min(READ_CHUNK));
    let received = reader.take(len as u64).read_to_end(&mut payload).await?;
    if received < len {
        return Err(incomplete(len, received));
    }

    trace!(payload = %String::from_utf8_lossy(&payload), "recv frame");
    Ok(Some(payload))
}

fn incomplete(expected: usize, received: usize) -> ProtocolError {
    ProtocolError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("incomplete frame: expected {} bytes, got {}", expected, received),
    ))
}
