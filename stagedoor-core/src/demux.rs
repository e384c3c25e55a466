//! Demultiplexer for the backend's framed combined-output stream.
//!
//! The stream is a sequence of frames: an 8-byte header followed by the
//! payload. Byte 0 is the stream tag (2 = stderr, anything else = stdout),
//! bytes 4-7 are the big-endian payload length, bytes 1-3 are padding. A
//! truncated trailing frame ends the stream; it is not an error.

const STDERR_TAG: u8 = 2;
const HEADER_LEN: usize = 8;

/// Splits a raw framed byte sequence into its stdout and stderr frames,
/// dispatching each payload to the matching sink in stream order.
pub fn demux<O, E>(raw: &[u8], mut stdout: O, mut stderr: E)
where
    O: FnMut(&[u8]),
    E: FnMut(&[u8]),
{
    let mut cursor = raw;
    while cursor.len() >= HEADER_LEN {
        let length = u32::from_be_bytes([cursor[4], cursor[5], cursor[6], cursor[7]]) as usize;
        let rest = &cursor[HEADER_LEN..];
        if rest.len() < length {
            // truncated frame, treat as end of stream
            break;
        }
        let payload = &rest[..length];
        if cursor[0] == STDERR_TAG {
            stderr(payload);
        } else {
            stdout(payload);
        }
        cursor = &rest[length..];
    }
}
