//! Frame encoding/decoding
//!
//! Pure translation between relay operations and wire bytes.

use super::frame::checksum;
use super::{
    Ack, CommandFrame, FrameError, FrameKind, RelayTarget, ResponseFrame, StatusSnapshot,
    MAX_CHANNELS, OP_OFF, OP_ON, STATUS_LINE_LEN, SWITCH_FRAME_LEN, SWITCH_HEADER,
};

fn check_index(relay: u8) -> Result<u8, FrameError> {
    if (1..=MAX_CHANNELS).contains(&relay) {
        Ok(relay)
    } else {
        Err(FrameError::InvalidIndex(relay))
    }
}

/// Build the frame that closes `relay`
pub fn encode_on(relay: u8) -> Result<CommandFrame, FrameError> {
    Ok(CommandFrame::switch(check_index(relay)?, true))
}

/// Build the frame that opens `relay`
pub fn encode_off(relay: u8) -> Result<CommandFrame, FrameError> {
    Ok(CommandFrame::switch(check_index(relay)?, false))
}

/// Build the frame that starts a pulse on `relay`
///
/// LCUS boards have no pulse-timer opcode, so a pulse starts with a plain
/// "on" frame and the caller is responsible for the trailing "off".
pub fn encode_toggle(relay: u8) -> Result<CommandFrame, FrameError> {
    encode_on(relay)
}

/// Build the single-byte status request
pub fn encode_status_query() -> CommandFrame {
    CommandFrame::status_query()
}

/// Build switch frames for `target` on a board with `channels` relays
///
/// The protocol has no broadcast opcode; `All` becomes one frame per channel.
pub fn encode_switch(
    target: RelayTarget,
    on: bool,
    channels: u8,
) -> Result<Vec<CommandFrame>, FrameError> {
    if let RelayTarget::All = target {
        check_index(channels)?;
    }
    target
        .channels(channels)
        .into_iter()
        .map(|relay| {
            if on {
                encode_on(relay)
            } else {
                encode_off(relay)
            }
        })
        .collect()
}

/// Exact byte length of the status reply for a board with `channels` relays
pub fn status_frame_len(channels: u8) -> usize {
    channels as usize * STATUS_LINE_LEN
}

/// Decode bytes read from the board
pub fn decode_response(bytes: &[u8]) -> Result<ResponseFrame, FrameError> {
    match bytes.first() {
        Some(&SWITCH_HEADER) => decode_ack(bytes).map(ResponseFrame::Ack),
        Some(b'C') => decode_status(bytes).map(ResponseFrame::Status),
        Some(other) => Err(FrameError::MalformedFrame(format!(
            "unexpected leading byte {:#04x}",
            other
        ))),
        None => Err(FrameError::MalformedFrame("empty frame".to_string())),
    }
}

/// Extract the snapshot from a status reply
pub fn to_status_snapshot(frame: ResponseFrame) -> Result<StatusSnapshot, FrameError> {
    match frame {
        ResponseFrame::Status(snapshot) => Ok(snapshot),
        other => Err(FrameError::WrongFrameKind {
            expected: FrameKind::Status,
            actual: other.kind(),
        }),
    }
}

/// Extract the acknowledgement from an ack reply
pub fn to_ack(frame: ResponseFrame) -> Result<Ack, FrameError> {
    match frame {
        ResponseFrame::Ack(ack) => Ok(ack),
        other => Err(FrameError::WrongFrameKind {
            expected: FrameKind::Ack,
            actual: other.kind(),
        }),
    }
}

fn decode_ack(bytes: &[u8]) -> Result<Ack, FrameError> {
    if bytes.len() != SWITCH_FRAME_LEN {
        return Err(FrameError::MalformedFrame(format!(
            "ack frame is {} bytes, expected {}",
            bytes.len(),
            SWITCH_FRAME_LEN
        )));
    }

    let (relay, op, received) = (bytes[1], bytes[2], bytes[3]);
    let expected = checksum(relay, op);
    if received != expected {
        return Err(FrameError::MalformedFrame(format!(
            "checksum mismatch: expected {:#04x}, got {:#04x}",
            expected, received
        )));
    }

    let on = match op {
        OP_ON => true,
        OP_OFF => false,
        other => return Err(FrameError::UnknownOpcode(other)),
    };

    Ok(Ack {
        relay: check_index(relay)?,
        on,
    })
}

fn decode_status(bytes: &[u8]) -> Result<StatusSnapshot, FrameError> {
    if bytes.len() % STATUS_LINE_LEN != 0 {
        return Err(FrameError::MalformedFrame(format!(
            "status frame is {} bytes, not a multiple of {}",
            bytes.len(),
            STATUS_LINE_LEN
        )));
    }
    let lines = bytes.len() / STATUS_LINE_LEN;
    if lines > MAX_CHANNELS as usize {
        return Err(FrameError::MalformedFrame(format!(
            "status frame reports {} channels",
            lines
        )));
    }

    let mut states = Vec::with_capacity(lines);
    for (i, line) in bytes.chunks_exact(STATUS_LINE_LEN).enumerate() {
        let relay = i as u8 + 1;
        states.push((relay, decode_status_line(line, relay)?));
    }
    Ok(StatusSnapshot::from_states(states))
}

// Line layout: "CH" digit ": " state(3) "\r\n"
fn decode_status_line(line: &[u8], relay: u8) -> Result<bool, FrameError> {
    if &line[0..2] != b"CH" || &line[3..5] != b": " || &line[8..10] != b"\r\n" {
        return Err(FrameError::MalformedFrame(format!(
            "bad status line {:?}",
            String::from_utf8_lossy(line)
        )));
    }
    if line[2] != b'0' + relay {
        return Err(FrameError::MalformedFrame(format!(
            "status line for CH{} out of order (found {:?})",
            relay, line[2] as char
        )));
    }

    match &line[5..8] {
        b"ON " => Ok(true),
        b"OFF" => Ok(false),
        other => Err(FrameError::UnknownOpcode(other[0])),
    }
}
