//! ASTM chunk inspection: control-byte scanning, record classification and
//! operator-facing renderings.
//!
//! Nothing here can fail. Classification and display go through
//! [`decode_lossy`], which drops bytes outside 7-bit ASCII instead of
//! rejecting the chunk.

use std::fmt;

/// Start of text, opens a frame.
pub const STX: u8 = 0x02;
/// End of text, closes the last frame of a message.
pub const ETX: u8 = 0x03;
/// End of transmission.
pub const EOT: u8 = 0x04;
/// Enquiry, the sender asks to open a transfer.
pub const ENQ: u8 = 0x05;
/// Acknowledge.
pub const ACK: u8 = 0x06;
/// Negative acknowledge.
pub const NAK: u8 = 0x15;
/// End of transmission block, closes an intermediate frame.
pub const ETB: u8 = 0x17;
pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';

/// Mnemonics substituted into the display form.
const MNEMONICS: [(u8, &str); 9] = [
    (STX, "<STX>"),
    (ETX, "<ETX>"),
    (ETB, "<ETB>"),
    (ENQ, "<ENQ>"),
    (EOT, "<EOT>"),
    (ACK, "<ACK>"),
    (NAK, "<NAK>"),
    (CR, "<CR>"),
    (LF, "<LF>"),
];

/// Single-byte link control codes a chunk may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Enq,
    Eot,
    Ack,
    Nak,
}

impl ControlSignal {
    const ALL: [ControlSignal; 4] = [
        ControlSignal::Enq,
        ControlSignal::Eot,
        ControlSignal::Ack,
        ControlSignal::Nak,
    ];

    pub fn byte(self) -> u8 {
        match self {
            ControlSignal::Enq => ENQ,
            ControlSignal::Eot => EOT,
            ControlSignal::Ack => ACK,
            ControlSignal::Nak => NAK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ControlSignal::Enq => "ENQ",
            ControlSignal::Eot => "EOT",
            ControlSignal::Ack => "ACK",
            ControlSignal::Nak => "NAK",
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic category of a frame's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Header,
    Patient,
    Order,
    Result,
    Comment,
    Terminator,
    Unknown,
}

impl RecordKind {
    /// Map a record-type character to its kind.
    pub fn from_type_char(c: char) -> Self {
        match c {
            'H' => RecordKind::Header,
            'P' => RecordKind::Patient,
            'O' => RecordKind::Order,
            'R' => RecordKind::Result,
            'C' => RecordKind::Comment,
            'L' => RecordKind::Terminator,
            _ => RecordKind::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Header => "Header",
            RecordKind::Patient => "Patient",
            RecordKind::Order => "Order",
            RecordKind::Result => "Result",
            RecordKind::Comment => "Comment",
            RecordKind::Terminator => "Terminator",
            RecordKind::Unknown => "Unknown",
        }
    }

    /// What the record carries, for the operator log.
    pub fn description(self) -> &'static str {
        match self {
            RecordKind::Header => "system information",
            RecordKind::Patient => "demographics",
            RecordKind::Order => "test panel request",
            RecordKind::Result => "lab test results",
            RecordKind::Comment => "additional info",
            RecordKind::Terminator => "end of message",
            RecordKind::Unknown => "unrecognized record type",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Acknowledgment decision for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Chunk carries a frame; ACK it and log the record kind.
    Frame,
    /// Chunk carries an enquiry; ACK it.
    Enquiry,
    /// Nothing is sent.
    Silent,
}

impl Reply {
    /// STX wins over ENQ when both appear in the same chunk.
    pub fn for_chunk(chunk: &[u8]) -> Self {
        if chunk.contains(&STX) {
            Reply::Frame
        } else if chunk.contains(&ENQ) {
            Reply::Enquiry
        } else {
            Reply::Silent
        }
    }

    pub fn acknowledges(self) -> bool {
        !matches!(self, Reply::Silent)
    }
}

/// Control signals present in the chunk, in ENQ, EOT, ACK, NAK order.
pub fn control_signals(chunk: &[u8]) -> Vec<ControlSignal> {
    ControlSignal::ALL
        .into_iter()
        .filter(|signal| chunk.contains(&signal.byte()))
        .collect()
}

/// Decode as ASCII, dropping every byte that is not valid ASCII.
pub fn decode_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| char::from(b))
        .collect()
}

/// Classify the first frame in a chunk by the character after its STX.
///
/// Chunks without STX, or with STX as the last decodable character, are
/// `Unknown`. Only the first STX is considered.
pub fn classify(chunk: &[u8]) -> RecordKind {
    let text = decode_lossy(chunk);
    let mut chars = text.chars().skip_while(|&c| c != char::from(STX));

    match (chars.next(), chars.next()) {
        (Some(_), Some(type_char)) => RecordKind::from_type_char(type_char),
        _ => RecordKind::Unknown,
    }
}

/// Render a chunk with control bytes replaced by bracketed mnemonics.
pub fn display_form(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for c in decode_lossy(bytes).chars() {
        match MNEMONICS.iter().find(|(code, _)| char::from(*code) == c) {
            Some((_, mnemonic)) => out.push_str(mnemonic),
            None => out.push(c),
        }
    }
    out
}

/// Upper-case hex, one space between bytes.
pub fn hex_form(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_records() {
        assert_eq!(classify(b"\x02H|\\^&|||host\r\x03"), RecordKind::Header);
        assert_eq!(classify(b"\x02P|1||PID123\r"), RecordKind::Patient);
        assert_eq!(classify(b"\x02O|1|S1||^^^GLU\r"), RecordKind::Order);
        assert_eq!(classify(b"\x02R|1|^^^GLU|5.4|mmol/L\r"), RecordKind::Result);
        assert_eq!(classify(b"\x02C|1|I|note\r"), RecordKind::Comment);
        assert_eq!(classify(b"\x02L|1|N\r\x03"), RecordKind::Terminator);
    }

    #[test]
    fn test_classify_unknown_letter() {
        assert_eq!(classify(b"\x02Z|1|x\r"), RecordKind::Unknown);
        // lower case is not a record type
        assert_eq!(classify(b"\x02h|1\r"), RecordKind::Unknown);
        // a frame number in front of the type letter is not skipped
        assert_eq!(classify(b"\x021H|\\^&\r"), RecordKind::Unknown);
    }

    #[test]
    fn test_classify_degenerate_chunks() {
        assert_eq!(classify(b""), RecordKind::Unknown);
        assert_eq!(classify(b"\x02"), RecordKind::Unknown);
        assert_eq!(classify(b"H|1|no stx"), RecordKind::Unknown);
        assert_eq!(classify(b"junk\x02"), RecordKind::Unknown);
    }

    #[test]
    fn test_classify_first_frame_only() {
        assert_eq!(classify(b"\x02P|1\r\x03\x02R|1\r\x03"), RecordKind::Patient);
        assert_eq!(classify(b"\x05\x02O|1\r"), RecordKind::Order);
    }

    #[test]
    fn test_classify_drops_non_ascii() {
        assert_eq!(classify(b"\x02\xffR|1\r"), RecordKind::Result);
        assert_eq!(classify(b"\xc3\x28\x02C|1\r"), RecordKind::Comment);
        assert_eq!(classify(b"\x02\xff\xfe"), RecordKind::Unknown);
    }

    #[test]
    fn test_reply_precedence() {
        assert_eq!(Reply::for_chunk(b"\x02H|1\r"), Reply::Frame);
        assert_eq!(Reply::for_chunk(b"\x05"), Reply::Enquiry);
        assert_eq!(Reply::for_chunk(b"\x05\x02H|1\r"), Reply::Frame);
        assert_eq!(Reply::for_chunk(b"\x04"), Reply::Silent);
        assert_eq!(Reply::for_chunk(b"\x06\x15"), Reply::Silent);
        assert_eq!(Reply::for_chunk(b"hello"), Reply::Silent);
        assert_eq!(Reply::for_chunk(b""), Reply::Silent);
        assert!(Reply::Frame.acknowledges());
        assert!(Reply::Enquiry.acknowledges());
        assert!(!Reply::Silent.acknowledges());
    }

    #[test]
    fn test_control_signals() {
        assert_eq!(control_signals(b"\x05"), vec![ControlSignal::Enq]);
        assert_eq!(
            control_signals(b"\x15\x04"),
            vec![ControlSignal::Eot, ControlSignal::Nak]
        );
        assert!(control_signals(b"\x02H|1\r\x03").is_empty());
    }

    #[test]
    fn test_display_form() {
        assert_eq!(
            display_form(b"\x02H|1\r\x03"),
            "<STX>H|1<CR><ETX>"
        );
        assert_eq!(
            display_form(b"\x05\x04\x06\x15\x17\n"),
            "<ENQ><EOT><ACK><NAK><ETB><LF>"
        );
        assert_eq!(display_form(b"A\xffB"), "AB");
        assert_eq!(display_form(b""), "");
    }

    #[test]
    fn test_hex_form() {
        assert_eq!(hex_form(b"\x02H|"), "02 48 7C");
        assert_eq!(hex_form(b"\xff"), "FF");
        assert_eq!(hex_form(b""), "");
    }

    #[test]
    fn test_record_kind_names() {
        assert_eq!(RecordKind::Result.to_string(), "Result");
        assert_eq!(RecordKind::Terminator.description(), "end of message");
        assert_eq!(ControlSignal::Nak.to_string(), "NAK");
    }
}
