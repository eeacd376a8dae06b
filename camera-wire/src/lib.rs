//! Framed command-channel codec for IP camera control
//!
//! Some camera vendors expose their configuration over a delimiter-separated
//! command channel instead of HTTP. A message looks like:
//!
//! ```text
//! SOM header (FSP id FVS value)* EOI EOT EOM
//! ```
//!
//! Builders must emit fields in ascending numeric order, which [`Frame::push`]
//! enforces. Parsers tolerate vendors that send a contiguous run of values
//! without ids; those are numbered positionally.

mod decoder;
mod error;

pub use decoder::FrameDecoder;
pub use error::WireError;

use bytes::{BufMut, Bytes, BytesMut};
use std::str::FromStr;

/// Start of message
pub const SOM: u8 = 0x01;
/// End of transaction
pub const EOT: u8 = 0x03;
/// End of message
pub const EOM: u8 = 0x04;
/// End of item
pub const EOI: u8 = 0x1D;
/// Field separator
pub const FSP: u8 = 0x1E;
/// Field/value separator
pub const FVS: u8 = 0x1F;

/// Closing marker sequence of every frame
pub const END_SEQUENCE: [u8; 3] = [EOI, EOT, EOM];

/// Reply status code meaning the command was accepted
pub const REPLY_SUCCESS: u16 = 0;

const RESERVED: [u8; 6] = [SOM, EOT, EOM, EOI, FSP, FVS];

/// A single `id = value` group inside a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub id: u16,
    pub value: String,
}

/// A decoded or to-be-encoded command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: String,
    fields: Vec<Field>,
}

impl Frame {
    /// Create an empty frame for the given command header
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            fields: Vec::new(),
        }
    }

    /// Header of the reply a camera sends for `command`
    pub fn reply_header(command: &str) -> String {
        format!("RPL_{command}")
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Append a field. Ids must be strictly ascending.
    pub fn push(&mut self, id: u16, value: impl Into<String>) -> Result<&mut Self, WireError> {
        if let Some(last) = self.fields.last() {
            if id <= last.id {
                return Err(WireError::FieldOrder {
                    id,
                    previous: last.id,
                });
            }
        }
        let value = value.into();
        if value.bytes().any(|b| RESERVED.contains(&b)) {
            return Err(WireError::InvalidValue { id });
        }
        self.fields.push(Field { id, value });
        Ok(self)
    }

    /// Append a field numbered one past the last field (or 1 for an empty frame)
    pub fn push_next(&mut self, value: impl Into<String>) -> Result<&mut Self, WireError> {
        let id = self.fields.last().map_or(1, |f| f.id.saturating_add(1));
        self.push(id, value)
    }

    pub fn get(&self, id: u16) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.value.as_str())
    }

    pub fn require(&self, id: u16) -> Result<&str, WireError> {
        self.get(id).ok_or(WireError::MissingField(id))
    }

    /// Parse a required field into `T`
    pub fn parse_field<T: FromStr>(&self, id: u16) -> Result<T, WireError> {
        let raw = self.require(id)?;
        raw.trim().parse().map_err(|_| WireError::UnexpectedValue {
            id,
            value: raw.to_string(),
        })
    }

    /// Values of the contiguous id run starting at `first`, stopping at the first gap
    pub fn values_from(&self, first: u16) -> Vec<&str> {
        let mut values = Vec::new();
        let mut next = first;
        while let Some(value) = self.get(next) {
            values.push(value);
            match next.checked_add(1) {
                Some(n) => next = n,
                None => break,
            }
        }
        values
    }

    /// Status code carried in field 1 of a reply frame
    pub fn reply_code(&self) -> Result<u16, WireError> {
        self.parse_field(1)
    }

    pub fn is_reply_to(&self, command: &str) -> bool {
        self.header
            .strip_prefix("RPL_")
            .is_some_and(|cmd| cmd == command)
    }

    /// Serialize the frame into its on-wire form
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(SOM);
        buf.put_slice(self.header.as_bytes());
        for field in &self.fields {
            buf.put_u8(FSP);
            buf.put_slice(field.id.to_string().as_bytes());
            buf.put_u8(FVS);
            buf.put_slice(field.value.as_bytes());
        }
        buf.put_slice(&END_SEQUENCE);
        buf.freeze()
    }

    fn encoded_len(&self) -> usize {
        let fields: usize = self.fields.iter().map(|f| f.value.len() + 7).sum();
        1 + self.header.len() + fields + END_SEQUENCE.len()
    }

    /// Parse one complete frame, including its SOM and end sequence
    pub fn parse(data: &[u8]) -> Result<Frame, WireError> {
        let body = data.strip_prefix(&[SOM]).ok_or(WireError::MissingStart)?;
        let body = body
            .strip_suffix(&END_SEQUENCE)
            .ok_or(WireError::MissingEnd)?;

        let mut parts = body.split(|b| *b == FSP);
        let header = parts
            .next()
            .map(String::from_utf8_lossy)
            .unwrap_or_default()
            .into_owned();
        if header.is_empty() || header.bytes().any(|b| b < 0x20) {
            return Err(WireError::InvalidHeader(header));
        }

        let mut frame = Frame::new(header);
        let mut last_id = 0u16;
        for part in parts.filter(|p| !p.is_empty()) {
            let (id, value) = match part.iter().position(|b| *b == FVS) {
                Some(pos) => {
                    let raw_id = String::from_utf8_lossy(&part[..pos]);
                    let id = raw_id
                        .trim()
                        .parse::<u16>()
                        .map_err(|_| WireError::InvalidFieldId(raw_id.to_string()))?;
                    (id, &part[pos + 1..])
                }
                // Positional value: vendors that omit ids send a contiguous range
                None => (last_id.saturating_add(1), part),
            };
            if value.iter().any(|b| RESERVED.contains(b)) {
                return Err(WireError::InvalidValue { id });
            }
            frame.fields.push(Field {
                id,
                value: String::from_utf8_lossy(value).into_owned(),
            });
            last_id = id;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(header: &str, groups: &[(&str, &str)]) -> Vec<u8> {
        let mut out = vec![SOM];
        out.extend_from_slice(header.as_bytes());
        for (id, value) in groups {
            out.push(FSP);
            out.extend_from_slice(id.as_bytes());
            out.push(FVS);
            out.extend_from_slice(value.as_bytes());
        }
        out.extend_from_slice(&END_SEQUENCE);
        out
    }

    #[test]
    fn test_encode_layout() {
        let mut frame = Frame::new("GET_CFG");
        frame.push(1, "12").unwrap().push(2, "0").unwrap();

        let bytes = frame.encode();
        assert_eq!(bytes.as_ref(), raw("GET_CFG", &[("1", "12"), ("2", "0")]).as_slice());
    }

    #[test]
    fn test_push_rejects_out_of_order_ids() {
        let mut frame = Frame::new("SET_CFG");
        frame.push(3, "a").unwrap();
        let err = frame.push(2, "b").unwrap_err();
        assert_eq!(err, WireError::FieldOrder { id: 2, previous: 3 });

        let err = frame.push(3, "b").unwrap_err();
        assert_eq!(err, WireError::FieldOrder { id: 3, previous: 3 });
    }

    #[test]
    fn test_push_rejects_reserved_bytes() {
        let mut frame = Frame::new("SET_CFG");
        let value = String::from_utf8(vec![b'a', FSP, b'b']).unwrap();
        assert_eq!(
            frame.push(1, value).unwrap_err(),
            WireError::InvalidValue { id: 1 }
        );
    }

    #[test]
    fn test_push_next_numbers_contiguously() {
        let mut frame = Frame::new("SET_CFG");
        frame.push(10, "x").unwrap();
        frame.push_next("y").unwrap().push_next("z").unwrap();
        assert_eq!(frame.values_from(10), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_parse_reply() {
        let frame = Frame::parse(&raw("RPL_GET_CFG", &[("1", "0"), ("2", "1920x1080")])).unwrap();
        assert!(frame.is_reply_to("GET_CFG"));
        assert_eq!(frame.reply_code().unwrap(), REPLY_SUCCESS);
        assert_eq!(frame.get(2), Some("1920x1080"));
    }

    #[test]
    fn test_parse_positional_values() {
        let mut data = vec![SOM];
        data.extend_from_slice(b"RPL_GET_CFG");
        for value in ["0", "H264", "25"] {
            data.push(FSP);
            data.extend_from_slice(value.as_bytes());
        }
        data.extend_from_slice(&END_SEQUENCE);

        let frame = Frame::parse(&data).unwrap();
        assert_eq!(frame.values_from(1), vec!["0", "H264", "25"]);
    }

    #[test]
    fn test_parse_missing_markers() {
        let mut data = raw("GET_CFG", &[]);
        assert_eq!(Frame::parse(&data[1..]).unwrap_err(), WireError::MissingStart);
        data.pop();
        assert_eq!(Frame::parse(&data).unwrap_err(), WireError::MissingEnd);
    }

    #[test]
    fn test_parse_bad_field_id() {
        let data = raw("GET_CFG", &[("x1", "0")]);
        assert!(matches!(
            Frame::parse(&data).unwrap_err(),
            WireError::InvalidFieldId(_)
        ));
    }

    #[test]
    fn test_parse_field_type_mismatch() {
        let frame = Frame::parse(&raw("RPL_GET_CFG", &[("1", "ok")])).unwrap();
        assert!(matches!(
            frame.reply_code().unwrap_err(),
            WireError::UnexpectedValue { id: 1, .. }
        ));
        assert_eq!(frame.parse_field::<u32>(7).unwrap_err(), WireError::MissingField(7));
    }

    #[test]
    fn test_values_from_stops_at_gap() {
        let frame = Frame::parse(&raw("RPL", &[("1", "a"), ("2", "b"), ("4", "d")])).unwrap();
        assert_eq!(frame.values_from(1), vec!["a", "b"]);
        assert!(frame.values_from(3).is_empty());
    }
}
