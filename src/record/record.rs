use std::borrow::Cow;

use super::error::{RecordError, RecordResult};
use crate::btree::KeyId;
use crate::file::{Rrn, get_u16, put_u16};

/// Byte written across a whole deleted record
pub const TOMBSTONE: u8 = b'*';

/// Shape of a record slot: key id bytes, payload length, padded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub key_width: usize,
    pub payload_size: usize,
}

impl RecordLayout {
    pub fn new(key_width: usize, payload_size: usize) -> Self {
        Self {
            key_width,
            payload_size,
        }
    }

    /// Bytes per record slot
    pub fn record_size(&self) -> usize {
        self.key_width + 2 + self.payload_size
    }
}

/// A stored record, keyed by the same identifier as its index entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: KeyId,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(key: KeyId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key,
            payload: payload.into(),
        }
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Serialize into exactly `layout.record_size()` bytes
    pub fn serialize(&self, layout: RecordLayout) -> RecordResult<Vec<u8>> {
        if self.key.len() > layout.key_width {
            return Err(RecordError::InvalidRecord(format!(
                "key '{}' wider than {} bytes",
                self.key, layout.key_width
            )));
        }
        if self.payload.len() > layout.payload_size {
            return Err(RecordError::PayloadTooLarge {
                actual: self.payload.len(),
                max: layout.payload_size,
            });
        }

        let mut buf = vec![0u8; layout.record_size()];
        self.key.encode_into(&mut buf[..layout.key_width]);
        put_u16(&mut buf, layout.key_width, self.payload.len() as u16);

        let start = layout.key_width + 2;
        buf[start..start + self.payload.len()].copy_from_slice(&self.payload);

        Ok(buf)
    }

    /// Deserialize the record stored at `slot`
    pub fn deserialize(buf: &[u8], slot: Rrn, layout: RecordLayout) -> RecordResult<Self> {
        if buf.len() != layout.record_size() {
            return Err(RecordError::RecordSizeMismatch {
                expected: layout.record_size(),
                actual: buf.len(),
            });
        }
        if is_tombstone(buf) {
            return Err(RecordError::Tombstoned(slot));
        }

        let key = KeyId::decode(&buf[..layout.key_width])
            .ok_or_else(|| RecordError::InvalidRecord(format!("slot {} has no key", slot)))?;

        let len = get_u16(buf, layout.key_width) as usize;
        if len > layout.payload_size {
            return Err(RecordError::InvalidRecord(format!(
                "slot {} payload length {} exceeds {}",
                slot, len, layout.payload_size
            )));
        }

        let start = layout.key_width + 2;
        Ok(Self {
            key,
            payload: buf[start..start + len].to_vec(),
        })
    }
}

/// A deleted record is `*` in every byte
pub fn is_tombstone(buf: &[u8]) -> bool {
    !buf.is_empty() && buf.iter().all(|&b| b == TOMBSTONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RecordLayout {
        RecordLayout::new(7, 16)
    }

    fn record(id: &str, payload: &str) -> Record {
        Record::new(KeyId::new(id, 7).unwrap(), payload)
    }

    #[test]
    fn test_record_layout() {
        let rec = record("AAA0001", "Ada Lovelace");
        let bytes = rec.serialize(layout()).unwrap();

        assert_eq!(bytes.len(), 7 + 2 + 16);
        assert_eq!(&bytes[..7], b"AAA0001");
        assert_eq!(&bytes[7..9], &12u16.to_le_bytes());
        assert_eq!(&bytes[9..21], b"Ada Lovelace");
        assert!(bytes[21..].iter().all(|&b| b == 0));

        let decoded = Record::deserialize(&bytes, 0, layout()).unwrap();
        assert_eq!(decoded, rec);
        assert_eq!(decoded.payload_str(), "Ada Lovelace");
    }

    #[test]
    fn test_payload_too_large() {
        let rec = record("AAA0001", "this payload is far too long");
        assert!(matches!(
            rec.serialize(layout()),
            Err(RecordError::PayloadTooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn test_tombstone_detection() {
        let buf = vec![TOMBSTONE; layout().record_size()];
        assert!(is_tombstone(&buf));
        assert!(matches!(
            Record::deserialize(&buf, 4, layout()),
            Err(RecordError::Tombstoned(4))
        ));

        let live = record("AAA0001", "*").serialize(layout()).unwrap();
        assert!(!is_tombstone(&live));
        assert!(!is_tombstone(&[]));
    }

    #[test]
    fn test_corrupted_record() {
        let mut buf = record("AAA0001", "x").serialize(layout()).unwrap();
        put_u16(&mut buf, 7, 200);
        assert!(matches!(
            Record::deserialize(&buf, 0, layout()),
            Err(RecordError::InvalidRecord(_))
        ));

        let empty = vec![0u8; layout().record_size()];
        assert!(matches!(
            Record::deserialize(&empty, 0, layout()),
            Err(RecordError::InvalidRecord(_))
        ));
    }
}
