//! Fixed-width binary record codec.

use std::fmt::Debug;

/// Encoded size of a single record in bytes.
pub const RECORD_SIZE: usize = 8;

/// Record interface. A record is an orderable value with a fixed 8-byte big-endian encoding.
/// Records have no separators or length prefixes, so record boundaries are multiples of [`RECORD_SIZE`].
pub trait Record: Ord + Copy + Debug + Send + 'static {
    /// Encodes the record to its binary form.
    fn encode(&self) -> [u8; RECORD_SIZE];

    /// Decodes a record from its binary form.
    fn decode(bytes: [u8; RECORD_SIZE]) -> Self;
}

impl Record for i64 {
    fn encode(&self) -> [u8; RECORD_SIZE] {
        self.to_be_bytes()
    }

    fn decode(bytes: [u8; RECORD_SIZE]) -> Self {
        i64::from_be_bytes(bytes)
    }
}

impl Record for u64 {
    fn encode(&self) -> [u8; RECORD_SIZE] {
        self.to_be_bytes()
    }

    fn decode(bytes: [u8; RECORD_SIZE]) -> Self {
        u64::from_be_bytes(bytes)
    }
}

/// Encodes all the records into a single contiguous buffer.
pub fn encode_all<T: Record>(records: impl IntoIterator<Item = T>) -> Vec<u8> {
    let records = records.into_iter();
    let mut buf = Vec::with_capacity(records.size_hint().0 * RECORD_SIZE);
    for record in records {
        buf.extend_from_slice(&record.encode());
    }

    return buf;
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{encode_all, Record, RECORD_SIZE};

    #[rstest]
    #[case(0, [0, 0, 0, 0, 0, 0, 0, 0])]
    #[case(1, [0, 0, 0, 0, 0, 0, 0, 1])]
    #[case(0x0102030405060708, [1, 2, 3, 4, 5, 6, 7, 8])]
    #[case(-1, [0xff; RECORD_SIZE])]
    #[case(i64::MIN, [0x80, 0, 0, 0, 0, 0, 0, 0])]
    fn test_signed_layout(#[case] value: i64, #[case] bytes: [u8; RECORD_SIZE]) {
        assert_eq!(value.encode(), bytes);
        assert_eq!(i64::decode(bytes), value);
    }

    #[rstest]
    #[case(i64::MIN)]
    #[case(-42)]
    #[case(i64::MAX)]
    fn test_signed_identity(#[case] value: i64) {
        assert_eq!(i64::decode(value.encode()), value);
    }

    #[test]
    fn test_unsigned_is_not_sign_extended() {
        let bytes = [0xff; RECORD_SIZE];
        assert_eq!(u64::decode(bytes), u64::MAX);
        assert_eq!(u64::MAX.encode(), bytes);
    }

    #[test]
    fn test_encode_all() {
        let buf = encode_all(vec![1i64, 2]);
        assert_eq!(buf, vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2]);
        assert!(encode_all(Vec::<u64>::new()).is_empty());
    }
}
