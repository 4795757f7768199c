// Custom code tables carried in the file header.
//
// The header payload is `[near][same][delta]`, where `delta` is a complete
// VCDIFF stream that rebuilds the 1536-byte serialized table using the
// serialized default table as its dictionary.

use log::debug;

use super::decoder::VcDecoder;
use super::encoder::{EncodeOptions, VcEncoder};
use crate::buffer::SliceBuffer;
use crate::error::{Result, VcdiffError};
use crate::vcdiff::address_cache::{AddressCache, check_sizes};
use crate::vcdiff::code_table::{CODE_TABLE_BYTES, CodeTable};

/// A code table with the address cache geometry it was built for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomCodeTable {
    table: CodeTable,
    near: u8,
    same: u8,
}

impl CustomCodeTable {
    /// Validate `table` against the mode range of a `near`/`same` cache.
    pub fn new(table: CodeTable, near: u8, same: u8) -> Result<Self> {
        check_sizes(near, same)?;
        table.validate(AddressCache::new(near, same).last_mode())?;
        Ok(Self { table, near, same })
    }

    #[inline]
    pub fn table(&self) -> &CodeTable {
        &self.table
    }

    #[inline]
    pub fn near(&self) -> u8 {
        self.near
    }

    #[inline]
    pub fn same(&self) -> u8 {
        self.same
    }

    /// Parse a header payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let [near, same, nested @ ..] = payload else {
            return Err(VcdiffError::invalid("custom code table payload too short"));
        };
        check_sizes(*near, *same)?;

        let default_bytes = CodeTable::rfc3284().to_bytes();
        let mut decoder = VcDecoder::nested(SliceBuffer::new(&default_bytes), SliceBuffer::new(nested));
        decoder.start()?;
        let mut bytes = Vec::with_capacity(CODE_TABLE_BYTES);
        decoder.decode(&mut bytes)?;
        if bytes.is_empty() {
            return Err(VcdiffError::invalid("custom code table decoded to nothing"));
        }
        if bytes.len() != CODE_TABLE_BYTES {
            return Err(VcdiffError::invalid(format!(
                "custom code table is {} bytes, expected {CODE_TABLE_BYTES}",
                bytes.len()
            )));
        }
        let table = CodeTable::from_bytes(&bytes)?;
        debug!("loaded custom code table (near {near}, same {same})");
        Self::new(table, *near, *same)
    }

    /// Build the header payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let default_bytes = CodeTable::rfc3284().to_bytes();
        let table_bytes = self.table.to_bytes();
        let mut payload = vec![self.near, self.same];
        VcEncoder::new(
            SliceBuffer::new(&default_bytes),
            SliceBuffer::new(&table_bytes),
            EncodeOptions::default(),
        )
        .encode(&mut payload)?;
        Ok(payload)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::code_table::{VCD_ADD, VCD_NOOP};

    /// Default table with the ADD+COPY opcodes 163..=234 cleared.
    fn sparse_table() -> CodeTable {
        let mut t = CodeTable::rfc3284();
        for op in 163..=234 {
            t.inst1[op] = VCD_NOOP;
            t.size1[op] = 0;
            t.mode1[op] = 0;
            t.inst2[op] = VCD_NOOP;
            t.size2[op] = 0;
            t.mode2[op] = 0;
        }
        t
    }

    #[test]
    fn payload_roundtrip() {
        let custom = CustomCodeTable::new(sparse_table(), 4, 3).unwrap();
        let payload = custom.encode().unwrap();
        assert_eq!(&payload[..2], &[4, 3]);
        assert_eq!(CustomCodeTable::decode(&payload).unwrap(), custom);
    }

    #[test]
    fn default_table_encodes_compactly() {
        let custom = CustomCodeTable::new(CodeTable::rfc3284(), 4, 3).unwrap();
        let payload = custom.encode().unwrap();
        // One COPY of the whole dictionary.
        assert!(payload.len() < 32, "{} bytes", payload.len());
        assert_eq!(CustomCodeTable::decode(&payload).unwrap(), custom);
    }

    #[test]
    fn rejects_zero_cache_sizes() {
        assert!(CustomCodeTable::new(CodeTable::rfc3284(), 0, 3).is_err());
        let mut payload = CustomCodeTable::new(CodeTable::rfc3284(), 4, 3)
            .unwrap()
            .encode()
            .unwrap();
        payload[1] = 0;
        assert!(CustomCodeTable::decode(&payload).is_err());
        assert!(CustomCodeTable::decode(&[4]).is_err());
    }

    #[test]
    fn rejects_cache_sizes_past_mode_byte() {
        let valid = CustomCodeTable::new(CodeTable::rfc3284(), 4, 3)
            .unwrap()
            .encode()
            .unwrap();
        for (near, same) in [(255, 1), (250, 5), (255, 255)] {
            let mut payload = valid.clone();
            payload[0] = near;
            payload[1] = same;
            assert!(
                matches!(CustomCodeTable::decode(&payload), Err(VcdiffError::Invalid(_))),
                "near {near} same {same}"
            );
        }
        assert!(CustomCodeTable::new(CodeTable::rfc3284(), 255, 1).is_err());
    }

    #[test]
    fn rejects_table_with_modes_past_cache() {
        // The default table uses modes up to 8; a 1/1 cache stops at mode 3.
        assert!(CustomCodeTable::new(CodeTable::rfc3284(), 1, 1).is_err());
    }

    #[test]
    fn rejects_wrong_decoded_size() {
        // A nested delta that rebuilds only the first 100 bytes of the table.
        let default_bytes = CodeTable::rfc3284().to_bytes();
        let mut nested = Vec::new();
        VcEncoder::new(
            SliceBuffer::new(&default_bytes),
            SliceBuffer::new(&default_bytes[..100]),
            EncodeOptions::default(),
        )
        .encode(&mut nested)
        .unwrap();
        let mut payload = vec![4, 3];
        payload.extend_from_slice(&nested);
        assert!(matches!(CustomCodeTable::decode(&payload), Err(VcdiffError::Invalid(_))));
    }

    #[test]
    fn nested_code_table_is_rejected() {
        let inner = CustomCodeTable::new(CodeTable::rfc3284(), 4, 3)
            .unwrap()
            .encode()
            .unwrap();
        // A nested stream whose own header declares a code table.
        let mut nested = vec![0xD6, 0xC3, 0xC4, 0x00, 0x02];
        crate::vcdiff::varint::append_usize(&mut nested, inner.len());
        nested.extend_from_slice(&inner);
        let mut payload = vec![4, 3];
        payload.extend_from_slice(&nested);
        assert!(CustomCodeTable::decode(&payload).is_err());
    }

    #[test]
    fn table_changes_survive() {
        let mut t = sparse_table();
        t.inst1[200] = VCD_ADD;
        t.size1[200] = 100;
        let custom = CustomCodeTable::new(t.clone(), 4, 3).unwrap();
        let decoded = CustomCodeTable::decode(&custom.encode().unwrap()).unwrap();
        assert_eq!(decoded.table(), &t);
    }
}
