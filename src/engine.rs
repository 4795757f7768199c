// One-shot encode/decode over in-memory buffers.
//
// These wrap `VcEncoder` and `VcDecoder` for callers that hold the whole
// dictionary, target or delta in memory.  `decode_report` never fails; it
// folds the outcome into a `DecodeReport` carrying the coarse status.

use crate::buffer::SliceBuffer;
use crate::compress::decoder::VcDecoder;
use crate::compress::encoder::{EncodeOptions, VcEncoder};
use crate::error::{Result, Status, VcdiffError};

/// Encode `target` against `dictionary` with default options.
pub fn encode(dictionary: &[u8], target: &[u8]) -> Result<Vec<u8>> {
    encode_with_options(dictionary, target, &EncodeOptions::default())
}

/// Encode `target` against `dictionary`.
pub fn encode_with_options(dictionary: &[u8], target: &[u8], opts: &EncodeOptions) -> Result<Vec<u8>> {
    let mut delta = Vec::with_capacity(target.len() / 4 + 64);
    VcEncoder::new(SliceBuffer::new(dictionary), SliceBuffer::new(target), opts.clone()).encode(&mut delta)?;
    Ok(delta)
}

/// Rebuild the target from `dictionary` and `delta`.
pub fn decode(dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = VcDecoder::new(SliceBuffer::new(dictionary), SliceBuffer::new(delta));
    decoder.start()?;
    let mut output = Vec::new();
    decoder.decode(&mut output)?;
    Ok(output)
}

/// Outcome of `decode_report`.
#[derive(Debug)]
pub struct DecodeReport {
    pub status: Status,
    /// Bytes from windows that decoded completely.
    pub bytes_written: u64,
    /// Those bytes.
    pub output: Vec<u8>,
    pub error: Option<VcdiffError>,
}

impl DecodeReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Decode and report the status instead of failing.
pub fn decode_report(dictionary: &[u8], delta: &[u8]) -> DecodeReport {
    let mut decoder = VcDecoder::new(SliceBuffer::new(dictionary), SliceBuffer::new(delta));
    let mut output = Vec::new();
    let result = decoder.start().and_then(|()| decoder.decode(&mut output));
    let bytes_written = decoder.bytes_written();
    match result {
        Ok(_) => DecodeReport {
            status: Status::Success,
            bytes_written,
            output,
            error: None,
        },
        Err(e) => DecodeReport {
            status: e.status(),
            bytes_written,
            output,
            error: Some(e),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DICT: &[u8] = b"The quick brown fox jumps over the lazy dog. \
        Pack my box with five dozen liquor jugs. \
        How vexingly quick daft zebras jump!";

    #[test]
    fn roundtrip_defaults() {
        let target = b"Pack my box with five dozen liquor jugs, then the quick brown fox jumps.";
        let delta = encode(DICT, target).unwrap();
        assert_eq!(decode(DICT, &delta).unwrap(), target);
    }

    #[test]
    fn roundtrip_all_format_variants() {
        let target = b"How vexingly quick daft zebras jump! The quick brown fox jumps over the lazy dog.";
        for interleaved in [false, true] {
            for checksum in [false, true] {
                let opts = EncodeOptions {
                    interleaved,
                    checksum,
                    block_size: 4,
                    min_match: 6,
                    ..EncodeOptions::default()
                };
                let delta = encode_with_options(DICT, target, &opts).unwrap();
                assert_eq!(decode(DICT, &delta).unwrap(), target, "{interleaved} {checksum}");
            }
        }
    }

    #[test]
    fn report_success() {
        let delta = encode(DICT, b"jumps over").unwrap();
        let r = decode_report(DICT, &delta);
        assert!(r.is_success());
        assert_eq!(r.bytes_written, 10);
        assert_eq!(r.output, b"jumps over");
        assert!(r.error.is_none());
    }

    #[test]
    fn report_eod_and_error() {
        let delta = encode(DICT, b"jumps over").unwrap();
        let r = decode_report(DICT, &delta[..3]);
        assert_eq!(r.status, Status::Eod);
        assert_eq!(r.bytes_written, 0);

        let r = decode_report(DICT, b"not a delta");
        assert_eq!(r.status, Status::Error);
        assert!(r.error.is_some());
    }
}
