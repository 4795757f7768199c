// File-level helpers for delta encoding/decoding.
//
// `encode_file()` and `decode_file()` run the streaming coders over files
// with buffered I/O.  The dictionary is loaded into memory; target and
// delta are read through `StreamBuffer` one window at a time.  With the
// `file-io` feature, SHA-256 digests of the inputs and output are reported.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "file-io")]
use sha2::{Digest, Sha256};

use crate::buffer::{ByteBuffer, StreamBuffer};
use crate::compress::decoder::VcDecoder;
use crate::compress::encoder::{EncodeOptions, VcEncoder};
use crate::error::VcdiffError;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `encode_file()`.
#[derive(Debug, Clone)]
pub struct EncodeStats {
    pub dictionary_size: u64,
    pub target_size: u64,
    pub delta_size: u64,
    pub windows: u64,
    /// Target bytes covered by COPY instructions.
    pub copied_bytes: u64,
    pub dictionary_sha256: Option<[u8; 32]>,
    pub target_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `decode_file()`.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    pub dictionary_size: u64,
    pub delta_size: u64,
    pub output_size: u64,
    pub windows: u64,
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for the file helpers.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A file could not be opened or created.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] VcdiffError),
}

fn open(path: &Path) -> Result<File, IoError> {
    File::open(path).map_err(|source| IoError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn create(path: &Path) -> Result<File, IoError> {
    File::create(path).map_err(|source| IoError::File {
        path: path.to_path_buf(),
        source,
    })
}

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// encode_file
// ---------------------------------------------------------------------------

/// Encode `target_path` against `dictionary_path`, writing the delta to
/// `delta_path`.
pub fn encode_file(
    dictionary_path: &Path,
    target_path: &Path,
    delta_path: &Path,
    opts: EncodeOptions,
) -> Result<EncodeStats, IoError> {
    let dictionary = StreamBuffer::new(BufReader::with_capacity(BUF_SIZE, open(dictionary_path)?))?;
    let target = StreamBuffer::new(BufReader::with_capacity(BUF_SIZE, open(target_path)?))?;
    let mut delta = BufWriter::with_capacity(BUF_SIZE, create(delta_path)?);

    let mut encoder = VcEncoder::new(dictionary, target, opts);
    let summary = encoder.encode(&mut delta)?;
    delta.flush()?;
    let (dictionary, _) = encoder.into_inner();

    #[cfg(feature = "file-io")]
    let (dictionary_sha256, target_sha256) = (
        dictionary.as_slice().map(|d| Sha256::digest(d).into()),
        Some(hash_file(target_path)?),
    );
    #[cfg(not(feature = "file-io"))]
    let (dictionary_sha256, target_sha256) = (None, None);

    Ok(EncodeStats {
        dictionary_size: dictionary.len() as u64,
        target_size: summary.target_bytes,
        delta_size: summary.bytes_written,
        windows: summary.windows,
        copied_bytes: summary.copied_bytes,
        dictionary_sha256,
        target_sha256,
    })
}

// ---------------------------------------------------------------------------
// decode_file
// ---------------------------------------------------------------------------

/// Rebuild the target from `dictionary_path` and `delta_path` into
/// `output_path`.
pub fn decode_file(
    dictionary_path: &Path,
    delta_path: &Path,
    output_path: &Path,
) -> Result<DecodeStats, IoError> {
    let dictionary = StreamBuffer::new(BufReader::with_capacity(BUF_SIZE, open(dictionary_path)?))?;
    let dictionary_size = dictionary.len() as u64;
    let delta = StreamBuffer::new(BufReader::with_capacity(BUF_SIZE, open(delta_path)?))?;
    let delta_size = delta.len() as u64;
    let mut output = BufWriter::with_capacity(BUF_SIZE, create(output_path)?);

    let mut decoder = VcDecoder::new(dictionary, delta);
    decoder.start()?;

    #[cfg(feature = "file-io")]
    let (output_size, output_sha256) = {
        let mut hashing = HashingWriter {
            inner: &mut output,
            hasher: Sha256::new(),
        };
        let n = decoder.decode(&mut hashing)?;
        (n, Some(hashing.hasher.finalize().into()))
    };
    #[cfg(not(feature = "file-io"))]
    let (output_size, output_sha256) = (decoder.decode(&mut output)?, None);

    output.flush()?;

    Ok(DecodeStats {
        dictionary_size,
        delta_size,
        output_size,
        windows: decoder.windows(),
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// SHA-256 of a whole file.
#[cfg(feature = "file-io")]
pub fn hash_file(path: &Path) -> Result<[u8; 32], IoError> {
    let mut reader = BufReader::with_capacity(BUF_SIZE, open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Lowercase hex rendering of a digest.
pub fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(feature = "file-io")]
struct HashingWriter<'a, W: Write> {
    inner: &'a mut W,
    hasher: Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn encode_decode_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let dict = b"The quick brown fox jumps over the lazy dog. 1234567890 abcdefghijklmnop";
        let target = b"The quick brown fox jumps over the lazy cat. 1234567890 abcdefghijklmnop!";
        let dict_path = write_file(dir.path(), "dict.bin", dict);
        let target_path = write_file(dir.path(), "target.bin", target);
        let delta_path = dir.path().join("delta.vcdiff");
        let output_path = dir.path().join("output.bin");

        let enc = encode_file(&dict_path, &target_path, &delta_path, EncodeOptions::default()).unwrap();
        assert_eq!(enc.dictionary_size, dict.len() as u64);
        assert_eq!(enc.target_size, target.len() as u64);
        assert_eq!(enc.delta_size, std::fs::metadata(&delta_path).unwrap().len());
        assert_eq!(enc.windows, 1);

        let dec = decode_file(&dict_path, &delta_path, &output_path).unwrap();
        assert_eq!(dec.output_size, target.len() as u64);
        assert_eq!(dec.windows, 1);
        assert_eq!(std::fs::read(&output_path).unwrap(), target);
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        let err = decode_file(&missing, &missing, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, IoError::File { .. }));
        assert!(err.to_string().contains("nope.bin"));
    }

    #[test]
    fn corrupt_delta_is_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let dict_path = write_file(dir.path(), "dict.bin", b"dictionary");
        let delta_path = write_file(dir.path(), "delta.bin", b"garbage!");
        let err = decode_file(&dict_path, &delta_path, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, IoError::Codec(VcdiffError::Invalid(_))));
    }

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(hex(&[0x00, 0xAB, 0x7F]), "00ab7f");
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn sha256_digests_agree() {
        let dir = tempfile::tempdir().unwrap();
        let dict_path = write_file(dir.path(), "dict.bin", b"dictionary for digest test, long enough to match");
        let target_path = write_file(dir.path(), "target.bin", b"target for digest test, long enough to match");
        let delta_path = dir.path().join("delta.vcdiff");
        let output_path = dir.path().join("output.bin");

        let opts = EncodeOptions {
            checksum: true,
            interleaved: true,
            ..EncodeOptions::default()
        };
        let enc = encode_file(&dict_path, &target_path, &delta_path, opts).unwrap();
        let dec = decode_file(&dict_path, &delta_path, &output_path).unwrap();
        assert!(enc.dictionary_sha256.is_some());
        assert!(enc.target_sha256.is_some());
        assert_eq!(dec.output_sha256, enc.target_sha256);
        assert_eq!(enc.target_sha256.unwrap(), hash_file(&output_path).unwrap());
    }
}
