//! vcdelta: dictionary-based VCDIFF (RFC 3284) delta coding.
//!
//! The encoder compares a target against a fixed dictionary and emits a
//! delta made of ADD, RUN and COPY instructions.  Besides the plain RFC 3284
//! format it can write the SDCH extended format (version byte `'S'`), which
//! adds per-window Adler-32 checksums and an interleaved layout suited to
//! decoding while the delta is still arriving.
//!
//! - [`engine`]: one-shot encode/decode over byte slices
//! - [`compress`]: streaming `VcEncoder` / `VcDecoder`
//! - [`vcdiff`]: wire format, code tables, address cache
//! - [`hash`]: dictionary block index used for match finding
//! - [`io`]: file helpers
//! - `cli`: command-line front end (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use vcdelta::engine;
//!
//! let dictionary = b"The quick brown fox jumps over the lazy dog";
//! let target = b"The quick brown fox jumps over the lazy cat";
//!
//! let delta = engine::encode(dictionary, target).unwrap();
//! let decoded = engine::decode(dictionary, &delta).unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod buffer;
pub mod checksum;
pub mod compress;
pub mod engine;
pub mod error;
pub mod hash;
pub mod io;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Result, Status, VcdiffError};
