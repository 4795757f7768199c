// Dictionary indexing for the encoder.
//
// - `rolling`: Rabin-Karp rolling hash and match-extension helpers
// - `block`: bucketed block index with collision chains

pub mod block;
pub mod rolling;

pub use block::{BlockHash, DEFAULT_BLOCK_SIZE, Match};
pub use rolling::RollingHash;
