// Delta encoding and decoding on top of the format layer.
//
// - `chunk`        - ChunkEncoder: match search for one target chunk
// - `encoder`      - VcEncoder: header, dictionary index, chunk loop
// - `decoder`      - VcDecoder: header, window loop, output sink
// - `custom_table` - code tables shipped inside the file header

pub mod chunk;
pub mod custom_table;
pub mod decoder;
pub mod encoder;

pub use chunk::{ChunkEncoder, ChunkStats};
pub use custom_table::CustomCodeTable;
pub use decoder::VcDecoder;
pub use encoder::{EncodeOptions, EncodeSummary, VcEncoder};
