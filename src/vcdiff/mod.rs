// VCDIFF format layer (RFC 3284 with the SDCH extensions).
//
// # Modules
//
// - `varint`          - big-endian base-128 integers
// - `address_cache`   - NEAR/SAME cache for COPY addresses
// - `code_table`      - opcode table, default and custom
// - `instruction_map` - reverse opcode lookup used by the encoder
// - `header`          - file header, window header and indicator flags
// - `window`          - window header parsing and section extraction
// - `encoder`         - instruction packing and window emission
// - `decoder`         - opcode decoding and window reconstruction

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod instruction_map;
pub mod varint;
pub mod window;

pub use address_cache::AddressCache;
pub use code_table::{CodeTable, CodeTableEntry};
pub use decoder::{BodyDecoder, Instruction, InstructionDecoder};
pub use encoder::{EncodingTable, WindowEncoder};
pub use header::{DeltaFlags, FileHeader, HeaderFlags, VCDIFF_MAGIC, WindowFlags, WindowHeader};
pub use instruction_map::InstructionMap;
pub use window::{SectionLayout, WindowDecoder};
