#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::buffer::SliceBuffer;
use vcdelta::compress::{EncodeOptions, VcDecoder, VcEncoder};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let block_size = 2 + (data[0] as usize % 31);
    let split = 2 + (data[1] as usize % (data.len() - 2));
    let dictionary = &data[2..split];
    let target = &data[split..];

    let opts = EncodeOptions {
        block_size,
        min_match: block_size + (data[0] as usize >> 5),
        interleaved: data[1] & 1 != 0,
        checksum: data[1] & 2 != 0,
        ..EncodeOptions::default()
    };

    let mut delta = Vec::new();
    let mut encoder = VcEncoder::new(SliceBuffer::new(dictionary), SliceBuffer::new(target), opts);
    encoder.encode(&mut delta).unwrap();

    let mut decoder = VcDecoder::new(SliceBuffer::new(dictionary), SliceBuffer::new(&delta));
    decoder.start().unwrap();
    let mut output = Vec::new();
    decoder.decode(&mut output).unwrap();
    assert_eq!(output, target);
});
