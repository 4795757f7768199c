#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::compress::EncodeOptions;
use vcdelta::engine;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte selects the format variant.
    let flags = data[0];
    let payload = &data[1..];
    let split = payload.len() / 2;
    let (dictionary, target) = if flags & 1 != 0 {
        payload.split_at(split)
    } else {
        (&[] as &[u8], payload)
    };

    let opts = EncodeOptions {
        interleaved: flags & 2 != 0,
        checksum: flags & 4 != 0,
        chunk_size: if flags & 8 != 0 { 64 } else { 1 << 20 },
        ..EncodeOptions::default()
    };

    let delta = engine::encode_with_options(dictionary, target, &opts).unwrap();
    let decoded = engine::decode(dictionary, &delta).unwrap();
    assert_eq!(decoded, target);
});
