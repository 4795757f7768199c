#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::engine;

fuzz_target!(|data: &[u8]| {
    // Arbitrary deltas must only ever produce a status, never a panic.
    let r = engine::decode_report(&[], data);
    assert_eq!(r.bytes_written, r.output.len() as u64);

    if data.len() >= 2 {
        let split = data[0] as usize % data.len();
        let (dictionary, delta) = data[1..].split_at(split);
        let r = engine::decode_report(dictionary, delta);
        assert_eq!(r.bytes_written, r.output.len() as u64);
    }
});
