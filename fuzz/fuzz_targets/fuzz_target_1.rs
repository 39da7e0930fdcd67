#![no_main]

use libfuzzer_sys::fuzz_target;
use flowcap::header::parse_packet;

fuzz_target!(|data: &[u8]| {
    // parse_packet must never panic on arbitrary input, per the "one
    // malformed packet MUST NOT terminate the loop" invariant.
    let _ = parse_packet(data, 0.0);
});
