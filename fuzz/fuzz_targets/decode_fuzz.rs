//! Decoder fuzz target: feed arbitrary bytes to the datagram decoder.
//! Decoding must not panic; it returns a record or a DecodeError.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let _ = ehpdecode::decode_message_with_warnings(data);
    // Same bytes with a recognised type id, so the registry paths get exercised.
    if data.len() >= 44 {
        let mut buf = data.to_vec();
        let kind = ehpdecode::registry::STRATEGIES[data[4] as usize % ehpdecode::registry::STRATEGIES.len()].kind;
        buf[4..8].copy_from_slice(&kind.type_id().to_le_bytes());
        let _ = ehpdecode::decode_message(&buf);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
