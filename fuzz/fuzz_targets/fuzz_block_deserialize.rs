#![no_main]

use bincode::Options;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic, and a decoded block must hash without panicking.
    let options = bincode::options()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(1 << 20);

    if let Ok(block) = options.deserialize::<trustchain_ledger::Block>(data) {
        let _ = block.verify_hash();
        let _ = block.operation.verify_signature();
        let _ = block.operation.verify_attestation();
    }
    let _ = options.deserialize::<trustchain_ledger::Operation>(data);
    let _ = options.deserialize::<trustchain_types::Signature>(data);
    let _ = options.deserialize::<trustchain_types::BlockHash>(data);
});
