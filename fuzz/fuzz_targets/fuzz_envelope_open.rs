#![no_main]

use libfuzzer_sys::fuzz_target;
use trustchain_crypto::{credentials_from_seed, open_envelope};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must be rejected cleanly, never decrypted or panicked on.
    let recipient = credentials_from_seed(&[0x42; 32]);
    assert!(open_envelope(data, &recipient.private, b"fuzz").is_err());
});
