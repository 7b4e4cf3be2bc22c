#![no_main]

use bincode::Options;
use libfuzzer_sys::fuzz_target;
use trustchain_ledger::{fold, Trustchain};
use trustchain_types::ChainId;

fuzz_target!(|data: &[u8]| {
    if data.len() < 32 {
        return;
    }
    let (id, rest) = data.split_at(32);
    let mut chain_id = [0u8; 32];
    chain_id.copy_from_slice(id);

    let options = bincode::options()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(1 << 20);
    let Ok(blocks) = options.deserialize::<Vec<trustchain_ledger::Block>>(rest) else {
        return;
    };

    // Fold is total on any input; verification may reject but must not panic.
    let _ = fold(&blocks);
    if let Ok(chain) = Trustchain::verify(ChainId::new(chain_id), blocks) {
        assert_eq!(chain.state(), fold(chain.blocks()));
    }
});
