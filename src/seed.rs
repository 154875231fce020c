use rand::{rngs::StdRng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::scenario::PricingMode;

/// Stable seed for one trial identity, reduced modulo 2^32.
///
/// SHA-256 over `"{scenario}|{MODE}|{repeat}"`, first eight bytes read
/// big-endian. Independent of process, platform and execution order.
pub fn trial_seed(scenario_id: &str, mode: PricingMode, repeat: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", scenario_id, mode.as_str(), repeat).as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % (1u64 << 32)
}

pub fn trial_rng(scenario_id: &str, mode: PricingMode, repeat: u32) -> StdRng {
    StdRng::seed_from_u64(trial_seed(scenario_id, mode, repeat))
}
