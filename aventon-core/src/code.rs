use rand::rngs::OsRng;
use rand::Rng;

pub const CODE_MIN: u32 = 10_000;
pub const CODE_MAX: u32 = 99_999;

/// 5-digit confirmation code, first digit never zero because the range
/// starts at 10000. OS-backed RNG, not a PRNG seeded in-process.
pub fn generate() -> String {
    OsRng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Shape check for codes submitted by callers.
pub fn is_well_formed(code: &str) -> bool {
    matches!(code.parse::<u32>(), Ok(n) if (CODE_MIN..=CODE_MAX).contains(&n))
}
