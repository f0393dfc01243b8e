/// one step of the 32-bit LCG used for band folding and anti-collapse noise
#[inline]
pub fn lcg_rand(seed: u32) -> u32 {
    seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223)
}
