//! Range coder shared by every layer of the band quantizer.
//!
//! Symbols are range coded from the front of the buffer while raw bits are
//! packed from the back, growing towards each other.

mod decoder;
mod encoder;

pub use decoder::*;
pub use encoder::*;

pub const SYM_BITS: u32 = 8;
pub const SYM_MAX: u32 = (1 << SYM_BITS) - 1;
pub const CODE_BITS: u32 = 32;
pub const CODE_TOP: u32 = 1 << (CODE_BITS - 1);
pub const CODE_BOT: u32 = CODE_TOP >> SYM_BITS;
pub const CODE_SHIFT: u32 = CODE_BITS - SYM_BITS - 1;
pub const CODE_EXTRA: u32 = (CODE_BITS - 2) % SYM_BITS + 1;
pub const UINT_BITS: i32 = 8;
pub const WINDOW_SIZE: i32 = 32;

/// fractional bits of resolution used by `tell_frac` and the allocator
pub const BITRES: i32 = 3;

/// number of bits needed to hold `x`, `ilog(0) == 0`
#[inline]
pub fn ilog(x: u32) -> i32 {
    (u32::BITS - x.leading_zeros()) as i32
}

#[inline]
fn tell_of(nbits_total: i32, rng: u32) -> i32 {
    nbits_total - ilog(rng)
}

/// # Description
/// Bits consumed so far in 1/8th bit units.
/// ## Comments
/// The fractional part is found by comparing the top 16 bits of the range
/// against the thresholds `2^(b/8)` for `b` in `1..=8`.
fn tell_frac_of(nbits_total: i32, rng: u32) -> i32 {
    const CORRECTION: [u32; 8] = [35733, 38967, 42495, 46340, 50535, 55109, 60097, 65535];
    let nbits = nbits_total << BITRES;
    let mut l = ilog(rng);
    let r = rng >> (l - 16);
    let mut b = (r >> 12) as usize - 8;
    if r > CORRECTION[b] {
        b += 1;
    }
    l = (l << 3) + b as i32;
    nbits - l
}

/// # Description
/// One side of a coding pass. Band code is written once and runs in either
/// direction; the symmetric helpers take the value to encode and hand back
/// the value that was coded (the decoded one on the decoder side).
pub enum Coder<'a> {
    Encoder(&'a mut RangeEncoder),
    Decoder(&'a mut RangeDecoder),
}

impl<'a> Coder<'a> {
    #[inline]
    pub fn is_encoder(&self) -> bool {
        matches!(self, Self::Encoder(_))
    }

    #[inline]
    pub fn tell(&self) -> i32 {
        match self {
            Self::Encoder(enc) => enc.tell(),
            Self::Decoder(dec) => dec.tell(),
        }
    }

    #[inline]
    pub fn tell_frac(&self) -> i32 {
        match self {
            Self::Encoder(enc) => enc.tell_frac(),
            Self::Decoder(dec) => dec.tell_frac(),
        }
    }

    /// size of the underlying buffer in bytes
    pub fn storage(&self) -> usize {
        match self {
            Self::Encoder(enc) => enc.storage(),
            Self::Decoder(dec) => dec.storage(),
        }
    }

    pub fn bit_logp(&mut self, bit: bool, logp: u32) -> bool {
        match self {
            Self::Encoder(enc) => {
                enc.encode_bit_logp(bit, logp);
                bit
            }
            Self::Decoder(dec) => dec.decode_bit_logp(logp),
        }
    }

    pub fn uint(&mut self, value: u32, ft: u32) -> u32 {
        match self {
            Self::Encoder(enc) => {
                enc.encode_uint(value, ft);
                value
            }
            Self::Decoder(dec) => dec.decode_uint(ft),
        }
    }

    pub fn bits(&mut self, value: u32, bits: u32) -> u32 {
        match self {
            Self::Encoder(enc) => {
                enc.encode_bits(value, bits);
                value
            }
            Self::Decoder(dec) => dec.decode_bits(bits),
        }
    }

    pub fn icdf(&mut self, symbol: usize, icdf: &[u8], ftb: u32) -> usize {
        match self {
            Self::Encoder(enc) => {
                enc.encode_icdf(symbol, icdf, ftb);
                symbol
            }
            Self::Decoder(dec) => dec.decode_icdf(icdf, ftb),
        }
    }

    pub fn error(&self) -> bool {
        match self {
            Self::Encoder(enc) => enc.error(),
            Self::Decoder(dec) => dec.error(),
        }
    }

    pub fn encoder_mut(&mut self) -> Option<&mut RangeEncoder> {
        match self {
            Self::Encoder(enc) => Some(enc),
            Self::Decoder(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn ilog_matches_bit_length() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(2), 2);
        assert_eq!(ilog(255), 8);
        assert_eq!(ilog(256), 9);
        assert_eq!(ilog(u32::MAX), 32);
    }

    #[test]
    fn random_uints_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let values = (0..1000)
            .map(|_| rng.gen_range(0..1_000_000u32))
            .collect::<Vec<_>>();

        let mut enc = RangeEncoder::new(4096);
        values.iter().for_each(|&v| enc.encode_uint(v, 1_000_000));
        enc.done();
        assert!(!enc.error());
        let final_range = enc.range();

        let mut dec = RangeDecoder::new(enc.buffer());
        for &v in values.iter() {
            assert_eq!(dec.decode_uint(1_000_000), v);
        }
        assert!(!dec.error());
        assert_eq!(dec.range(), final_range);
    }

    #[test]
    fn re_encoding_is_byte_identical() {
        let run = || {
            let mut rng = StdRng::seed_from_u64(42);
            let mut enc = RangeEncoder::new(512);
            for _ in 0..300 {
                match rng.gen_range(0..4) {
                    0 => enc.encode_uint(rng.gen_range(0..77), 77),
                    1 => enc.encode_bit_logp(rng.gen_bool(0.1), 3),
                    2 => enc.encode_bits(rng.gen_range(0..32), 5),
                    _ => enc.encode_icdf(rng.gen_range(0..4), &[25, 23, 2, 0], 5),
                }
            }
            enc.done();
            enc.buffer().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn mixed_symbols_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let ops = (0..2000)
            .map(|_| {
                let kind = rng.gen_range(0..5u32);
                let v = match kind {
                    0 => rng.gen_range(0..3000u32),
                    1 => rng.gen_bool(0.3) as u32,
                    2 => rng.gen_range(0..(1 << 12)),
                    3 => rng.gen_range(0..11),
                    _ => rng.gen_range(0..16),
                };
                (kind, v)
            })
            .collect::<Vec<_>>();
        let trim_icdf = [126u8, 124, 119, 109, 87, 41, 19, 9, 4, 2, 0];

        let mut enc = RangeEncoder::new(8192);
        let mut tells = Vec::new();
        for &(kind, v) in ops.iter() {
            match kind {
                0 => enc.encode_uint(v, 3000),
                1 => enc.encode_bit_logp(v == 1, 2),
                2 => enc.encode_bits(v, 12),
                3 => enc.encode_icdf(v as usize, &trim_icdf, 7),
                _ => enc.encode_bin(v, v + 1, 4),
            }
            tells.push(enc.tell_frac());
        }
        enc.done();
        assert!(!enc.error());

        let mut dec = RangeDecoder::new(enc.buffer());
        for (&(kind, v), &tell) in ops.iter().zip(tells.iter()) {
            let got = match kind {
                0 => dec.decode_uint(3000),
                1 => dec.decode_bit_logp(2) as u32,
                2 => dec.decode_bits(12),
                3 => dec.decode_icdf(&trim_icdf, 7) as u32,
                _ => {
                    let s = dec.decode_bin(4);
                    dec.update(s, s + 1, 16);
                    s
                }
            };
            assert_eq!(got, v);
            assert_eq!(dec.tell_frac(), tell);
        }
        assert!(!dec.error());
    }

    #[test]
    fn tell_frac_tracks_whole_bits() {
        let mut enc = RangeEncoder::new(64);
        let start = enc.tell();
        assert_eq!(start, 1);
        for _ in 0..8 {
            enc.encode_bit_logp(false, 1);
        }
        let whole = enc.tell();
        let frac = enc.tell_frac();
        assert!(whole - start >= 8);
        assert!(frac <= whole << BITRES);
        assert!(frac > (whole - 1) << BITRES);
    }

    #[test]
    fn overflow_sets_sticky_error() {
        let mut enc = RangeEncoder::new(2);
        for k in 0..64 {
            enc.encode_uint(k % 200, 200);
        }
        enc.done();
        assert!(enc.error());
    }

    #[test]
    fn out_of_range_uint_sets_corrupt_flag() {
        let mut enc = RangeEncoder::new(16);
        enc.encode_uint(0x1FFFF, 0x20000);
        enc.done();

        let mut dec = RangeDecoder::new(enc.buffer());
        let v = dec.decode_uint(0x10001);
        assert_eq!(v, 0x10000);
        assert!(dec.error());
    }

    #[test]
    fn coder_helpers_are_symmetric() {
        let mut enc = RangeEncoder::new(64);
        {
            let mut coder = Coder::Encoder(&mut enc);
            assert!(coder.is_encoder());
            assert_eq!(coder.uint(9, 21), 9);
            assert!(coder.bit_logp(true, 4));
            assert_eq!(coder.bits(5, 3), 5);
            assert_eq!(coder.icdf(2, &[25, 23, 2, 0], 5), 2);
        }
        enc.done();
        let mut dec = RangeDecoder::new(enc.buffer());
        let mut coder = Coder::Decoder(&mut dec);
        assert!(!coder.is_encoder());
        assert_eq!(coder.uint(0, 21), 9);
        assert!(coder.bit_logp(false, 4));
        assert_eq!(coder.bits(0, 3), 5);
        assert_eq!(coder.icdf(0, &[25, 23, 2, 0], 5), 2);
        assert!(!coder.error());
    }
}
