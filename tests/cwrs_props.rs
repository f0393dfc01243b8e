use celt_quant::{
    codec::cwrs::{cwrsi, decode_pulses, encode_pulses, fits_in32, icwrs, pvq_v},
    codec::vq::op_pvq_search,
    RangeDecoder, RangeEncoder,
};
use proptest::prelude::*;

/// largest pulse count up to 64 whose codebook at `n` fits in 32 bits
fn max_pulses(n: usize) -> usize {
    (1..=64).take_while(|&k| fits_in32(n as i32, k as i32)).last().unwrap_or(0)
}

/// a dimension, a pulse count whose codebook fits, and an index seed
fn codebook() -> impl Strategy<Value = (usize, usize, u32)> {
    (1usize..=20).prop_flat_map(|n| (Just(n), 0..=max_pulses(n), any::<u32>()))
}

proptest! {
    #[test]
    fn index_to_vector_and_back((n, k, seed) in codebook()) {
        let v = pvq_v(n, k);
        let index = seed % v;
        let mut y = vec![0; n];
        if k > 0 {
            let yy = cwrsi(k, index, &mut y);
            prop_assert_eq!(y.iter().map(|p| p.abs()).sum::<i32>(), k as i32);
            prop_assert_eq!(y.iter().map(|p| p * p).sum::<i32>(), yy);
            prop_assert_eq!(icwrs(&y), index);
        }

        let mut enc = RangeEncoder::new(16);
        encode_pulses(&y, k, &mut enc);
        enc.done();
        prop_assert!(!enc.error());
        let mut dec = RangeDecoder::new(enc.buffer());
        let mut out = vec![7; n];
        decode_pulses(&mut out, k, &mut dec);
        prop_assert_eq!(out, y);
        prop_assert!(!dec.error());
    }

    #[test]
    fn pulse_vectors_survive_the_range_coder(
        pulses in proptest::collection::vec((0usize..8, any::<bool>()), 1..10)
    ) {
        let n = 8;
        let mut y = vec![0i32; n];
        for &(pos, negative) in pulses.iter() {
            if y[pos] == 0 {
                y[pos] = if negative { -1 } else { 1 };
            } else {
                y[pos] += y[pos].signum();
            }
        }
        let k = y.iter().map(|p| p.unsigned_abs() as usize).sum::<usize>();

        let mut enc = RangeEncoder::new(32);
        encode_pulses(&y, k, &mut enc);
        enc.done();
        let mut dec = RangeDecoder::new(enc.buffer());
        let mut out = vec![0; n];
        decode_pulses(&mut out, k, &mut dec);
        prop_assert_eq!(out, y);
        prop_assert!(!dec.error());
    }

    #[test]
    fn search_places_exactly_k_pulses(
        x in proptest::collection::vec(-1.0f32..1.0, 2..48),
        k in 1i32..64,
    ) {
        let mut x = x;
        let mut iy = vec![0; x.len()];
        op_pvq_search(&mut x, &mut iy, k);
        prop_assert_eq!(iy.iter().map(|p| p.abs()).sum::<i32>(), k);
    }
}
