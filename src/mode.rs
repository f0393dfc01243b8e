//! Codec mode: band layout and every table derived from it.

pub mod cache;
pub mod tables;

pub use cache::*;
pub use tables::*;

use crate::codec::cwrs::log2_frac;
use crate::error::{Error, Result};
use crate::range::BITRES;
use std::sync::LazyLock;

static STANDARD: LazyLock<Mode> = LazyLock::new(|| Mode::build(48_000, 960, 3));

/// # Description
/// Immutable tables for one sample rate and frame size.
/// ## Comments
/// - built once and shared read-only between every frame coder using it
#[derive(Clone, Debug, PartialEq)]
pub struct Mode {
    pub sample_rate: i32,
    pub max_lm: i32,
    pub short_mdct_size: i32,
    pub nb_ebands: usize,
    /// bands above this one would lie past the end of the spectrum
    pub eff_ebands: usize,
    /// band edges in bins of the shortest block, `nb_ebands + 1` entries
    pub ebands: Vec<i16>,
    pub nb_alloc_vectors: usize,
    /// `nb_alloc_vectors` rows of `nb_ebands` entries
    pub alloc_vectors: Vec<u8>,
    /// `log2` of band widths in 1/8 bits
    pub log_n: Vec<i16>,
    pub cache: PulseCache,
}

impl Mode {
    /// the 48 kHz, 20 ms mode with 21 bands
    pub fn standard() -> &'static Mode {
        &STANDARD
    }

    /// # Description
    /// Builds a mode for any supported sample rate and frame size.
    /// ## Parameters
    /// - `sample_rate` between 8000 and 96000 Hz
    /// - `frame_size` even, between 40 and 1024 samples, at most one second long
    pub fn custom(sample_rate: i32, frame_size: i32) -> Result<Mode> {
        if !(8_000..=96_000).contains(&sample_rate) {
            return Err(Error::InvalidMode(format!(
                "sample rate {} outside 8000..=96000",
                sample_rate
            )));
        }
        if !(40..=1024).contains(&frame_size) || frame_size % 2 != 0 {
            return Err(Error::InvalidMode(format!(
                "frame size {} must be even and within 40..=1024",
                frame_size
            )));
        }
        if frame_size * 1000 < sample_rate {
            return Err(Error::InvalidMode(format!(
                "frame size {} shorter than 1ms at {} Hz",
                frame_size, sample_rate
            )));
        }

        let lm = if frame_size * 75 >= sample_rate && frame_size % 16 == 0 {
            3
        } else if frame_size * 150 >= sample_rate && frame_size % 8 == 0 {
            2
        } else if frame_size * 300 >= sample_rate && frame_size % 4 == 0 {
            1
        } else {
            0
        };
        if (frame_size >> lm) * 300 > sample_rate {
            return Err(Error::InvalidMode(format!(
                "short blocks of {} samples are longer than 3.3ms",
                frame_size >> lm
            )));
        }

        let mode = Self::build(sample_rate, frame_size, lm);
        if mode.nb_ebands == 0 {
            return Err(Error::InvalidMode("mode has no bands".to_string()));
        }
        log::debug!(
            "custom mode {}Hz/{}: lm={} bands={} effective={}",
            sample_rate,
            frame_size,
            lm,
            mode.nb_ebands,
            mode.eff_ebands
        );
        Ok(mode)
    }

    fn build(sample_rate: i32, frame_size: i32, lm: i32) -> Mode {
        let short_mdct_size = frame_size >> lm;
        let res = (sample_rate + short_mdct_size) / (2 * short_mdct_size);
        let ebands = compute_ebands(sample_rate, short_mdct_size, res);
        let nb_ebands = ebands.len() - 1;

        let mut eff_ebands = nb_ebands;
        while eff_ebands > 0 && i32::from(ebands[eff_ebands]) > short_mdct_size {
            eff_ebands -= 1;
        }

        let alloc_vectors = compute_allocation_table(sample_rate, short_mdct_size, &ebands);
        let log_n = (0..nb_ebands)
            .map(|i| log2_frac((ebands[i + 1] - ebands[i]) as u32, BITRES) as i16)
            .collect::<Vec<_>>();
        let cache = PulseCache::compute(&ebands, &log_n, lm);

        Mode {
            sample_rate,
            max_lm: lm,
            short_mdct_size,
            nb_ebands,
            eff_ebands,
            ebands,
            nb_alloc_vectors: BITALLOC_SIZE,
            alloc_vectors,
            log_n,
            cache,
        }
    }

    /// samples per frame at block size `lm`
    pub fn frame_size(&self, lm: i32) -> usize {
        (self.short_mdct_size << lm) as usize
    }

    /// width of `band` at block size `lm`
    #[inline]
    pub fn band_width(&self, band: usize, lm: i32) -> i32 {
        i32::from(self.ebands[band + 1] - self.ebands[band]) << lm
    }

    /// # Description
    /// per band allocation caps in 1/8 bits for `channels` at block size `lm`
    pub fn init_caps(&self, lm: i32, channels: i32) -> Vec<i32> {
        self.cache.band_caps(&self.ebands, lm, channels)
    }

    /// mean log2 energy of `band`
    pub fn e_mean(&self, band: usize) -> f32 {
        E_MEANS[band.min(E_MEANS.len() - 1)]
    }
}

/// # Description
/// Band edges for a mode whose short blocks are `frame_size` bins long.
/// ## Comments
/// - modes with 2.5 ms short blocks use [`EBAND_5MS`] as is
/// - otherwise bands follow the Bark scale, with bands narrower than `res`
///   Hz merged into linearly spaced single bin bands
pub fn compute_ebands(sample_rate: i32, frame_size: i32, res: i32) -> Vec<i16> {
    if sample_rate == 400 * frame_size {
        return EBAND_5MS.to_vec();
    }
    let bark_bands = BARK_FREQ.len() - 1;
    let mut nbark = 1;
    while nbark < bark_bands && BARK_FREQ[nbark + 1] * 2 < sample_rate {
        nbark += 1;
    }

    let mut lin = 0;
    while lin < nbark && BARK_FREQ[lin + 1] - BARK_FREQ[lin] < res {
        lin += 1;
    }

    let low = ((BARK_FREQ[lin] + res / 2) / res) as usize;
    let high = nbark - lin;
    let nb = low + high;
    let mut ebands = vec![0i32; nb + 2];

    for (i, e) in ebands.iter_mut().enumerate().take(low) {
        *e = i as i32;
    }
    let mut offset = if low > 0 {
        ebands[low - 1] * res - BARK_FREQ[lin - 1]
    } else {
        0
    };
    for i in 0..high {
        let target = BARK_FREQ[lin + i];
        // even number of bins
        ebands[i + low] = (target + offset / 2 + res) / (2 * res) * 2;
        offset = ebands[i + low] * res - target;
    }
    for (i, e) in ebands.iter_mut().enumerate().take(nb) {
        if *e < i as i32 {
            *e = i as i32;
        }
    }
    ebands[nb] = ((BARK_FREQ[nbark] + res) / (2 * res) * 2).min(frame_size);

    for i in 1..nb.saturating_sub(1) {
        if ebands[i + 1] - ebands[i] < ebands[i] - ebands[i - 1] {
            ebands[i] -= (2 * ebands[i] - ebands[i - 1] - ebands[i + 1]) / 2;
        }
    }

    // drop empty bands
    let mut j = 0;
    for i in 0..nb {
        if ebands[i + 1] > ebands[j] {
            j += 1;
            ebands[j] = ebands[i + 1];
        }
    }
    ebands.truncate(j + 1);
    ebands.into_iter().map(|e| e as i16).collect()
}

/// # Description
/// Allocation curves resampled from the 21 band table onto `ebands`.
pub fn compute_allocation_table(sample_rate: i32, short_mdct_size: i32, ebands: &[i16]) -> Vec<u8> {
    let nb = ebands.len() - 1;
    let max_bands = EBAND_5MS.len() - 1;
    if sample_rate == 400 * short_mdct_size {
        return BAND_ALLOCATION.to_vec();
    }

    let mut alloc = vec![0u8; BITALLOC_SIZE * nb];
    for i in 0..BITALLOC_SIZE {
        for j in 0..nb {
            let pos = i32::from(ebands[j]) * sample_rate / short_mdct_size;
            let k = (0..max_bands)
                .find(|&k| 400 * i32::from(EBAND_5MS[k]) > pos)
                .unwrap_or(max_bands);
            alloc[i * nb + j] = if k > max_bands - 1 {
                BAND_ALLOCATION[i * max_bands + max_bands - 1]
            } else {
                let a1 = pos - 400 * i32::from(EBAND_5MS[k - 1]);
                let a0 = 400 * i32::from(EBAND_5MS[k]) - pos;
                let lo = i32::from(BAND_ALLOCATION[i * max_bands + k - 1]);
                let hi = i32::from(BAND_ALLOCATION[i * max_bands + k]);
                ((a0 * lo + a1 * hi) / (a0 + a1)) as u8
            };
        }
    }
    alloc
}
