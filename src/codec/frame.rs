//! Frame layer: codes the side information of a frame and drives the
//! allocator and band quantizer in bitstream order.

use super::bands::{
    amp_to_log2, anti_collapse, compute_band_energies, denormalise_bands, normalise_bands,
    quant_all_bands, BandQuantParams,
};
use super::packet::EncodedFrame;
use super::rate::{compute_allocation, Allocation, AllocationRequest};
use super::vq::Spread;
use crate::collections::CollapseMasks;
use crate::error::{Error, Result};
use crate::mode::{Mode, SPREAD_ICDF, TF_SELECT_TABLE, TRIM_ICDF};
use crate::range::{Coder, RangeDecoder, RangeEncoder, BITRES};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// largest frame the bitstream can describe
pub const MAX_FRAME_BYTES: usize = 1275;

/// # Description
/// Everything a frame coder needs besides the mode.
/// ## Comments
/// - `tf_res` holds one raw `0`/`1` flag per band, `dynalloc` the number of
///   boost quanta wanted per band; either may be left empty for all zeros
/// - the decoder only reads `channels`, `lm`, `start`, `end` and `disable_inv`,
///   the rest is recovered from the bitstream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    pub channels: usize,
    pub lm: i32,
    pub start: usize,
    pub end: usize,
    /// `0..=10`, the theta search runs from 8 up
    pub complexity: i32,
    pub spread: Spread,
    /// `0..=10`, 5 is a flat tilt
    pub alloc_trim: i32,
    pub intensity: usize,
    pub dual_stereo: bool,
    pub disable_inv: bool,
    pub transient: bool,
    pub tf_select: bool,
    pub tf_res: Vec<i32>,
    pub dynalloc: Vec<i32>,
    pub bytes_per_frame: usize,
}

impl FrameConfig {
    /// mono, long blocks over every effective band of `mode`, 160 bytes a frame
    pub fn new(mode: &Mode) -> Self {
        Self {
            channels: 1,
            lm: mode.max_lm,
            start: 0,
            end: mode.eff_ebands,
            complexity: 5,
            spread: Spread::Normal,
            alloc_trim: 5,
            intensity: mode.eff_ebands,
            dual_stereo: false,
            disable_inv: false,
            transient: false,
            tf_select: false,
            tf_res: Vec::new(),
            dynalloc: Vec::new(),
            bytes_per_frame: 160,
        }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_bytes_per_frame(mut self, bytes: usize) -> Self {
        self.bytes_per_frame = bytes;
        self
    }

    pub fn with_complexity(mut self, complexity: i32) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// # Description
    /// Checks every field against `mode`.
    /// ## Returns
    /// `Error::InvalidArgument` naming the first field out of range
    pub fn validate(&self, mode: &Mode) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidArgument(msg));
        if self.channels != 1 && self.channels != 2 {
            return invalid(format!("channels must be 1 or 2, got {}", self.channels));
        }
        if !(0..=mode.max_lm).contains(&self.lm) {
            return invalid(format!("lm {} outside 0..={}", self.lm, mode.max_lm));
        }
        if self.start >= self.end || self.end > mode.eff_ebands {
            return invalid(format!(
                "band range {}..{} must be non empty and end at most at {}",
                self.start, self.end, mode.eff_ebands
            ));
        }
        if !(0..=10).contains(&self.complexity) {
            return invalid(format!("complexity {} outside 0..=10", self.complexity));
        }
        if !(0..=10).contains(&self.alloc_trim) {
            return invalid(format!("alloc trim {} outside 0..=10", self.alloc_trim));
        }
        if self.intensity > self.end {
            return invalid(format!("intensity band {} past end {}", self.intensity, self.end));
        }
        if self.dual_stereo && self.channels != 2 {
            return invalid("dual stereo needs two channels".to_string());
        }
        if self.transient && self.lm == 0 {
            return invalid("transient frames need lm > 0".to_string());
        }
        if !self.tf_res.is_empty()
            && (self.tf_res.len() != mode.nb_ebands || self.tf_res.iter().any(|&t| t != 0 && t != 1))
        {
            return invalid(format!("tf_res needs {} flags of 0 or 1", mode.nb_ebands));
        }
        if !self.dynalloc.is_empty()
            && (self.dynalloc.len() != mode.nb_ebands || self.dynalloc.iter().any(|&d| d < 0))
        {
            return invalid(format!("dynalloc needs {} non negative counts", mode.nb_ebands));
        }
        if !(2..=MAX_FRAME_BYTES).contains(&self.bytes_per_frame) {
            return invalid(format!(
                "bytes per frame {} outside 2..={}",
                self.bytes_per_frame, MAX_FRAME_BYTES
            ));
        }
        Ok(())
    }

    pub fn save_to<Resource>(&self, res: Resource) -> Result<()>
    where
        Resource: Write,
    {
        bincode::serialize_into(res, self)?;
        Ok(())
    }

    pub fn load<Resource>(res: Resource) -> Result<Self>
    where
        Resource: Read,
    {
        Ok(bincode::deserialize_from(res)?)
    }
}

/// # Description
/// Side information and allocation of one coded frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameInfo {
    pub transient: bool,
    pub tf_select: bool,
    /// tf resolution change per band, after the select table
    pub tf_res: Vec<i32>,
    pub spread: Option<Spread>,
    pub alloc_trim: i32,
    /// dynalloc boost per band in 1/8 bits
    pub offsets: Vec<i32>,
    pub allocation: Allocation,
    pub anti_collapse: bool,
    pub final_range: u32,
    /// bits the frame actually used
    pub bits_used: i32,
}

/// # Description
/// Codes the per band tf resolution flags.
/// ## Parameters
/// - `tf_res` raw flags on input, resolution changes from [`TF_SELECT_TABLE`] on output
/// ## Returns
/// the coded `tf_select`
fn tf_code(
    start: usize,
    end: usize,
    transient: bool,
    tf_res: &mut [i32],
    lm: i32,
    tf_select: bool,
    coder: &mut Coder,
) -> bool {
    let mut budget = coder.storage() as i32 * 8;
    let mut tell = coder.tell();
    let mut logp = if transient { 2 } else { 4 };
    let tf_select_rsv = lm > 0 && tell + logp + 1 <= budget;
    budget -= tf_select_rsv as i32;

    let mut curr = 0;
    let mut tf_changed = 0;
    for tf in tf_res[start..end].iter_mut() {
        if tell + logp <= budget {
            let flip = coder.bit_logp((*tf ^ curr) != 0, logp as u32);
            curr ^= flip as i32;
            tell = coder.tell();
            tf_changed |= curr;
        }
        *tf = curr;
        logp = if transient { 4 } else { 5 };
    }

    let row = &TF_SELECT_TABLE[lm as usize];
    let base = 4 * transient as usize;
    let tf_changed = tf_changed as usize;
    let tf_select = if tf_select_rsv && row[base + tf_changed] != row[base + 2 + tf_changed] {
        coder.bit_logp(tf_select, 1)
    } else {
        false
    };
    for tf in tf_res[start..end].iter_mut() {
        *tf = i32::from(row[base + 2 * tf_select as usize + *tf as usize]);
    }
    tf_select
}

/// encoder side of the tf resolution flags, see [`tf_decode`]
pub fn tf_encode(
    start: usize,
    end: usize,
    transient: bool,
    tf_res: &mut [i32],
    lm: i32,
    tf_select: bool,
    enc: &mut RangeEncoder,
) -> bool {
    tf_code(start, end, transient, tf_res, lm, tf_select, &mut Coder::Encoder(enc))
}

/// # Description
/// Reads the tf resolution change of every band in `start..end` into `tf_res`.
pub fn tf_decode(start: usize, end: usize, transient: bool, tf_res: &mut [i32], lm: i32, dec: &mut RangeDecoder) -> bool {
    tf_code(start, end, transient, tf_res, lm, false, &mut Coder::Decoder(dec))
}

/// side information of a frame up to and including the allocation trim
struct SideInfo {
    transient: bool,
    tf_select: bool,
    tf_res: Vec<i32>,
    spread: Spread,
    offsets: Vec<i32>,
    cap: Vec<i32>,
    alloc_trim: i32,
}

/// # Description
/// Codes transient flag, tf resolution, spread, dynalloc boosts and trim.
/// The encoder's wishes come from `config`; the decoder ignores them.
fn code_side_info(mode: &Mode, config: &FrameConfig, coder: &mut Coder) -> SideInfo {
    let FrameConfig {
        channels,
        lm,
        start,
        end,
        ..
    } = *config;
    let nb = mode.nb_ebands;
    let c = channels as i32;
    let total_bits = coder.storage() as i32 * 8;

    let transient = if lm > 0 && coder.tell() + 3 <= total_bits {
        coder.bit_logp(config.transient, 3)
    } else {
        false
    };

    let mut tf_res = if config.tf_res.is_empty() {
        vec![0; nb]
    } else {
        config.tf_res.clone()
    };
    let tf_select = tf_code(start, end, transient, &mut tf_res, lm, config.tf_select, coder);

    let spread = if coder.tell() + 4 <= total_bits {
        // the four entry icdf only yields 0..=3
        Spread::from_index(coder.icdf(config.spread.index(), &SPREAD_ICDF, 5)).unwrap_or(Spread::Normal)
    } else {
        Spread::Normal
    };

    let cap = mode.init_caps(lm, c);
    let mut offsets = vec![0; nb];
    let mut dynalloc_logp = 6;
    let mut total_bits = total_bits << BITRES;
    let mut tell = coder.tell_frac();
    for i in start..end {
        let width = c * mode.band_width(i, lm);
        // 6 bits, but no more than 1 bit/sample and no less than 1/8 bit/sample
        let quanta = (width << BITRES).min((6 << BITRES).max(width));
        let wanted = config.dynalloc.get(i).copied().unwrap_or(0);
        let mut loop_logp = dynalloc_logp;
        let mut boost = 0;
        let mut j = 0;
        while tell + (loop_logp << BITRES) < total_bits && boost < cap[i] {
            let flag = coder.bit_logp(j < wanted, loop_logp as u32);
            tell = coder.tell_frac();
            if !flag {
                break;
            }
            boost += quanta;
            total_bits -= quanta;
            loop_logp = 1;
            j += 1;
        }
        offsets[i] = boost;
        if boost > 0 {
            dynalloc_logp = 2.max(dynalloc_logp - 1);
        }
    }

    let alloc_trim = if tell + (6 << BITRES) <= total_bits {
        coder.icdf(config.alloc_trim as usize, &TRIM_ICDF, 7) as i32
    } else {
        5
    };

    SideInfo {
        transient,
        tf_select,
        tf_res,
        spread,
        offsets,
        cap,
        alloc_trim,
    }
}

/// bits left for the bands and the anti-collapse reservation taken out of them
fn band_budget(bytes: usize, transient: bool, lm: i32, coder: &Coder) -> (i32, i32) {
    let bits = ((bytes as i32 * 8) << BITRES) - coder.tell_frac() - 1;
    let anti_collapse_rsv = if transient && lm >= 2 && bits >= (lm + 2) << BITRES {
        1 << BITRES
    } else {
        0
    };
    (bits - anti_collapse_rsv, anti_collapse_rsv)
}

/// # Description
/// Encodes normalised band shapes one frame at a time.
/// ## Comments
/// - carries the folding seed, the coded band count hysteresis and the run
///   of transient frames from one frame to the next
pub struct FrameEncoder<'a> {
    mode: &'a Mode,
    config: FrameConfig,
    rng: u32,
    last_coded_bands: usize,
    consec_transient: i32,
    info: FrameInfo,
}

impl<'a> FrameEncoder<'a> {
    pub fn new(mode: &'a Mode, config: FrameConfig) -> Result<Self> {
        config.validate(mode)?;
        Ok(Self {
            mode,
            config,
            rng: 0,
            last_coded_bands: 0,
            consec_transient: 0,
            info: FrameInfo::default(),
        })
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// replaces the configuration used from the next frame on
    pub fn set_config(&mut self, config: FrameConfig) -> Result<()> {
        config.validate(self.mode)?;
        self.config = config;
        Ok(())
    }

    /// side information and allocation of the last encoded frame
    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// samples per channel in a frame
    pub fn frame_size(&self) -> usize {
        self.mode.frame_size(self.config.lm)
    }

    /// # Description
    /// Splits a raw spectrum into band energies and shapes, then encodes it.
    /// ## Parameters
    /// - `freq` one frame per channel, channels one after the other
    pub fn encode_spectrum(&mut self, freq: &[f32]) -> Result<EncodedFrame> {
        let mode = self.mode;
        let FrameConfig {
            channels, lm, end, ..
        } = self.config;
        let n = self.frame_size();
        if freq.len() != channels * n {
            return Err(Error::InvalidArgument(format!(
                "spectrum holds {} samples, expected {}",
                freq.len(),
                channels * n
            )));
        }
        let nb = mode.nb_ebands;
        let mut band_e = vec![0.0; 2 * nb];
        compute_band_energies(mode, freq, &mut band_e, end, channels, lm);
        let mut shapes = vec![0.0; channels * n];
        normalise_bands(mode, freq, &mut shapes, &band_e, end, channels, lm);
        let mut log_e = vec![0.0; channels * nb];
        amp_to_log2(mode, end, end, &band_e, &mut log_e, channels);
        self.encode(&shapes, &band_e, &log_e)
    }

    /// # Description
    /// Encodes one frame of unit norm band shapes.
    /// ## Parameters
    /// - `shapes` `channels * frame_size()` samples
    /// - `band_e` linear band energies, `band + channel * nb_ebands`
    /// - `log_e` log2 energies stored with the frame for the decoder
    /// ## Returns
    /// `Error::BufferOverflow` if the range coder ran out of room
    pub fn encode(&mut self, shapes: &[f32], band_e: &[f32], log_e: &[f32]) -> Result<EncodedFrame> {
        let mode = self.mode;
        let nb = mode.nb_ebands;
        let config = &self.config;
        let FrameConfig {
            channels,
            lm,
            start,
            end,
            complexity,
            disable_inv,
            bytes_per_frame: bytes,
            ..
        } = *config;
        let n = mode.frame_size(lm);
        if shapes.len() != channels * n {
            return Err(Error::InvalidArgument(format!(
                "shapes hold {} samples, expected {}",
                shapes.len(),
                channels * n
            )));
        }
        if band_e.len() < channels * nb || log_e.len() < channels * nb {
            return Err(Error::BufferTooSmall {
                needed: channels * nb,
                got: band_e.len().min(log_e.len()),
            });
        }

        let mut enc = RangeEncoder::new(bytes);
        let mut coder = Coder::Encoder(&mut enc);
        let side = code_side_info(mode, config, &mut coder);
        let (bits, anti_collapse_rsv) = band_budget(bytes, side.transient, lm, &coder);

        let req = AllocationRequest {
            start,
            end,
            offsets: &side.offsets,
            cap: &side.cap,
            alloc_trim: side.alloc_trim,
            intensity: config.intensity,
            dual_stereo: config.dual_stereo,
            total: bits,
            channels: channels as i32,
            lm,
            prev: self.last_coded_bands,
            signal_bandwidth: end - 1,
        };
        let alloc = compute_allocation(mode, &req, &mut coder);
        self.last_coded_bands = if self.last_coded_bands != 0 {
            (self.last_coded_bands + 1).min(self.last_coded_bands.saturating_sub(1).max(alloc.coded_bands))
        } else {
            alloc.coded_bands
        };

        let params = BandQuantParams {
            start,
            end,
            band_e,
            pulses: &alloc.pulses,
            short_blocks: side.transient,
            spread: side.spread,
            dual_stereo: alloc.dual_stereo,
            intensity: alloc.intensity,
            tf_res: &side.tf_res,
            total_bits: (bytes as i32 * (8 << BITRES)) - anti_collapse_rsv,
            balance: alloc.balance,
            lm,
            coded_bands: alloc.coded_bands,
            complexity,
            disable_inv,
        };
        let mut x = shapes.to_vec();
        let (xs, ys) = x.split_at_mut(n);
        let mut masks = CollapseMasks::new(nb, channels);
        let mut seed = self.rng;
        let y = if channels == 2 { Some(ys) } else { None };
        quant_all_bands(mode, &params, xs, y, &mut masks, &mut seed, &mut coder);

        let mut anti_collapse_on = false;
        if anti_collapse_rsv > 0 {
            anti_collapse_on = self.consec_transient < 2;
            coder.bits(anti_collapse_on as u32, 1);
        }
        let bits_used = coder.tell();

        if side.transient {
            self.consec_transient += 1;
        } else {
            self.consec_transient = 0;
        }
        self.rng = enc.range();
        enc.done();
        if enc.error() {
            log::warn!("range encoder overflowed a {} byte frame", bytes);
            return Err(Error::BufferOverflow);
        }
        log::debug!(
            "encoded frame: coded={} intensity={} dual={} bits={}/{} range={:#010x}",
            alloc.coded_bands,
            alloc.intensity,
            alloc.dual_stereo,
            bits_used,
            bytes * 8,
            self.rng
        );

        self.info = FrameInfo {
            transient: side.transient,
            tf_select: side.tf_select,
            tf_res: side.tf_res,
            spread: Some(side.spread),
            alloc_trim: side.alloc_trim,
            offsets: side.offsets,
            allocation: alloc,
            anti_collapse: anti_collapse_on,
            final_range: self.rng,
            bits_used,
        };
        Ok(EncodedFrame {
            data: enc.into_bytes(),
            log_e: log_e[..channels * nb].to_vec(),
            final_range: self.rng,
        })
    }
}

/// # Description
/// A decoded frame.
/// ## Comments
/// - `shapes` and `spectrum` hold the channels one after the other
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub shapes: Vec<f32>,
    pub spectrum: Vec<f32>,
    pub info: FrameInfo,
}

/// # Description
/// Decodes frames produced by a [`FrameEncoder`] with the same mode and
/// configuration.
/// ## Comments
/// - keeps the folding seed and the two previous frames of log energies for
///   anti-collapse
pub struct FrameDecoder<'a> {
    mode: &'a Mode,
    config: FrameConfig,
    rng: u32,
    old_log_e: Vec<f32>,
    old_log_e2: Vec<f32>,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(mode: &'a Mode, config: FrameConfig) -> Result<Self> {
        config.validate(mode)?;
        let nb = mode.nb_ebands;
        Ok(Self {
            mode,
            config,
            rng: 0,
            old_log_e: vec![-28.0; 2 * nb],
            old_log_e2: vec![-28.0; 2 * nb],
        })
    }

    /// final range of the last decoded frame, equal to the encoder's for an intact frame
    pub fn final_range(&self) -> u32 {
        self.rng
    }

    /// # Description
    /// Decodes one frame.
    /// ## Returns
    /// `Error::CorruptStream` when the range decoder flagged an invalid symbol
    /// or read past the end of the frame
    pub fn decode(&mut self, frame: &EncodedFrame) -> Result<DecodedFrame> {
        let mode = self.mode;
        let nb = mode.nb_ebands;
        let config = &self.config;
        let FrameConfig {
            channels,
            lm,
            start,
            end,
            disable_inv,
            ..
        } = *config;
        let n = mode.frame_size(lm);
        let bytes = frame.data.len();
        if bytes < 2 {
            return Err(Error::BufferTooSmall { needed: 2, got: bytes });
        }
        if frame.log_e.len() < channels * nb {
            return Err(Error::BufferTooSmall {
                needed: channels * nb,
                got: frame.log_e.len(),
            });
        }

        let mut dec = RangeDecoder::new(&frame.data);
        let mut coder = Coder::Decoder(&mut dec);
        let side = code_side_info(mode, config, &mut coder);
        let (bits, anti_collapse_rsv) = band_budget(bytes, side.transient, lm, &coder);

        let req = AllocationRequest {
            start,
            end,
            offsets: &side.offsets,
            cap: &side.cap,
            alloc_trim: side.alloc_trim,
            intensity: 0,
            dual_stereo: false,
            total: bits,
            channels: channels as i32,
            lm,
            prev: 0,
            signal_bandwidth: 0,
        };
        let alloc = compute_allocation(mode, &req, &mut coder);

        let params = BandQuantParams {
            start,
            end,
            band_e: &[],
            pulses: &alloc.pulses,
            short_blocks: side.transient,
            spread: side.spread,
            dual_stereo: alloc.dual_stereo,
            intensity: alloc.intensity,
            tf_res: &side.tf_res,
            total_bits: (bytes as i32 * (8 << BITRES)) - anti_collapse_rsv,
            balance: alloc.balance,
            lm,
            coded_bands: alloc.coded_bands,
            complexity: 0,
            disable_inv,
        };
        let mut shapes = vec![0.0; channels * n];
        let mut masks = CollapseMasks::new(nb, channels);
        let mut seed = self.rng;
        {
            let (xs, ys) = shapes.split_at_mut(n);
            let y = if channels == 2 { Some(ys) } else { None };
            quant_all_bands(mode, &params, xs, y, &mut masks, &mut seed, &mut coder);
        }

        let anti_collapse_on = anti_collapse_rsv > 0 && coder.bits(0, 1) != 0;
        let bits_used = coder.tell();
        if dec.error() || bits_used > bytes as i32 * 8 {
            log::warn!("corrupt frame: {} bits read from {} bytes", bits_used, bytes);
            return Err(Error::CorruptStream);
        }

        let mut log_e = vec![0.0; 2 * nb];
        log_e[..channels * nb].copy_from_slice(&frame.log_e[..channels * nb]);
        if channels == 1 {
            log_e.copy_within(0..nb, nb);
        }
        if anti_collapse_on {
            anti_collapse(
                mode,
                &mut shapes,
                &masks,
                lm,
                channels,
                n,
                start,
                end,
                &log_e,
                &self.old_log_e,
                &self.old_log_e2,
                &alloc.pulses,
                seed,
            );
        }

        let mut spectrum = vec![0.0; channels * n];
        for c in 0..channels {
            denormalise_bands(
                mode,
                &shapes[c * n..(c + 1) * n],
                &mut spectrum[c * n..(c + 1) * n],
                &log_e[c * nb..],
                start,
                end,
                lm,
                false,
            );
        }

        if side.transient {
            self.old_log_e
                .iter_mut()
                .zip(log_e.iter())
                .for_each(|(old, &e)| *old = old.min(e));
        } else {
            self.old_log_e2.copy_from_slice(&self.old_log_e);
            self.old_log_e.copy_from_slice(&log_e);
        }
        self.rng = dec.range();
        log::debug!(
            "decoded frame: coded={} intensity={} dual={} anti_collapse={} range={:#010x}",
            alloc.coded_bands,
            alloc.intensity,
            alloc.dual_stereo,
            anti_collapse_on,
            self.rng
        );

        Ok(DecodedFrame {
            shapes,
            spectrum,
            info: FrameInfo {
                transient: side.transient,
                tf_select: side.tf_select,
                tf_res: side.tf_res,
                spread: Some(side.spread),
                alloc_trim: side.alloc_trim,
                offsets: side.offsets,
                allocation: alloc,
                anti_collapse: anti_collapse_on,
                final_range: self.rng,
                bits_used,
            },
        })
    }
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn sanity() {
        let mode = Mode::standard();
        let config = FrameConfig::new(mode);
        assert!(config.validate(mode).is_ok());
        assert!(config.clone().with_channels(3).validate(mode).is_err());
        assert!(config.clone().with_bytes_per_frame(1).validate(mode).is_err());
        assert!(config.clone().with_complexity(11).validate(mode).is_err());
        let mut bad = config.clone();
        bad.lm = 0;
        bad.transient = true;
        assert!(matches!(bad.validate(mode), Err(Error::InvalidArgument(_))));
        let mut bad = config;
        bad.tf_res = vec![2; mode.nb_ebands];
        assert!(bad.validate(mode).is_err());
    }

    #[test]
    fn config_survives_save_and_load() {
        let mode = Mode::standard();
        let mut config = FrameConfig::new(mode).with_channels(2).with_transient(true);
        config.dynalloc = vec![1; mode.nb_ebands];
        config.spread = Spread::Aggressive;
        let mut buf = Vec::new();
        config.save_to(&mut buf).unwrap();
        let loaded = FrameConfig::load(&buf[..]).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn tf_flags_round_trip() {
        let nb = 21;
        for &(transient, lm) in [(false, 3), (true, 3), (true, 1), (false, 0)].iter() {
            let flags = (0..nb).map(|i| (i % 3 == 0) as i32).collect::<Vec<_>>();
            let mut tf_enc = flags.clone();
            let mut enc = RangeEncoder::new(64);
            let select = tf_encode(0, nb, transient, &mut tf_enc, lm, true, &mut enc);
            enc.done();

            let mut tf_dec = vec![0; nb];
            let mut dec = RangeDecoder::new(enc.buffer());
            let decoded_select = tf_decode(0, nb, transient, &mut tf_dec, lm, &mut dec);
            assert_eq!(select, decoded_select);
            assert_eq!(tf_enc, tf_dec);
            let row = &TF_SELECT_TABLE[lm as usize];
            for (flag, tf) in flags.iter().zip(tf_dec.iter()) {
                let expect = row[4 * transient as usize + 2 * select as usize + *flag as usize];
                assert_eq!(*tf, i32::from(expect));
            }
        }
    }

    #[test]
    fn side_info_round_trips() {
        let mode = Mode::standard();
        let mut config = FrameConfig::new(mode).with_transient(true);
        config.spread = Spread::Light;
        config.alloc_trim = 7;
        config.dynalloc = (0..mode.nb_ebands).map(|i| (i % 4 == 1) as i32 * 2).collect();

        let mut enc = RangeEncoder::new(config.bytes_per_frame);
        let sent = code_side_info(mode, &config, &mut Coder::Encoder(&mut enc));
        enc.done();
        let mut dec = RangeDecoder::new(enc.buffer());
        let got = code_side_info(mode, &FrameConfig::new(mode), &mut Coder::Decoder(&mut dec));

        assert!(got.transient);
        assert_eq!(got.spread, Spread::Light);
        assert_eq!(got.alloc_trim, 7);
        assert_eq!(got.offsets, sent.offsets);
        assert_eq!(got.tf_res, sent.tf_res);
        assert!(sent.offsets[1] > 0 && sent.offsets[0] == 0);
    }
}
