/// # Description
/// Per band, per channel collapse bits. Bit `k` of an entry is set when
/// short block `k` of the band received nonzero quantized energy.
/// ## Comments
/// - laid out band major, entry `band * channels + channel`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollapseMasks {
    channels: usize,
    masks: Vec<u8>,
}

impl CollapseMasks {
    pub fn new(bands: usize, channels: usize) -> Self {
        Self {
            channels,
            masks: vec![0; bands * channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn bands(&self) -> usize {
        self.masks.len() / self.channels.max(1)
    }

    #[inline]
    pub fn get(&self, band: usize, channel: usize) -> u8 {
        self.masks[band * self.channels + channel]
    }

    #[inline]
    pub fn set(&mut self, band: usize, channel: usize, mask: u32) {
        self.masks[band * self.channels + channel] = mask as u8;
    }

    /// union of every channel's bits for `band`
    pub fn union(&self, band: usize) -> u32 {
        (0..self.channels).fold(0, |acc, c| acc | u32::from(self.get(band, c)))
    }

    pub fn clear(&mut self) {
        self.masks.iter_mut().for_each(|m| *m = 0);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.masks
    }
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn sanity() {
        let mut masks = CollapseMasks::new(4, 2);
        assert_eq!(masks.bands(), 4);
        masks.set(2, 0, 0b0101);
        masks.set(2, 1, 0b1000);
        assert_eq!(masks.get(2, 0), 0b0101);
        assert_eq!(masks.union(2), 0b1101);
        assert_eq!(masks.union(1), 0);
        masks.clear();
        assert!(masks.as_slice().iter().all(|&m| m == 0));
    }
}
