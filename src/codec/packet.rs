//! Serialized container for a run of coded frames.

use super::frame::FrameConfig;
use crate::error::{Error, Result};
use crate::mode::Mode;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// # Description
/// One range coded frame.
/// ## Comments
/// - `log_e` carries the band energies, which this crate does not quantize
/// - `final_range` lets a decoder check it stayed in sync with the encoder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub log_e: Vec<f32>,
    pub final_range: u32,
}

/// # Description
/// A mode, the configuration it was coded with, and the frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub sample_rate: i32,
    pub frame_size: i32,
    pub config: FrameConfig,
    pub frames: Vec<EncodedFrame>,
}

impl Packet {
    pub fn new(mode: &Mode, config: FrameConfig) -> Self {
        Self {
            sample_rate: mode.sample_rate,
            frame_size: mode.frame_size(mode.max_lm) as i32,
            config,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: EncodedFrame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// range coded bytes over every frame, energies excluded
    pub fn payload_bytes(&self) -> usize {
        self.frames.iter().map(|f| f.data.len()).sum()
    }

    /// # Description
    /// Rebuilds the mode the packet was coded with and checks the stored
    /// configuration against it.
    pub fn mode(&self) -> Result<Mode> {
        let mode = if self.sample_rate == 48_000 && self.frame_size == 960 {
            Mode::standard().clone()
        } else {
            Mode::custom(self.sample_rate, self.frame_size)?
        };
        self.config
            .validate(&mode)
            .map_err(|e| Error::Packet(format!("stored configuration rejected: {}", e)))?;
        Ok(mode)
    }

    pub fn save_to<Resource>(&self, res: Resource) -> Result<()>
    where
        Resource: Write,
    {
        bincode::serialize_into(res, self)?;
        Ok(())
    }

    /// # Description
    /// Reads a packet back and checks every frame carries
    /// `channels * nb_ebands` energies for the stored mode.
    pub fn load<Resource>(res: Resource) -> Result<Self>
    where
        Resource: Read,
    {
        let packet: Packet = bincode::deserialize_from(res)?;
        let expected = packet.config.channels * packet.mode()?.nb_ebands;
        if let Some(i) = packet.frames.iter().position(|f| f.log_e.len() != expected) {
            return Err(Error::Packet(format!(
                "frame {} carries {} energies, expected {}",
                i,
                packet.frames[i].log_e.len(),
                expected
            )));
        }
        Ok(packet)
    }
}
