//! Entropy coding and quantization core of a CELT-style transform codec:
//! a range coder, the combinatorial pulse codebook, pyramid vector
//! quantization, the band bit allocator and the band quantizer, tied
//! together by a frame layer and a serialized packet container.

pub mod codec;
pub mod collections;
pub mod error;
pub mod math;
pub mod mode;
pub mod range;

pub use codec::{
    frame::{tf_decode, tf_encode, DecodedFrame, FrameConfig, FrameDecoder, FrameEncoder, FrameInfo},
    packet::{EncodedFrame, Packet},
    vq::Spread,
};
pub use error::{Error, Result};
pub use mode::Mode;
pub use range::{Coder, RangeDecoder, RangeEncoder};
