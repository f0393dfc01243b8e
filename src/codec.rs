pub mod bands;
pub mod cwrs;
pub mod frame;
pub mod packet;
pub mod rate;
pub mod vq;

pub use frame::*;
pub use packet::*;
