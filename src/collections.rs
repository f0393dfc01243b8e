mod collapse_mask;
mod window;

pub use collapse_mask::*;
pub use window::*;
