// Data structures for KashiFind

pub mod song;
pub mod video;

pub use song::*;
pub use video::*;
