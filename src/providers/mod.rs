//! Board occupancy providers

pub mod live;
pub mod replay;

pub use live::SerialProvider;
pub use replay::ReplayProvider;
