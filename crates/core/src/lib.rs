pub mod detection;
pub mod emotion;
pub mod pipeline;
pub mod shared;
pub mod video;
