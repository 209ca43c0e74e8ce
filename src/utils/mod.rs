pub mod checksum;
pub mod duration;

pub use checksum::Checksum;
pub use duration::parse_duration;
