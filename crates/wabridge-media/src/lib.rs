pub mod mime;
pub mod ogg;

pub use mime::classify_media_path;
pub use ogg::{analyze_ogg_opus, OggError, OpusAnalysis};
