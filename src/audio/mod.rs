pub mod buffer;
pub mod spectral;

pub use buffer::SampleBuffer;
