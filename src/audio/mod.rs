pub mod resample;

pub use resample::MonoResampler;
