//! Pyramid strategy: pure wave math plus the session state machine.

pub mod pyramid;
pub mod wave_math;

pub use pyramid::{
    AdjustRequest, AdjustableParams, PyramidSession, SessionParams, SessionSnapshot, Wave,
};
pub use wave_math::{price_precision, WaveMath, WaveQuote};
