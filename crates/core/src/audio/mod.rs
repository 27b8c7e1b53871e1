//! Signal-level building blocks: I/O, loudness, reverberation, mixing.

pub mod io;
pub mod loudness;
pub mod mix;
pub mod reverb;
