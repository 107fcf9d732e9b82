/*
    dragonfox

    src/bitstream/mod.rs

    Bit-level stream adaptors. Each adaptor borrows (or owns) an octet buffer and tracks only a
    small bit cursor - no heap state beyond the buffer itself (Design Note "Bit-stream
    abstraction").
*/
pub mod mfm;
pub mod tape;

pub use mfm::{MfmDecoder, MfmEncoder};
pub use tape::{TapeBitReader, TapeBitWriter};
