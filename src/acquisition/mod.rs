// src/acquisition/mod.rs
//! Channel registry, frame decoding, chunk assembly and annotations

pub mod annotations;
pub mod assembler;
pub mod channel;
pub mod chunk;
pub mod frame;

pub use annotations::{Annotation, AnnotationLog};
pub use assembler::{AssemblerStats, ChunkAssembler};
pub use channel::{ChannelFamily, ChannelId, ChannelLayout, WireType};
pub use chunk::{Chunk, Column};
pub use frame::{FrameError, SampleValue};
