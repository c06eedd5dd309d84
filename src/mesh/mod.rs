pub mod assembler;

pub use assembler::{assemble, AssembledGeometry, AssembledPrimitive};
