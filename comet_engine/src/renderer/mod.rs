/// Renderer module - backend trait, GPU command types, state tracking,
/// culling math shared between the GPU shaders, the legacy backend and tests

pub mod cull;
pub mod indirect;
pub mod interface;
pub mod state;

pub use cull::*;
pub use indirect::*;
pub use interface::*;
pub use state::*;
