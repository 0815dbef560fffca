/// Resource module - tables with stable integer handles, built once at load

pub mod geometry;
pub mod material;
pub mod surface;
pub mod texture;
pub mod transform;
pub mod vertex;

pub use geometry::*;
pub use material::*;
pub use surface::*;
pub use texture::*;
pub use transform::*;
pub use vertex::*;
