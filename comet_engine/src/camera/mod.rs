/// Camera module - free-flying camera, main/detached container, GPU view data

pub mod camera;
pub mod view_data;

pub use camera::*;
pub use view_data::*;
