/// Scene module - render-object lists, scene construction, dynamic objects

pub mod game_object;
pub mod render_container;
pub mod setup;

pub use game_object::*;
pub use render_container::*;
pub use setup::*;
