pub mod config;
pub mod drag;
pub mod item;
pub mod tree;
pub mod visible;

pub use config::*;
pub use drag::*;
pub use item::*;
pub use tree::*;
pub use visible::*;
