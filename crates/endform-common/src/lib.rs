#![doc = "Shared types for the end-forming machine HMI gateway."]

pub mod authoring;
pub mod bits;
pub mod config;
pub mod error;
pub mod io_map;
pub mod pattern;
pub mod program;
pub mod recipe;
pub mod state;
pub mod value;

pub use authoring::*;
pub use bits::*;
pub use config::*;
pub use error::*;
pub use io_map::*;
pub use pattern::*;
pub use program::*;
pub use recipe::*;
pub use state::*;
pub use value::*;
