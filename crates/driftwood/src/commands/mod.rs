pub mod resource;
pub mod state;
pub mod types;
