pub mod client;
pub mod config;
pub mod cost;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod io;
pub mod map_render;
pub mod roughness_join;
pub mod segment_state;
pub mod server;
pub mod services;
pub mod state;
pub mod store;
pub mod track;
