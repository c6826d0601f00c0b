// Engine module - floor plate scene: geometry, textures, rig and rendering

pub mod camera;
pub mod components;
pub mod config;
pub mod debug_overlay;
pub mod geometry;
pub mod input;
pub mod interaction;
pub mod lights;
pub mod mesh;
pub mod palette;
pub mod picking;
pub mod renderer;
pub mod rig;
pub mod surface;
pub mod systems;
pub mod texture;

// Re-export commonly used items
pub use components::*;
