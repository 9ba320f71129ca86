//! Jewel Viewer - interactive PBR jewellery viewer
//!
//! Shows a procedural ring or a dropped/opened/downloaded glTF model with:
//! - gold, rose gold, platinum or custom-colour metal materials
//! - four HDRI lighting environments
//! - five camera presets plus free orbit, pan and zoom
//! - double-resolution PNG screenshots
//!
//! Rendering happens on the CPU into an HDR framebuffer that egui displays.

mod app;
mod assets;
mod config;
mod render;
mod scene;
mod session;
mod ui;

fn main() {
    app::run();
}
