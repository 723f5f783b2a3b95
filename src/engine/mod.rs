//! Render orchestration: configuration, dispatch planning, the renderer and
//! its pass loop.

mod config;
mod dispatch;
mod renderer;
mod stats;

pub use config::RenderConfig;
pub use dispatch::split_dispatch;
pub use renderer::Renderer;
pub use stats::{run, ProgressSink, Statistics, TracingSink};
