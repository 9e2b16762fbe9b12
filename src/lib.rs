//! Batching 2D renderer for widget toolkits.
//!
//! Widgets describe what they draw as [`Primitive`]s. The
//! [`VertexArrayRenderer`] compiles them into one set of vertex arrays,
//! split into batches wherever the viewport, the atlas page or a custom
//! draw callback changes, and replays those batches on a [`RenderBackend`].

pub mod batch;
pub mod compiler;
pub mod config;
pub mod error;
pub mod primitive;
pub mod recording;
pub mod renderer;
pub mod rich_text;
pub mod texture_atlas;
pub mod utils;
pub mod viewport;
pub mod wgpu_backend;

pub use batch::{Batch, CustomDrawBatch, GeometryBatch};
pub use compiler::{compile, CompileParams, CompiledFrame};
pub use config::RendererConfig;
pub use error::{RendererError, Result};
pub use primitive::{CustomDrawCallback, CustomDrawContext, Primitive, PrimitiveVertex};
pub use recording::{BackendCall, RecordingBackend};
pub use renderer::{RenderBackend, VertexArrayRenderer};
pub use rich_text::{RichLine, RichText, TextStyle, TextStyleFlags};
pub use texture_atlas::AtlasLayout;
pub use viewport::{SharedViewport, Viewport};
pub use wgpu_backend::{WgpuFrame, WgpuRenderer};
