use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use uuid::Uuid;
use winit::dpi::PhysicalSize;

use crate::batch::Batch;
use crate::compiler::{compile, CompileParams, CompiledFrame};
use crate::config::RendererConfig;
use crate::primitive::{CustomDrawCallback, Primitive};
use crate::texture_atlas::AtlasLayout;
use crate::utils::{IntRect, Size};
use crate::viewport::{SharedViewport, Viewport};

/// GPU state the display loop drives. Implemented by the wgpu backend and by
/// [`crate::recording::RecordingBackend`].
pub trait RenderBackend {
    /// Makes `frame` the vertex data for subsequent draws. Every compile of
    /// every renderer gets its own `revision`, so a backend can skip
    /// re-uploading exactly the frame it already holds.
    fn upload(&mut self, frame: &CompiledFrame, revision: u64);

    /// Fragments with alpha at or below `threshold` are discarded; 0 turns
    /// the test off.
    fn set_alpha_threshold(&mut self, threshold: f32);

    fn set_viewport(&mut self, rect: IntRect);

    fn set_scissor(&mut self, rect: IntRect);

    /// Scissoring back to the whole target.
    fn reset_scissor(&mut self);

    fn bind_atlas_page(&mut self, page: usize);

    /// One indexed triangle list draw over `indices` of the uploaded index
    /// array.
    fn draw_indexed(&mut self, indices: Range<u32>);

    /// Runs `callback` once with `viewport` already applied.
    fn custom_draw(&mut self, callback: &CustomDrawCallback, viewport: IntRect);
}

/// Batching renderer over an ordered list of widget primitives.
///
/// Primitives are kept sorted by `(layer, level)`, ties in insertion order.
/// The compiled frame is rebuilt lazily, on the first `refresh` or `display`
/// after anything it depends on changed.
pub struct VertexArrayRenderer {
    primitives: Vec<Rc<Primitive>>,
    atlas: AtlasLayout,
    window_size: PhysicalSize<u32>,
    default_viewport: SharedViewport,
    // Earlier default viewports still referenced by primitives.
    retired_default_viewports: Vec<SharedViewport>,
    frame: CompiledFrame,
    revision: u64,
    alpha_threshold: f32,
    cull: bool,
    dirty: bool,
}

impl VertexArrayRenderer {
    pub const NAME: &'static str = "Vertex Array Renderer";

    pub fn new(window_size: PhysicalSize<u32>) -> Self {
        Self {
            primitives: Vec::new(),
            atlas: AtlasLayout::default(),
            window_size,
            default_viewport: Viewport::window(to_size(window_size)).shared(),
            retired_default_viewports: Vec::new(),
            frame: CompiledFrame::default(),
            revision: 0,
            alpha_threshold: 0.0,
            cull: false,
            dirty: true,
        }
    }

    pub fn with_config(config: &RendererConfig, window_size: PhysicalSize<u32>) -> Self {
        let side = config.max_texture_size as f32;
        let mut renderer = Self::new(window_size);
        renderer.atlas = AtlasLayout::new(config.max_texture_size, Size::new(side, side));
        renderer.tune_cull(config.cull);
        renderer.tune_alpha_threshold(config.alpha_threshold);
        renderer
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    /* PRIMITIVES */

    pub fn add_primitive(&mut self, primitive: Primitive) -> Rc<Primitive> {
        let primitive = Rc::new(primitive);
        self.add_shared_primitive(primitive.clone());
        primitive
    }

    pub fn add_shared_primitive(&mut self, primitive: Rc<Primitive>) {
        let key = (primitive.layer(), primitive.level());
        let at = self
            .primitives
            .partition_point(|p| (p.layer(), p.level()) <= key);
        self.primitives.insert(at, primitive);
        self.dirty = true;
    }

    pub fn remove_primitive(&mut self, id: Uuid) -> bool {
        let before = self.primitives.len();
        self.primitives.retain(|p| p.id() != id);
        let removed = self.primitives.len() != before;
        self.dirty |= removed;
        removed
    }

    /// Swaps a widget's old drawable for a new one. When `old` is not in the
    /// list the new primitive is simply added.
    pub fn replace_primitive(&mut self, old: Uuid, primitive: Primitive) -> Rc<Primitive> {
        self.remove_primitive(old);
        self.add_primitive(primitive)
    }

    pub fn clear_primitives(&mut self) {
        self.primitives.clear();
        self.dirty = true;
    }

    pub fn primitives(&self) -> &[Rc<Primitive>] {
        &self.primitives
    }

    /* FRAME STATE */

    pub fn set_window_size(&mut self, window_size: PhysicalSize<u32>) {
        if window_size == self.window_size {
            return;
        }
        self.window_size = window_size;
        let previous = std::mem::replace(
            &mut self.default_viewport,
            Viewport::window(to_size(window_size)).shared(),
        );

        // Primitives handed the old default keep following the window.
        self.retired_default_viewports
            .retain(|viewport| Rc::strong_count(viewport) > 1);
        if Rc::strong_count(&previous) > 1 {
            self.retired_default_viewports.push(previous);
        }
        self.dirty = true;
    }

    pub fn window_size(&self) -> PhysicalSize<u32> {
        self.window_size
    }

    /// Viewport covering the whole window. Primitives given this viewport
    /// keep covering the whole window across resizes.
    pub fn default_viewport(&self) -> &SharedViewport {
        &self.default_viewport
    }

    pub fn atlas(&self) -> &AtlasLayout {
        &self.atlas
    }

    /// Mutable access to the atlas layout; the next display recompiles.
    pub fn atlas_mut(&mut self) -> &mut AtlasLayout {
        self.dirty = true;
        &mut self.atlas
    }

    pub fn set_atlas(&mut self, atlas: AtlasLayout) {
        self.atlas = atlas;
        self.dirty = true;
    }

    /* TUNING */

    pub fn tune_cull(&mut self, enable: bool) {
        if self.cull != enable {
            self.cull = enable;
            self.dirty = true;
        }
    }

    pub fn tune_alpha_threshold(&mut self, alpha_threshold: f32) {
        self.alpha_threshold = alpha_threshold.clamp(0.0, 1.0);
    }

    pub fn is_cull_enabled(&self) -> bool {
        self.cull
    }

    pub fn alpha_threshold(&self) -> f32 {
        self.alpha_threshold
    }

    /* COMPILATION */

    /// Forces a recompile on the next refresh or display.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn needs_refresh(&self) -> bool {
        self.dirty || self.primitives.iter().any(|p| !p.is_synced())
    }

    /// Recompiles the frame if anything changed. Returns whether it did.
    pub fn refresh(&mut self) -> bool {
        if !self.needs_refresh() {
            return false;
        }

        let params = CompileParams {
            window_size: to_size(self.window_size),
            default_viewport: &self.default_viewport,
            retired_default_viewports: &self.retired_default_viewports,
            cull: self.cull,
        };
        self.frame = compile(&self.primitives, &params, &self.atlas);
        self.revision = next_revision();
        self.dirty = false;

        debug!(
            "compiled {} primitives into {} vertices, {} indices, {} batches",
            self.primitives.len(),
            self.frame.vertex_count(),
            self.frame.index_count(),
            self.frame.batches.len()
        );
        true
    }

    pub fn frame(&self) -> &CompiledFrame {
        &self.frame
    }

    /// Identifies the current compiled frame. Changes with every compile and
    /// is never shared with another renderer. 0 before the first compile.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /* DISPLAY */

    /// Submits the frame to `backend`, recompiling first when dirty.
    pub fn display(&mut self, backend: &mut dyn RenderBackend) {
        self.refresh();
        backend.upload(&self.frame, self.revision);

        let alpha_test = self.alpha_threshold > 0.0;
        if alpha_test {
            backend.set_alpha_threshold(self.alpha_threshold);
        }

        let window = IntRect::new(0, 0, self.window_size.width, self.window_size.height);
        let mut current_page = 0;
        backend.bind_atlas_page(current_page);

        for batch in &self.frame.batches {
            match batch {
                Batch::CustomDraw(custom) => {
                    let region = IntRect::from_rect(custom.viewport.destination_rect());
                    if region.is_empty() {
                        continue;
                    }
                    backend.set_viewport(region);
                    backend.custom_draw(&custom.callback, region);
                    backend.set_viewport(window);
                    backend.bind_atlas_page(current_page);
                }
                Batch::Geometry(geometry) => {
                    let scissor = if *geometry.viewport != *self.default_viewport {
                        IntRect::from_rect(geometry.viewport.destination_rect())
                    } else {
                        window
                    };
                    backend.set_scissor(scissor);

                    if geometry.is_empty() {
                        continue;
                    }

                    if geometry.atlas_page != current_page {
                        current_page = geometry.atlas_page;
                        backend.bind_atlas_page(current_page);
                    }
                    backend.draw_indexed(geometry.index_range());
                }
            }
        }

        backend.reset_scissor();

        if alpha_test {
            backend.set_alpha_threshold(0.0);
        }
    }
}

fn next_revision() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

fn to_size(size: PhysicalSize<u32>) -> Size {
    Size::new(size.width as f32, size.height as f32)
}
