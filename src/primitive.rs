use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::utils::{Color, IntRect, Position, Rectangle};
use crate::viewport::SharedViewport;

/// Vertex layout shared by every widget drawable: 2D position, RGBA8 color
/// and a texture coordinate in atlas pixels (V may run past one page).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrimitiveVertex {
    pub position: [f32; 2],
    pub color: Color,
    pub texture_coordinate: [f32; 2],
}

impl PrimitiveVertex {
    pub fn new(position: Position, color: Color, texture_coordinate: Position) -> Self {
        Self {
            position: [position.x, position.y],
            color,
            texture_coordinate: [texture_coordinate.x, texture_coordinate.y],
        }
    }
}

/// What a custom draw callback gets to work with.
///
/// `viewport` is the pixel region the backend has already set up, cut to the
/// render target by the wgpu backend. `pass` is
/// the live render pass when drawing through wgpu and `None` for backends
/// that have no GPU behind them.
pub struct CustomDrawContext<'a, 'p> {
    pub viewport: IntRect,
    pub pass: Option<&'a mut wgpu::RenderPass<'p>>,
}

pub type CustomDrawCallback = Rc<dyn Fn(&mut CustomDrawContext<'_, '_>)>;

/// Smallest drawable unit handed from a widget to the renderer.
///
/// Geometry is fixed at construction. Only the visibility and synced flags
/// change afterwards, through `Cell`s, so the owning widget can keep an `Rc`
/// to it while the renderer holds the same `Rc` in its list.
pub struct Primitive {
    id: Uuid,
    vertices: Vec<PrimitiveVertex>,
    indices: Vec<u32>,
    position: Position,
    viewport: Option<SharedViewport>,
    custom_draw_callback: Option<CustomDrawCallback>,
    layer: i32,
    level: i32,
    visible: Cell<bool>,
    synced: Cell<bool>,
}

impl Primitive {
    pub fn new(vertices: Vec<PrimitiveVertex>, indices: Vec<u32>) -> Self {
        debug_assert!(
            indices.iter().all(|&i| (i as usize) < vertices.len()),
            "primitive index out of range"
        );
        Self {
            id: Uuid::new_v4(),
            vertices,
            indices,
            position: Position::default(),
            viewport: None,
            custom_draw_callback: None,
            layer: 0,
            level: 0,
            visible: Cell::new(true),
            synced: Cell::new(false),
        }
    }

    /// A primitive that hands drawing over to `callback` at its place in the
    /// draw order.
    pub fn custom_draw(callback: CustomDrawCallback) -> Self {
        let mut primitive = Self::new(Vec::new(), Vec::new());
        primitive.custom_draw_callback = Some(callback);
        primitive
    }

    /// Solid or textured axis aligned quad. `tex_rect` is in atlas pixels.
    pub fn quad(rect: Rectangle, color: Color, tex_rect: Rectangle) -> Self {
        let mut vertices = Vec::with_capacity(4);
        let mut indices = Vec::with_capacity(6);
        push_quad(&mut vertices, &mut indices, rect, color, tex_rect);
        Self::new(vertices, indices)
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_viewport(mut self, viewport: SharedViewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn vertices(&self) -> &[PrimitiveVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn viewport(&self) -> Option<&SharedViewport> {
        self.viewport.as_ref()
    }

    pub fn custom_draw_callback(&self) -> Option<&CustomDrawCallback> {
        self.custom_draw_callback.as_ref()
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn set_visible(&self, visible: bool) {
        if self.visible.replace(visible) != visible {
            self.invalidate();
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced.get()
    }

    pub fn set_synced(&self) {
        self.synced.set(true);
    }

    /// Flags the primitive so the next display recompiles.
    pub fn invalidate(&self) {
        self.synced.set(false);
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("id", &self.id)
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .field("position", &self.position)
            .field("viewport", &self.viewport)
            .field("custom_draw", &self.custom_draw_callback.is_some())
            .field("layer", &self.layer)
            .field("level", &self.level)
            .field("visible", &self.visible.get())
            .field("synced", &self.synced.get())
            .finish()
    }
}

/// Appends a two-triangle quad. Indices are local to `vertices`.
pub fn push_quad(
    vertices: &mut Vec<PrimitiveVertex>,
    indices: &mut Vec<u32>,
    rect: Rectangle,
    color: Color,
    tex_rect: Rectangle,
) {
    let base = vertices.len() as u32;
    let corners = [
        (rect.x, rect.y, tex_rect.x, tex_rect.y),
        (rect.x, rect.bottom(), tex_rect.x, tex_rect.bottom()),
        (rect.right(), rect.y, tex_rect.right(), tex_rect.y),
        (rect.right(), rect.bottom(), tex_rect.right(), tex_rect.bottom()),
    ];
    for (x, y, u, v) in corners {
        vertices.push(PrimitiveVertex::new(
            Position::new(x, y),
            color,
            Position::new(u, v),
        ));
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
}
