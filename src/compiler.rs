use std::rc::Rc;

use log::{trace, warn};

use crate::batch::{Batch, CustomDrawBatch, GeometryBatch};
use crate::primitive::Primitive;
use crate::texture_atlas::AtlasLayout;
use crate::utils::{Bounds, Position, Rectangle, Size};
use crate::viewport::SharedViewport;

/// Frame-level inputs of a compile pass.
#[derive(Debug, Clone, Copy)]
pub struct CompileParams<'a> {
    pub window_size: Size,
    pub default_viewport: &'a SharedViewport,
    /// Default viewports from before a resize. Primitives holding one of
    /// these exact `Rc`s are drawn with the current default.
    pub retired_default_viewports: &'a [SharedViewport],
    pub cull: bool,
}

impl CompileParams<'_> {
    /// The viewport a primitive is actually drawn with.
    pub fn effective_viewport<'v>(
        &'v self,
        viewport: Option<&'v SharedViewport>,
    ) -> &'v SharedViewport {
        match viewport {
            Some(viewport)
                if !self
                    .retired_default_viewports
                    .iter()
                    .any(|retired| Rc::ptr_eq(retired, viewport)) =>
            {
                viewport
            }
            _ => self.default_viewport,
        }
    }
}

/// Flat vertex arrays plus the batches that draw them.
///
/// `positions`, `colors` and `tex_coords` are index aligned. Geometry batches
/// address ranges of `indices`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFrame {
    pub positions: Vec<[f32; 2]>,
    pub colors: Vec<[u8; 4]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub batches: Vec<Batch>,
}

impl CompiledFrame {
    pub fn with_capacity(vertices: usize, indices: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertices),
            colors: Vec::with_capacity(vertices),
            tex_coords: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(indices),
            batches: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn geometry_batches(&self) -> impl Iterator<Item = &GeometryBatch> {
        self.batches.iter().filter_map(Batch::as_geometry)
    }

    fn truncate_vertices(&mut self, len: usize) {
        self.positions.truncate(len);
        self.colors.truncate(len);
        self.tex_coords.truncate(len);
    }
}

/// Compiles `primitives` into one frame, in order.
///
/// Every primitive is marked synced, visible or not. Consecutive primitives
/// share a batch while both their viewport and their atlas page stay the
/// same; custom draw primitives always sit in a batch of their own with the
/// geometry before and after them split around it. The returned batch list
/// always ends with the batch that was open when the pass finished, so it is
/// never empty.
pub fn compile(
    primitives: &[Rc<Primitive>],
    params: &CompileParams<'_>,
    atlas: &AtlasLayout,
) -> CompiledFrame {
    let (vertex_total, index_total) = primitives
        .iter()
        .filter(|p| p.is_visible())
        .fold((0, 0), |(v, i), p| (v + p.vertices().len(), i + p.indices().len()));

    let mut frame = CompiledFrame::with_capacity(vertex_total, index_total);

    let default_viewport = params.default_viewport;
    let window_rect = Rectangle::from_pos_size(Position::default(), params.window_size);

    let mut vertex_count: u32 = 0;
    let mut index_count: u32 = 0;
    let mut current = GeometryBatch::open(default_viewport.clone(), 0, 0, 0);
    let mut missing_page_reported = false;

    for primitive in primitives {
        primitive.set_synced();

        if !primitive.is_visible() {
            continue;
        }

        let viewport = params.effective_viewport(primitive.viewport());
        let mut offset = primitive.position();
        let mut active_rect = window_rect;

        if **viewport != **default_viewport {
            offset += viewport.offset();
            active_rect = viewport.destination_rect();
        }

        if let Some(callback) = primitive.custom_draw_callback() {
            let next = GeometryBatch::open(
                default_viewport.clone(),
                current.atlas_page,
                index_count,
                vertex_count,
            );
            close_batch(&mut frame.batches, std::mem::replace(&mut current, next), vertex_count);
            frame.batches.push(Batch::CustomDraw(CustomDrawBatch {
                viewport: viewport.clone(),
                callback: callback.clone(),
            }));
            continue;
        }

        let vertices_before = frame.positions.len();
        let (mut mapping, _) = atlas.map(0.0);
        let mut bounds: Option<Bounds> = None;

        for (index, vertex) in primitive.vertices().iter().enumerate() {
            let position = Position::new(
                vertex.position[0] + offset.x,
                vertex.position[1] + offset.y,
            );

            frame.positions.push([position.x, position.y]);
            frame.colors.push(vertex.color.to_array());

            // The bound page can only change between triangles.
            if index % 3 == 0 {
                let (resolved, known) = atlas.map(vertex.texture_coordinate[1]);
                if !known && !missing_page_reported {
                    warn!(
                        "texture coordinate {:?} addresses atlas page {} of {}, using default page size",
                        vertex.texture_coordinate,
                        resolved.page,
                        atlas.page_count()
                    );
                    missing_page_reported = true;
                }
                mapping = resolved;
            }

            frame.tex_coords.push(mapping.normalize(vertex.texture_coordinate));

            if params.cull {
                match bounds.as_mut() {
                    Some(bounds) => bounds.include(position),
                    None => bounds = Some(Bounds::from_point(position)),
                }
            }
        }

        if params.cull {
            let on_screen = bounds.is_some_and(|b| b.to_rect().intersects(&active_rect));
            if !on_screen {
                trace!("culled primitive {} outside {:?}", primitive.id(), active_rect);
                frame.truncate_vertices(vertices_before);
                continue;
            }
        }

        let atlas_page = mapping.page;
        frame
            .indices
            .extend(primitive.indices().iter().map(|&index| vertex_count + index));

        if **viewport != *current.viewport || atlas_page != current.atlas_page {
            let next = GeometryBatch::open(viewport.clone(), atlas_page, index_count, vertex_count);
            close_batch(&mut frame.batches, std::mem::replace(&mut current, next), vertex_count);
        }

        let primitive_indices = primitive.indices().len() as u32;
        current.index_count += primitive_indices;
        vertex_count += primitive.vertices().len() as u32;
        index_count += primitive_indices;
    }

    close_batch(&mut frame.batches, current, vertex_count);

    frame
}

fn close_batch(batches: &mut Vec<Batch>, mut batch: GeometryBatch, vertex_count: u32) {
    batch.max_index = vertex_count.saturating_sub(1).max(batch.min_index);
    batches.push(Batch::Geometry(batch));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Color;
    use crate::viewport::Viewport;

    fn params(viewport: &SharedViewport, cull: bool) -> CompileParams<'_> {
        CompileParams {
            window_size: Size::new(800.0, 600.0),
            default_viewport: viewport,
            retired_default_viewports: &[],
            cull,
        }
    }

    #[test]
    fn invisible_primitives_are_synced_but_skipped() {
        let default_viewport = Viewport::window(Size::new(800.0, 600.0)).shared();
        let hidden = Rc::new(Primitive::quad(
            Rectangle::new(0.0, 0.0, 10.0, 10.0),
            Color::WHITE,
            Rectangle::default(),
        ));
        hidden.set_visible(false);

        let frame = compile(
            &[hidden.clone()],
            &params(&default_viewport, false),
            &AtlasLayout::default(),
        );

        assert!(hidden.is_synced());
        assert_eq!(frame.vertex_count(), 0);
        assert_eq!(frame.batches.len(), 1);
    }

    #[test]
    fn custom_viewport_translates_vertices() {
        let default_viewport = Viewport::window(Size::new(800.0, 600.0)).shared();
        let scrolled = Viewport::new(
            Position::new(0.0, 100.0),
            Position::new(20.0, 20.0),
            Size::new(200.0, 200.0),
        )
        .shared();
        let primitive = Rc::new(
            Primitive::quad(
                Rectangle::new(0.0, 100.0, 10.0, 10.0),
                Color::WHITE,
                Rectangle::default(),
            )
            .with_position(Position::new(5.0, 0.0))
            .with_viewport(scrolled.clone()),
        );

        let frame = compile(
            &[primitive],
            &params(&default_viewport, false),
            &AtlasLayout::default(),
        );

        assert_eq!(frame.positions[0], [25.0, 20.0]);
        let last = frame.batches.last().and_then(Batch::as_geometry).map(|b| &b.viewport);
        assert_eq!(last, Some(&scrolled));
    }

    #[test]
    fn max_index_tracks_vertex_high_water_mark() {
        let default_viewport = Viewport::window(Size::new(800.0, 600.0)).shared();
        let quads: Vec<_> = (0..3)
            .map(|i| {
                Rc::new(Primitive::quad(
                    Rectangle::new(i as f32 * 10.0, 0.0, 10.0, 10.0),
                    Color::WHITE,
                    Rectangle::default(),
                ))
            })
            .collect();

        let frame = compile(&quads, &params(&default_viewport, false), &AtlasLayout::default());
        let batch = frame.batches[0].as_geometry().cloned().unwrap();
        assert_eq!(batch.min_index, 0);
        assert_eq!(batch.max_index, 11);
        assert_eq!(batch.index_range(), 0..18);
    }
}
