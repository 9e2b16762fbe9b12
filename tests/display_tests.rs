use std::cell::Cell;
use std::rc::Rc;

use plutonium_vertex_array::primitive::{CustomDrawCallback, CustomDrawContext, Primitive};
use plutonium_vertex_array::recording::{BackendCall, RecordingBackend};
use plutonium_vertex_array::renderer::VertexArrayRenderer;
use plutonium_vertex_array::texture_atlas::AtlasLayout;
use plutonium_vertex_array::utils::{Color, IntRect, Position, Rectangle, Size};
use plutonium_vertex_array::viewport::Viewport;
use winit::dpi::PhysicalSize;

const WINDOW: IntRect = IntRect {
    x: 0,
    y: 0,
    width: 800,
    height: 600,
};

fn renderer() -> VertexArrayRenderer {
    let _ = env_logger::builder().is_test(true).try_init();
    VertexArrayRenderer::new(PhysicalSize::new(800, 600))
}

fn quad(x: f32, tex_y: f32) -> Primitive {
    Primitive::quad(
        Rectangle::new(x, 0.0, 10.0, 10.0),
        Color::WHITE,
        Rectangle::new(0.0, tex_y, 10.0, 10.0),
    )
}

fn callback(f: impl Fn(&mut CustomDrawContext<'_, '_>) + 'static) -> CustomDrawCallback {
    Rc::new(f)
}

#[test]
fn renderer_reports_its_name() {
    assert_eq!(renderer().name(), "Vertex Array Renderer");
}

#[test]
fn empty_renderer_draws_nothing() {
    let mut renderer = renderer();
    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    assert_eq!(
        backend.calls(),
        &[
            BackendCall::Upload {
                vertices: 0,
                indices: 0
            },
            BackendCall::BindPage(0),
            BackendCall::Scissor(WINDOW),
            BackendCall::ResetScissor,
        ]
    );
}

#[test]
fn one_draw_per_batch() {
    let mut renderer = renderer();
    renderer.add_primitive(quad(0.0, 0.0));
    renderer.add_primitive(quad(20.0, 0.0));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    assert_eq!(
        backend.calls(),
        &[
            BackendCall::Upload {
                vertices: 8,
                indices: 12
            },
            BackendCall::BindPage(0),
            BackendCall::Scissor(WINDOW),
            BackendCall::Draw(0..12),
            BackendCall::ResetScissor,
        ]
    );
}

#[test]
fn atlas_page_is_bound_only_when_it_changes() {
    let mut renderer = renderer();
    let mut atlas = AtlasLayout::new(256, Size::new(256.0, 256.0));
    atlas.push_page(Size::new(256.0, 256.0)).unwrap();
    renderer.set_atlas(atlas);

    renderer.add_primitive(quad(0.0, 0.0));
    renderer.add_primitive(quad(20.0, 300.0));
    renderer.add_primitive(quad(40.0, 300.0).with_viewport(
        Viewport::new(Position::default(), Position::new(0.0, 0.0), Size::new(100.0, 100.0)).shared(),
    ));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    let binds: Vec<_> = backend
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::BindPage(_)))
        .collect();
    assert_eq!(binds, [&BackendCall::BindPage(0), &BackendCall::BindPage(1)]);
    assert_eq!(
        backend.draw_calls().cloned().collect::<Vec<_>>(),
        [0..6, 6..12, 12..18]
    );
}

#[test]
fn viewport_batches_scissor_to_destination_rect() {
    let mut renderer = renderer();
    let panel = Viewport::new(
        Position::new(0.0, 40.0),
        Position::new(100.0, 50.0),
        Size::new(200.0, 150.0),
    )
    .shared();
    renderer.add_primitive(quad(0.0, 0.0).with_viewport(panel));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    let scissors: Vec<_> = backend
        .calls()
        .iter()
        .filter_map(|call| match call {
            BackendCall::Scissor(rect) => Some(*rect),
            _ => None,
        })
        .collect();
    assert_eq!(scissors, [WINDOW, IntRect::new(100, 50, 200, 150)]);
}

#[test]
fn custom_draw_runs_once_inside_its_viewport() {
    let mut renderer = renderer();
    let hits = Rc::new(Cell::new(0));
    let seen = Rc::new(Cell::new(IntRect::default()));
    let (counter, region) = (hits.clone(), seen.clone());
    let draw = callback(move |context| {
        counter.set(counter.get() + 1);
        region.set(context.viewport);
        assert!(context.pass.is_none());
    });
    let overlay = Viewport::new(
        Position::default(),
        Position::new(10.0, 20.0),
        Size::new(30.0, 40.0),
    )
    .shared();

    renderer.add_primitive(quad(0.0, 0.0));
    renderer.add_primitive(Primitive::custom_draw(draw).with_viewport(overlay));
    renderer.add_primitive(quad(20.0, 0.0));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    let region = IntRect::new(10, 20, 30, 40);
    assert_eq!(hits.get(), 1);
    assert_eq!(seen.get(), region);
    assert_eq!(
        backend.calls(),
        &[
            BackendCall::Upload {
                vertices: 8,
                indices: 12
            },
            BackendCall::BindPage(0),
            BackendCall::Scissor(WINDOW),
            BackendCall::Draw(0..6),
            BackendCall::Viewport(region),
            BackendCall::CustomDraw(region),
            BackendCall::Viewport(WINDOW),
            BackendCall::BindPage(0),
            BackendCall::Scissor(WINDOW),
            BackendCall::Draw(6..12),
            BackendCall::ResetScissor,
        ]
    );
}

#[test]
fn alpha_threshold_is_reset_after_display() {
    let mut renderer = renderer();
    renderer.tune_alpha_threshold(0.5);
    renderer.add_primitive(quad(0.0, 0.0));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    let calls = backend.calls();
    assert_eq!(calls[1], BackendCall::AlphaThreshold(0.5));
    assert_eq!(calls.last(), Some(&BackendCall::AlphaThreshold(0.0)));
}

#[test]
fn zero_alpha_threshold_is_never_sent() {
    let mut renderer = renderer();
    renderer.add_primitive(quad(0.0, 0.0));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, BackendCall::AlphaThreshold(_))));
}

#[test]
fn custom_draw_with_empty_viewport_is_skipped() {
    let mut renderer = renderer();
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    let collapsed = Viewport::new(Position::default(), Position::new(10.0, 10.0), Size::new(0.0, 40.0))
        .shared();

    renderer.add_primitive(quad(0.0, 0.0));
    renderer.add_primitive(
        Primitive::custom_draw(callback(move |_| counter.set(counter.get() + 1)))
            .with_viewport(collapsed),
    );
    renderer.add_primitive(quad(20.0, 0.0));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    assert_eq!(hits.get(), 0);
    assert_eq!(
        backend.calls(),
        &[
            BackendCall::Upload {
                vertices: 8,
                indices: 12
            },
            BackendCall::BindPage(0),
            BackendCall::Scissor(WINDOW),
            BackendCall::Draw(0..6),
            BackendCall::Scissor(WINDOW),
            BackendCall::Draw(6..12),
            BackendCall::ResetScissor,
        ]
    );
}

#[test]
fn alpha_threshold_is_clamped() {
    let mut renderer = renderer();
    renderer.tune_alpha_threshold(3.0);
    assert_eq!(renderer.alpha_threshold(), 1.0);
    renderer.tune_alpha_threshold(-1.0);
    assert_eq!(renderer.alpha_threshold(), 0.0);
}

#[test]
fn clean_renderer_skips_recompile_and_upload() {
    let mut renderer = renderer();
    let primitive = renderer.add_primitive(quad(0.0, 0.0));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);
    let revision = renderer.revision();
    assert!(!renderer.needs_refresh());

    backend.take_calls();
    renderer.display(&mut backend);
    assert_eq!(renderer.revision(), revision);
    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, BackendCall::Upload { .. })));

    primitive.set_visible(false);
    assert!(renderer.needs_refresh());
    renderer.display(&mut backend);
    assert_ne!(renderer.revision(), revision);
    assert!(backend.calls().contains(&BackendCall::Upload {
        vertices: 0,
        indices: 0
    }));
}

#[test]
fn tuning_cull_marks_renderer_dirty() {
    let mut renderer = renderer();
    renderer.refresh();
    assert!(!renderer.needs_refresh());

    renderer.tune_cull(false);
    assert!(!renderer.needs_refresh(), "same value changes nothing");
    renderer.tune_cull(true);
    assert!(renderer.needs_refresh());
    assert!(renderer.refresh());
    assert!(!renderer.refresh());
}

#[test]
fn window_resize_rebuilds_default_viewport() {
    let mut renderer = renderer();
    renderer.refresh();
    renderer.set_window_size(PhysicalSize::new(1024, 768));
    assert!(renderer.needs_refresh());
    assert_eq!(renderer.default_viewport().size(), Size::new(1024.0, 768.0));

    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);
    assert!(backend
        .calls()
        .contains(&BackendCall::Scissor(IntRect::new(0, 0, 1024, 768))));
}

#[test]
fn primitives_are_ordered_by_layer_then_level() {
    let mut renderer = renderer();
    let top = renderer.add_primitive(quad(0.0, 0.0).with_layer(1));
    let bottom = renderer.add_primitive(quad(0.0, 0.0));
    let below_top = renderer.add_primitive(quad(0.0, 0.0).with_layer(1).with_level(-1));
    let second_bottom = renderer.add_primitive(quad(0.0, 0.0));

    let order: Vec<_> = renderer.primitives().iter().map(|p| p.id()).collect();
    assert_eq!(
        order,
        [bottom.id(), second_bottom.id(), below_top.id(), top.id()]
    );
}

#[test]
fn removing_and_replacing_primitives() {
    let mut renderer = renderer();
    let first = renderer.add_primitive(quad(0.0, 0.0));
    renderer.refresh();

    let replacement = renderer.replace_primitive(first.id(), quad(50.0, 0.0));
    assert!(renderer.needs_refresh());
    assert_eq!(renderer.primitives().len(), 1);
    assert!(!renderer.remove_primitive(first.id()));
    assert!(renderer.remove_primitive(replacement.id()));

    renderer.add_primitive(quad(0.0, 0.0));
    renderer.clear_primitives();
    assert!(renderer.primitives().is_empty());
}

#[test]
fn renderers_sharing_a_backend_each_upload_their_frame() {
    let mut first = renderer();
    first.add_primitive(quad(0.0, 0.0));
    let mut second = renderer();
    for x in [0.0, 20.0, 40.0] {
        second.add_primitive(quad(x, 0.0));
    }

    let mut backend = RecordingBackend::new();
    first.display(&mut backend);
    backend.take_calls();
    second.display(&mut backend);

    assert_ne!(first.revision(), second.revision());
    assert_eq!(
        backend.calls()[0],
        BackendCall::Upload {
            vertices: 12,
            indices: 18
        }
    );

    backend.take_calls();
    first.display(&mut backend);
    assert!(backend.calls().contains(&BackendCall::Upload {
        vertices: 4,
        indices: 6
    }));
}

#[test]
fn default_viewport_primitives_follow_window_resize() {
    let mut renderer = renderer();
    let window_wide = renderer.default_viewport().clone();
    renderer.add_primitive(quad(900.0, 0.0).with_viewport(window_wide));

    renderer.set_window_size(PhysicalSize::new(1024, 768));
    let mut backend = RecordingBackend::new();
    renderer.display(&mut backend);

    let scissors: Vec<_> = backend
        .calls()
        .iter()
        .filter_map(|call| match call {
            BackendCall::Scissor(rect) => Some(*rect),
            _ => None,
        })
        .collect();
    assert_eq!(scissors, [IntRect::new(0, 0, 1024, 768)]);
    assert_eq!(backend.draw_calls().cloned().collect::<Vec<_>>(), [0..6]);
    assert_eq!(renderer.frame().positions[0], [900.0, 0.0]);
}

#[test]
fn old_default_viewport_survives_several_resizes() {
    let mut renderer = renderer();
    let window_wide = renderer.default_viewport().clone();
    renderer.add_primitive(quad(0.0, 0.0).with_viewport(window_wide));

    renderer.set_window_size(PhysicalSize::new(1024, 768));
    renderer.set_window_size(PhysicalSize::new(640, 480));
    renderer.refresh();

    let batches: Vec<_> = renderer.frame().geometry_batches().collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].viewport, *renderer.default_viewport());
}
