use plutonium_vertex_array::config::RendererConfig;
use plutonium_vertex_array::error::RendererError;
use plutonium_vertex_array::renderer::VertexArrayRenderer;
use winit::dpi::PhysicalSize;

#[test]
fn missing_fields_take_defaults() {
    let config = RendererConfig::from_json_str(r#"{ "cull": true }"#).unwrap();
    assert!(config.cull);
    assert_eq!(config.alpha_threshold, 0.0);
    assert_eq!(config.max_texture_size, 2048);
    assert_eq!(config, RendererConfig { cull: true, ..RendererConfig::default() });
}

#[test]
fn config_survives_json() {
    let config = RendererConfig {
        cull: true,
        alpha_threshold: 0.25,
        max_texture_size: 4096,
        clear_color: [0.0, 0.0, 0.0, 1.0],
    };
    let json = config.to_json_string().unwrap();
    assert_eq!(RendererConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = RendererConfig::from_json_str("{ cull: yes }").unwrap_err();
    assert!(matches!(err, RendererError::ConfigParse(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = RendererConfig::from_json_file("does/not/exist/renderer.json").unwrap_err();
    assert!(matches!(err, RendererError::ConfigIo(_)));
}

#[test]
fn clear_color_converts_to_wgpu() {
    let color = RendererConfig::default().wgpu_clear_color();
    assert_eq!(color.r, 0.1);
    assert_eq!(color.a, 1.0);
}

#[test]
fn renderer_applies_config() {
    let config = RendererConfig {
        cull: true,
        alpha_threshold: 1.5,
        max_texture_size: 512,
        ..RendererConfig::default()
    };
    let renderer = VertexArrayRenderer::with_config(&config, PhysicalSize::new(640, 480));

    assert!(renderer.is_cull_enabled());
    assert_eq!(renderer.alpha_threshold(), 1.0);
    assert_eq!(renderer.atlas().max_page_size(), 512);
    assert_eq!(renderer.atlas().default_page_size().width, 512.0);
}
