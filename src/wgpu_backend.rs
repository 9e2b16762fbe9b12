use std::borrow::Cow;
use std::ops::Range;

use log::{debug, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::compiler::CompiledFrame;
use crate::error::{RendererError, Result};
use crate::primitive::{CustomDrawCallback, CustomDrawContext};
use crate::renderer::RenderBackend;
use crate::texture_atlas::AtlasLayout;
use crate::utils::{IntRect, Size};

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Unorm8x4];
const TEX_COORD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x2];

/// Uniform slots are this far apart so either can be bound with a dynamic
/// offset (`min_uniform_buffer_offset_alignment` is at most 256).
const GLOBALS_STRIDE: u64 = 256;

const INITIAL_VERTEX_CAPACITY: u64 = 1024;
const INITIAL_INDEX_CAPACITY: u64 = 4096;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    window_size: [f32; 2],
    alpha_threshold: f32,
    _padding: f32,
}

struct GrowableBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    capacity: u64,
    buffer: wgpu::Buffer,
}

impl GrowableBuffer {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        usage: wgpu::BufferUsages,
        capacity: u64,
    ) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            label,
            usage,
            capacity,
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: capacity,
                usage,
                mapped_at_creation: false,
            }),
        }
    }

    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) {
        let len = data.len() as u64;
        if len > self.capacity {
            self.capacity = len.next_power_of_two();
            self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: self.capacity,
                usage: self.usage,
                mapped_at_creation: false,
            });
        }
        if len > 0 {
            queue.write_buffer(&self.buffer, 0, data);
        }
    }
}

struct GpuAtlasPage {
    size: Size,
    bind_group: wgpu::BindGroup,
    // Keeps the texture alive for the bind group.
    _texture: wgpu::Texture,
}

/// Device resources for drawing compiled frames with wgpu.
///
/// The renderer outlives frames; each frame borrows it together with the
/// active render pass through [`WgpuRenderer::frame`].
pub struct WgpuRenderer {
    pipeline: wgpu::RenderPipeline,
    page_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    pages: Vec<GpuAtlasPage>,
    positions: GrowableBuffer,
    colors: GrowableBuffer,
    tex_coords: GrowableBuffer,
    indices: GrowableBuffer,
    uploaded_revision: Option<u64>,
}

impl WgpuRenderer {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Array Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "../shaders/vertex_array.wgsl"
            ))),
        });

        let globals_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("globals_bind_group_layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<Globals>() as _,
                        ),
                    },
                    count: None,
                }],
            });

        let page_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("atlas_page_bind_group_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Globals Uniform Buffer"),
            size: GLOBALS_STRIDE * 2,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globals Bind Group"),
            layout: &globals_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &globals_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<Globals>() as _),
                }),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Vertex Array Pipeline Layout"),
            bind_group_layouts: &[&globals_bind_group_layout, &page_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Vertex Array Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &POSITION_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[u8; 4]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &COLOR_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &TEX_COORD_ATTRIBUTES,
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertex = wgpu::BufferUsages::VERTEX;
        let mut renderer = Self {
            pipeline,
            page_bind_group_layout,
            sampler,
            globals_buffer,
            globals_bind_group,
            pages: Vec::new(),
            positions: GrowableBuffer::new(
                device,
                "Position Buffer",
                vertex,
                INITIAL_VERTEX_CAPACITY * 8,
            ),
            colors: GrowableBuffer::new(device, "Color Buffer", vertex, INITIAL_VERTEX_CAPACITY * 4),
            tex_coords: GrowableBuffer::new(
                device,
                "Texture Coordinate Buffer",
                vertex,
                INITIAL_VERTEX_CAPACITY * 8,
            ),
            indices: GrowableBuffer::new(
                device,
                "Index Buffer",
                wgpu::BufferUsages::INDEX,
                INITIAL_INDEX_CAPACITY * 4,
            ),
            uploaded_revision: None,
        };

        // Untextured geometry samples a white default page until the atlas
        // uploads the real one.
        let white = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let default_page = renderer.create_page(device, queue, &white);
        renderer.pages.push(default_page);
        renderer
    }

    /// Uploads `image` as atlas page `page`. Pages are replaced in place or
    /// appended one past the end.
    pub fn upload_atlas_page(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        page: usize,
        image: &image::RgbaImage,
    ) -> Result<()> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RendererError::EmptyPage { page });
        }
        let max = device.limits().max_texture_dimension_2d;
        if image.width() > max || image.height() > max {
            return Err(RendererError::PageTooLarge {
                width: image.width(),
                height: image.height(),
                max,
            });
        }
        if page > self.pages.len() {
            return Err(RendererError::PageOutOfOrder {
                got: page,
                expected: self.pages.len(),
            });
        }

        let gpu_page = self.create_page(device, queue, image);
        if page == self.pages.len() {
            self.pages.push(gpu_page);
        } else {
            self.pages[page] = gpu_page;
        }
        debug!("uploaded atlas page {} ({}x{})", page, image.width(), image.height());
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page layout matching what is on the GPU.
    pub fn atlas_layout(&self, device: &wgpu::Device) -> Result<AtlasLayout> {
        let max = device.limits().max_texture_dimension_2d;
        let mut pages = self.pages.iter().map(|page| page.size);
        let default_page = pages.next().unwrap_or_default();
        let mut layout = AtlasLayout::new(max, default_page);
        for size in pages {
            layout.push_page(size)?;
        }
        Ok(layout)
    }

    /// Borrows the renderer for one render pass. `target_size` is the size of
    /// the pass's color attachment.
    pub fn frame<'a, 'p>(
        &'a mut self,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        pass: &'a mut wgpu::RenderPass<'p>,
        target_size: PhysicalSize<u32>,
    ) -> WgpuFrame<'a, 'p> {
        let globals = Globals {
            window_size: [target_size.width.max(1) as f32, target_size.height.max(1) as f32],
            alpha_threshold: 0.0,
            _padding: 0.0,
        };
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));

        WgpuFrame {
            renderer: self,
            device,
            queue,
            pass,
            target_size,
            globals,
            globals_offset: 0,
            page: 0,
            scissor: IntRect::new(0, 0, target_size.width, target_size.height),
            bound: false,
        }
    }

    fn create_page(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &image::RgbaImage,
    ) -> GpuAtlasPage {
        let (width, height) = image.dimensions();
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Atlas Page Texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[wgpu::TextureFormat::Rgba8UnormSrgb],
        });

        // Rows are padded to the copy alignment before the buffer copy.
        let bytes_per_pixel = 4;
        let unpadded_bytes_per_row = width as usize * bytes_per_pixel;
        let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(alignment) * alignment;

        let mut padded = vec![0u8; padded_bytes_per_row * height as usize];
        for (y, row) in image.as_raw().chunks_exact(unpadded_bytes_per_row).enumerate() {
            let dst = y * padded_bytes_per_row;
            padded[dst..dst + unpadded_bytes_per_row].copy_from_slice(row);
        }

        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Atlas Page Pixel Buffer"),
            contents: &padded,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Atlas Page Copy Encoder"),
        });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            extent,
        );
        queue.submit(std::iter::once(encoder.finish()));

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Atlas Page Bind Group"),
            layout: &self.page_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        GpuAtlasPage {
            size: Size::new(width as f32, height as f32),
            bind_group,
            _texture: texture,
        }
    }
}

fn page_bind_group(renderer: &WgpuRenderer, page: usize) -> &wgpu::BindGroup {
    match renderer.pages.get(page) {
        Some(gpu_page) => &gpu_page.bind_group,
        None => &renderer.pages[0].bind_group,
    }
}

/// [`RenderBackend`] over one wgpu render pass.
pub struct WgpuFrame<'a, 'p> {
    renderer: &'a mut WgpuRenderer,
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    pass: &'a mut wgpu::RenderPass<'p>,
    target_size: PhysicalSize<u32>,
    globals: Globals,
    globals_offset: u32,
    page: usize,
    scissor: IntRect,
    bound: bool,
}

impl WgpuFrame<'_, '_> {
    fn full_target(&self) -> IntRect {
        IntRect::new(0, 0, self.target_size.width, self.target_size.height)
    }

    fn clamp(&self, rect: IntRect) -> IntRect {
        rect.clamp_to(self.target_size.width, self.target_size.height)
    }

    /// Pipeline, buffers and bind groups, which custom draws may clobber.
    fn bind(&mut self) {
        if self.bound {
            return;
        }
        let renderer = &*self.renderer;
        self.pass.set_pipeline(&renderer.pipeline);
        self.pass
            .set_bind_group(0, &renderer.globals_bind_group, &[self.globals_offset]);
        self.pass
            .set_bind_group(1, page_bind_group(renderer, self.page), &[]);
        self.pass.set_vertex_buffer(0, renderer.positions.buffer.slice(..));
        self.pass.set_vertex_buffer(1, renderer.colors.buffer.slice(..));
        self.pass.set_vertex_buffer(2, renderer.tex_coords.buffer.slice(..));
        self.pass
            .set_index_buffer(renderer.indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.bound = true;
    }
}

impl RenderBackend for WgpuFrame<'_, '_> {
    fn upload(&mut self, frame: &CompiledFrame, revision: u64) {
        if self.renderer.uploaded_revision == Some(revision) {
            return;
        }
        let renderer = &mut *self.renderer;
        renderer
            .positions
            .write(self.device, self.queue, bytemuck::cast_slice(&frame.positions));
        renderer
            .colors
            .write(self.device, self.queue, bytemuck::cast_slice(&frame.colors));
        renderer
            .tex_coords
            .write(self.device, self.queue, bytemuck::cast_slice(&frame.tex_coords));
        renderer
            .indices
            .write(self.device, self.queue, bytemuck::cast_slice(&frame.indices));
        renderer.uploaded_revision = Some(revision);
        // Buffers may have been reallocated.
        self.bound = false;
    }

    fn set_alpha_threshold(&mut self, threshold: f32) {
        // Slot 0 always holds a zero threshold; a non-zero one goes to slot 1.
        // Queue writes land before the pass executes, so one non-zero value
        // per frame is supported.
        if threshold > 0.0 {
            let globals = Globals {
                alpha_threshold: threshold,
                ..self.globals
            };
            self.queue.write_buffer(
                &self.renderer.globals_buffer,
                GLOBALS_STRIDE,
                bytemuck::bytes_of(&globals),
            );
            self.globals_offset = GLOBALS_STRIDE as u32;
        } else {
            self.globals_offset = 0;
        }
        if self.bound {
            self.pass
                .set_bind_group(0, &self.renderer.globals_bind_group, &[self.globals_offset]);
        }
    }

    /// wgpu 23 rejects viewports reaching outside the render target, so the
    /// rect is clamped first. A region hanging off the window is therefore
    /// mapped onto its visible part rather than clipped; custom draws get the
    /// clamped rect in `CustomDrawContext::viewport` to lay out against.
    fn set_viewport(&mut self, rect: IntRect) {
        let clamped = self.clamp(rect);
        if clamped.is_empty() {
            return;
        }
        if clamped != rect {
            debug!("viewport {:?} clamped to {:?}", rect, clamped);
        }
        let rect = clamped;
        self.pass.set_viewport(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
            0.0,
            1.0,
        );
    }

    fn set_scissor(&mut self, rect: IntRect) {
        self.scissor = self.clamp(rect);
        if !self.scissor.is_empty() {
            self.pass.set_scissor_rect(
                self.scissor.x as u32,
                self.scissor.y as u32,
                self.scissor.width,
                self.scissor.height,
            );
        }
    }

    fn reset_scissor(&mut self) {
        let full = self.full_target();
        self.set_scissor(full);
    }

    fn bind_atlas_page(&mut self, page: usize) {
        if page >= self.renderer.pages.len() {
            warn!(
                "atlas page {} was never uploaded ({} pages), drawing with page 0",
                page,
                self.renderer.pages.len()
            );
        }
        self.page = page;
        if self.bound {
            self.pass
                .set_bind_group(1, page_bind_group(&*self.renderer, page), &[]);
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>) {
        // An empty scissor rect cannot be set on the pass; nothing in it is
        // visible anyway.
        if self.scissor.is_empty() {
            return;
        }
        self.bind();
        self.pass.draw_indexed(indices, 0, 0..1);
    }

    fn custom_draw(&mut self, callback: &CustomDrawCallback, viewport: IntRect) {
        let region = self.clamp(viewport);
        if region.is_empty() {
            return;
        }
        let previous_scissor = self.scissor;
        self.set_scissor(region);

        let mut context = CustomDrawContext {
            viewport: region,
            pass: Some(&mut *self.pass),
        };
        (**callback)(&mut context);

        self.bound = false;
        self.set_scissor(previous_scissor);
    }
}
