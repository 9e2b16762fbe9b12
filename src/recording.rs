use std::ops::Range;

use crate::compiler::CompiledFrame;
use crate::primitive::{CustomDrawCallback, CustomDrawContext};
use crate::renderer::RenderBackend;
use crate::utils::IntRect;

/// One call made on a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Upload { vertices: usize, indices: usize },
    AlphaThreshold(f32),
    Viewport(IntRect),
    Scissor(IntRect),
    ResetScissor,
    BindPage(usize),
    Draw(Range<u32>),
    CustomDraw(IntRect),
}

/// Backend without a GPU: records every call in order and runs custom draw
/// callbacks with no render pass. Frame loops use it headless; tests use it
/// to check what the display loop submits.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    uploaded_revision: Option<u64>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = &Range<u32>> {
        self.calls.iter().filter_map(|call| match call {
            BackendCall::Draw(range) => Some(range),
            _ => None,
        })
    }
}

impl RenderBackend for RecordingBackend {
    fn upload(&mut self, frame: &CompiledFrame, revision: u64) {
        if self.uploaded_revision == Some(revision) {
            return;
        }
        self.uploaded_revision = Some(revision);
        self.calls.push(BackendCall::Upload {
            vertices: frame.vertex_count(),
            indices: frame.index_count(),
        });
    }

    fn set_alpha_threshold(&mut self, threshold: f32) {
        self.calls.push(BackendCall::AlphaThreshold(threshold));
    }

    fn set_viewport(&mut self, rect: IntRect) {
        self.calls.push(BackendCall::Viewport(rect));
    }

    fn set_scissor(&mut self, rect: IntRect) {
        self.calls.push(BackendCall::Scissor(rect));
    }

    fn reset_scissor(&mut self) {
        self.calls.push(BackendCall::ResetScissor);
    }

    fn bind_atlas_page(&mut self, page: usize) {
        self.calls.push(BackendCall::BindPage(page));
    }

    fn draw_indexed(&mut self, indices: Range<u32>) {
        self.calls.push(BackendCall::Draw(indices));
    }

    fn custom_draw(&mut self, callback: &CustomDrawCallback, viewport: IntRect) {
        self.calls.push(BackendCall::CustomDraw(viewport));
        let mut context = CustomDrawContext {
            viewport,
            pass: None,
        };
        (**callback)(&mut context);
    }
}
