use std::fmt;
use std::rc::Rc;

use crate::primitive::CustomDrawCallback;
use crate::viewport::SharedViewport;

/// A contiguous index range drawable with one texture page and one scissor.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBatch {
    pub viewport: SharedViewport,
    pub atlas_page: usize,
    pub start_index: u32,
    pub index_count: u32,
    /// Lowest vertex index the range may reference.
    pub min_index: u32,
    /// Highest vertex index the range may reference.
    pub max_index: u32,
}

impl GeometryBatch {
    pub(crate) fn open(
        viewport: SharedViewport,
        atlas_page: usize,
        start_index: u32,
        first_vertex: u32,
    ) -> Self {
        Self {
            viewport,
            atlas_page,
            start_index,
            index_count: 0,
            min_index: first_vertex,
            max_index: first_vertex,
        }
    }

    pub fn index_range(&self) -> std::ops::Range<u32> {
        self.start_index..self.start_index + self.index_count
    }

    pub fn is_empty(&self) -> bool {
        self.index_count == 0
    }
}

/// Hand-off to drawing code outside the vertex array pipeline.
#[derive(Clone)]
pub struct CustomDrawBatch {
    pub viewport: SharedViewport,
    pub callback: CustomDrawCallback,
}

impl CustomDrawBatch {
    /// Whether this batch runs the given callback (identity, not value).
    pub fn runs(&self, callback: &CustomDrawCallback) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.callback), Rc::as_ptr(callback))
    }
}

impl PartialEq for CustomDrawBatch {
    fn eq(&self, other: &Self) -> bool {
        self.viewport == other.viewport && self.runs(&other.callback)
    }
}

impl fmt::Debug for CustomDrawBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomDrawBatch")
            .field("viewport", &self.viewport)
            .field("callback", &Rc::as_ptr(&self.callback))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Geometry(GeometryBatch),
    CustomDraw(CustomDrawBatch),
}

impl Batch {
    pub fn viewport(&self) -> &SharedViewport {
        match self {
            Batch::Geometry(batch) => &batch.viewport,
            Batch::CustomDraw(batch) => &batch.viewport,
        }
    }

    pub fn as_geometry(&self) -> Option<&GeometryBatch> {
        match self {
            Batch::Geometry(batch) => Some(batch),
            Batch::CustomDraw(_) => None,
        }
    }

    pub fn as_custom_draw(&self) -> Option<&CustomDrawBatch> {
        match self {
            Batch::Geometry(_) => None,
            Batch::CustomDraw(batch) => Some(batch),
        }
    }

    pub fn is_custom_draw(&self) -> bool {
        matches!(self, Batch::CustomDraw(_))
    }
}
