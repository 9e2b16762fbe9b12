use serde::{Deserialize, Serialize};

use crate::error::{RendererError, Result};
use crate::utils::Size;

/// Largest texture dimension assumed when no device limit is known
/// (`wgpu::Limits::downlevel_webgl2_defaults`).
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 2048;

/// Page layout of the texture atlas.
///
/// Texture coordinates handed over by widgets are in atlas pixels. The atlas
/// is split into pages no taller than `max_page_size`, stacked along V, so a
/// coordinate of `V` lives on page `floor(V / max_page_size)` at
/// `V - page * max_page_size` inside it. Page 0 is the default page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasLayout {
    max_page_size: u32,
    pages: Vec<Size>,
}

/// Where a vertex's texture coordinate lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMapping {
    pub page: usize,
    /// Multipliers turning in-page pixels into `[0, 1]` coordinates.
    pub normalizer: [f32; 2],
    /// V coordinate at which the page starts.
    pub page_origin: f32,
}

impl PageMapping {
    pub fn normalize(&self, texture_coordinate: [f32; 2]) -> [f32; 2] {
        [
            texture_coordinate[0] * self.normalizer[0],
            (texture_coordinate[1] - self.page_origin) * self.normalizer[1],
        ]
    }
}

impl Default for AtlasLayout {
    fn default() -> Self {
        let side = DEFAULT_MAX_PAGE_SIZE as f32;
        Self::new(DEFAULT_MAX_PAGE_SIZE, Size::new(side, side))
    }
}

impl AtlasLayout {
    /// `default_page` is the size of page 0.
    pub fn new(max_page_size: u32, default_page: Size) -> Self {
        Self {
            max_page_size: max_page_size.max(1),
            pages: vec![default_page],
        }
    }

    /// Appends the next page and returns its index.
    pub fn push_page(&mut self, size: Size) -> Result<usize> {
        let max = self.max_page_size as f32;
        if size.width > max || size.height > max {
            return Err(RendererError::PageTooLarge {
                width: size.width as u32,
                height: size.height as u32,
                max: self.max_page_size,
            });
        }
        self.pages.push(size);
        Ok(self.pages.len() - 1)
    }

    /// Replaces the size of an existing page, e.g. after the default page grew.
    pub fn resize_page(&mut self, page: usize, size: Size) -> Result<()> {
        let count = self.pages.len();
        let slot = self
            .pages
            .get_mut(page)
            .ok_or(RendererError::MissingAtlasPage { page, count })?;
        *slot = size;
        Ok(())
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn default_page_size(&self) -> Size {
        self.pages[0]
    }

    pub fn page_size(&self, page: usize) -> Option<Size> {
        self.pages.get(page).copied()
    }

    /// Page index a raw V coordinate falls on. Negative coordinates clamp to
    /// page 0.
    pub fn page_of(&self, v: f32) -> usize {
        (v.max(0.0) / self.max_page_size as f32).floor() as usize
    }

    /// Resolves the page and normalizer for a raw V coordinate. Coordinates on
    /// pages the layout does not know about are normalized against the
    /// default page; the second value reports that case.
    pub fn map(&self, v: f32) -> (PageMapping, bool) {
        let page = self.page_of(v);
        let (size, known) = match self.page_size(page) {
            Some(size) => (size, true),
            None => (self.default_page_size(), false),
        };

        let mapping = PageMapping {
            page,
            normalizer: [recip(size.width), recip(size.height)],
            page_origin: page as f32 * self.max_page_size as f32,
        };
        (mapping, known)
    }

    /// Page index and normalized coordinate of one texture coordinate.
    pub fn resolve(&self, texture_coordinate: [f32; 2]) -> (usize, [f32; 2]) {
        let (mapping, _) = self.map(texture_coordinate[1]);
        (mapping.page, mapping.normalize(texture_coordinate))
    }
}

fn recip(extent: f32) -> f32 {
    if extent > 0.0 {
        1.0 / extent
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_below_one_page_stay_on_default_page() {
        let layout = AtlasLayout::new(256, Size::new(128.0, 64.0));
        let (page, uv) = layout.resolve([64.0, 32.0]);
        assert_eq!(page, 0);
        assert_eq!(uv, [0.5, 0.5]);
    }

    #[test]
    fn oversized_page_is_rejected() {
        let mut layout = AtlasLayout::new(256, Size::new(256.0, 256.0));
        assert!(layout.push_page(Size::new(512.0, 16.0)).is_err());
        assert_eq!(layout.page_count(), 1);
    }

    #[test]
    fn unknown_page_falls_back_to_default_size() {
        let layout = AtlasLayout::new(100, Size::new(50.0, 50.0));
        let (mapping, known) = layout.map(305.0);
        assert!(!known);
        assert_eq!(mapping.page, 3);
        let [u, v] = mapping.normalize([25.0, 305.0]);
        assert!((u - 0.5).abs() < 1e-6);
        assert!((v - 0.1).abs() < 1e-6);
    }
}
