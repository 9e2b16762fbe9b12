use std::rc::Rc;

use crate::utils::{Position, Rectangle, Size};

/// A scissor region plus the translation applied to everything drawn in it.
///
/// Primitives drawn inside a scrolled area share one `Rc<Viewport>`. The
/// fields are private and there are no setters, so a published viewport can
/// never change under the primitives that reference it; a new scroll offset
/// means a new viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    source_origin: Position,
    destination_origin: Position,
    size: Size,
}

pub type SharedViewport = Rc<Viewport>;

impl Viewport {
    pub fn new(source_origin: Position, destination_origin: Position, size: Size) -> Self {
        Self {
            source_origin,
            destination_origin,
            size,
        }
    }

    /// Viewport covering a whole window, no translation.
    pub fn window(size: Size) -> Self {
        Self::new(Position::default(), Position::default(), size)
    }

    pub fn shared(self) -> SharedViewport {
        Rc::new(self)
    }

    pub fn source_origin(&self) -> Position {
        self.source_origin
    }

    pub fn destination_origin(&self) -> Position {
        self.destination_origin
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Translation from source space into window space.
    pub fn offset(&self) -> Position {
        self.destination_origin - self.source_origin
    }

    /// Region of the window this viewport clips to.
    pub fn destination_rect(&self) -> Rectangle {
        Rectangle::from_pos_size(self.destination_origin, self.size)
    }
}
