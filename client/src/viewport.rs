use crate::coords::{pixel_to_tile_bounds, tile_bounds_to_pixels};
use crate::error::ViewportError;
use shared::TileArea;

/// Visible window in world pixel space.
///
/// Width and height stay strictly positive; every mutation that would break
/// that is rejected and leaves the viewport unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Viewport {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Result<Self, ViewportError> {
        if ![left, top, right, bottom].iter().all(|edge| edge.is_finite()) {
            return Err(ViewportError::NonFinite);
        }
        check_extent(right - left, bottom - top)?;
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Viewport of the given size centred on the world origin.
    pub fn centered(width: f64, height: f64) -> Result<Self, ViewportError> {
        Self::new(-width / 2.0, -height / 2.0, width / 2.0, height / 2.0)
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Shifts the viewport by a delta, keeping its size.
    ///
    /// A delta that is not finite, or that pushes the bounds so far out that
    /// the size can no longer be represented, is rejected.
    pub fn translate(&mut self, dx: f64, dy: f64) -> Result<(), ViewportError> {
        let (width, height) = (self.width(), self.height());
        let left = self.left + dx;
        let top = self.top + dy;
        *self = Self::new(left, top, left + width, top + height)?;
        Ok(())
    }

    /// Seeds the pixel bounds from a server-confirmed tile area.
    pub fn set_from_tile_bounds(
        &mut self,
        area: &TileArea,
        tile_size: f32,
    ) -> Result<(), ViewportError> {
        let (left, top, right, bottom) = tile_bounds_to_pixels(area, tile_size);
        *self = Self::new(left, top, right, bottom)?;
        Ok(())
    }

    /// Keeps the top-left corner and changes the size.
    pub fn resize(&mut self, width: f64, height: f64) -> Result<(), ViewportError> {
        check_extent(width, height)?;
        *self = Self::new(self.left, self.top, self.left + width, self.top + height)?;
        Ok(())
    }

    pub fn visible_area(&self, tile_size: f32) -> TileArea {
        pixel_to_tile_bounds(self, tile_size)
    }
}

fn check_extent(width: f64, height: f64) -> Result<(), ViewportError> {
    // Written so NaN fails too.
    if width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite() {
        Ok(())
    } else {
        Err(ViewportError::Degenerate { width, height })
    }
}
