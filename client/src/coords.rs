//! Conversions between pixel space and tile space.
//!
//! Every caller that needs the visible tile bounds (the join handshake, pan
//! updates, the renderer, the leaderboard) goes through [`pixel_to_tile_bounds`]
//! so the client never asks the server for a different area than it draws.

use crate::viewport::Viewport;
use shared::{TileArea, TilePos};

/// Default pixel edge length of one tile.
pub const DEFAULT_TILE_SIZE: f32 = 20.0;

/// Tile-space bounds covering the viewport.
///
/// Lower bounds are floored and upper bounds ceiled, so the result always
/// covers every pixel of the viewport.
pub fn pixel_to_tile_bounds(viewport: &Viewport, tile_size: f32) -> TileArea {
    TileArea::from_corners(
        floor_div(viewport.left(), tile_size),
        floor_div(viewport.top(), tile_size),
        ceil_div(viewport.right(), tile_size),
        ceil_div(viewport.bottom(), tile_size),
    )
}

/// Tile under a pointer given in window coordinates.
pub fn tile_under_pointer(viewport: &Viewport, tile_size: f32, x: f32, y: f32) -> TilePos {
    TilePos::new(
        floor_div(viewport.left() + f64::from(x), tile_size),
        floor_div(viewport.top() + f64::from(y), tile_size),
    )
}

/// Window-space top-left corner of a tile.
///
/// World positions are subtracted in `f64` first, so the result only narrows
/// to `f32` once it is a small on-screen offset.
pub fn tile_origin_on_screen(viewport: &Viewport, tile_size: f32, pos: TilePos) -> (f32, f32) {
    let tile_size = f64::from(tile_size);
    (
        (pos.x as f64 * tile_size - viewport.left()) as f32,
        (pos.y as f64 * tile_size - viewport.top()) as f32,
    )
}

/// World pixel edges of a tile area: `(left, top, right, bottom)`.
pub fn tile_bounds_to_pixels(area: &TileArea, tile_size: f32) -> (f64, f64, f64, f64) {
    let tile_size = f64::from(tile_size);
    (
        area.min.x as f64 * tile_size,
        area.min.y as f64 * tile_size,
        area.max.x as f64 * tile_size,
        area.max.y as f64 * tile_size,
    )
}

/// Offset of the first tile edge left of (or above) a world position, in
/// `[0, tile_size)`. Used to scroll the covered-tile pattern.
pub fn tile_phase(world: f64, tile_size: f32) -> f32 {
    world.rem_euclid(f64::from(tile_size)) as f32
}

fn floor_div(pixels: f64, tile_size: f32) -> i64 {
    (pixels / f64::from(tile_size)).floor() as i64
}

fn ceil_div(pixels: f64, tile_size: f32) -> i64 {
    (pixels / f64::from(tile_size)).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(left: f64, top: f64, right: f64, bottom: f64) -> Viewport {
        Viewport::new(left, top, right, bottom).unwrap()
    }

    #[test]
    fn test_aligned_viewport_maps_exactly() {
        let bounds = pixel_to_tile_bounds(&viewport(-100.0, -80.0, 100.0, 80.0), 20.0);
        assert_eq!(bounds, TileArea::from_corners(-5, -4, 5, 4));
    }

    #[test]
    fn test_unaligned_viewport_rounds_outwards() {
        let bounds = pixel_to_tile_bounds(&viewport(-101.0, 5.0, 99.0, 41.0), 20.0);
        assert_eq!(bounds, TileArea::from_corners(-6, 0, 5, 3));
    }

    #[test]
    fn test_round_trip_through_pixels() {
        for tile_size in [1.0, 16.0, 20.0, 32.0] {
            for area in [
                TileArea::from_corners(-5, -4, 5, 4),
                TileArea::from_corners(0, 0, 1, 1),
                TileArea::from_corners(-300, 17, -250, 40),
                TileArea::from_corners(100_000_003, 0, 100_000_013, 4),
                TileArea::from_corners(-4_000_000_000_000, 7, -3_999_999_999_990, 12),
            ] {
                let mut view = viewport(0.0, 0.0, 1.0, 1.0);
                view.set_from_tile_bounds(&area, tile_size).unwrap();
                let bounds = pixel_to_tile_bounds(&view, tile_size);
                assert!(bounds.contains(area.min) && bounds.contains(area.max));
                assert_eq!(bounds, area);
            }
        }
    }

    #[test]
    fn test_tile_under_pointer() {
        let view = viewport(-100.0, -80.0, 100.0, 80.0);
        assert_eq!(tile_under_pointer(&view, 20.0, 0.0, 0.0), TilePos::new(-5, -4));
        assert_eq!(tile_under_pointer(&view, 20.0, 119.0, 99.0), TilePos::new(0, 0));
        assert_eq!(tile_under_pointer(&view, 20.0, 99.0, 79.0), TilePos::new(-1, -1));
    }

    #[test]
    fn test_tile_origin_on_screen() {
        let view = viewport(-100.0, -80.0, 100.0, 80.0);
        assert_eq!(
            tile_origin_on_screen(&view, 20.0, TilePos::new(0, 0)),
            (100.0, 80.0)
        );
        assert_eq!(
            tile_origin_on_screen(&view, 20.0, TilePos::new(-5, -4)),
            (0.0, 0.0)
        );
    }

    #[test]
    fn test_tile_bounds_to_pixels() {
        let area = TileArea::from_corners(-5, -4, 5, 4);
        assert_eq!(
            tile_bounds_to_pixels(&area, 20.0),
            (-100.0, -80.0, 100.0, 80.0)
        );
    }

    #[test]
    fn test_far_tiles_land_on_screen_exactly() {
        let mut view = viewport(0.0, 0.0, 1.0, 1.0);
        let area = TileArea::from_corners(100_000_003, -50_000_000, 100_000_013, -49_999_996);
        view.set_from_tile_bounds(&area, 20.0).unwrap();
        assert_eq!(view.width(), 200.0);
        assert_eq!(
            tile_origin_on_screen(&view, 20.0, TilePos::new(100_000_004, -49_999_999)),
            (20.0, 20.0)
        );
        assert_eq!(
            tile_under_pointer(&view, 20.0, 25.0, 25.0),
            TilePos::new(100_000_004, -49_999_999)
        );
    }

    #[test]
    fn test_tile_phase() {
        assert_eq!(tile_phase(-100.0, 20.0), 0.0);
        assert_eq!(tile_phase(-95.0, 20.0), 5.0);
        assert_eq!(tile_phase(2_000_000_065.0, 20.0), 5.0);
    }
}
