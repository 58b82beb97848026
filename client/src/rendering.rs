use crate::coords::{tile_origin_on_screen, tile_phase};
use crate::error::ConsistencyError;
use crate::game::GameState;
use crate::leaderboard::LeaderboardRow;
use crate::protocol::RenderMode;
use log::{debug, warn};
use macroquad::prelude::*;
use std::collections::HashSet;

/// What a revealed tile is filled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileFill {
    Mine,
    /// Display token of the player who revealed the tile.
    Owner(String),
    /// The owner is unknown or not in the registry yet.
    UnknownOwner,
}

/// Paint operations the scheduler needs from a drawing surface.
///
/// Coordinates are window pixels with the origin at the top-left corner.
pub trait TileSurface {
    fn size(&self) -> (f32, f32);

    /// Repaints the whole surface as covered tiles. The offset is how far the
    /// viewport's top-left corner sits past a tile edge, in `[0, tile_size)`,
    /// so the pattern scrolls with the world.
    fn clear(&mut self, offset_x: f32, offset_y: f32, tile_size: f32);

    fn draw_tile(&mut self, left: f32, top: f32, tile_size: f32, fill: &TileFill, danger: Option<u8>);

    fn begin(&mut self) {}

    fn finish(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub drawn: usize,
    pub skipped: usize,
    pub missing_owner: usize,
}

/// Decides what to repaint and paints only tiles inside the visible bounds.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    reported_missing: HashSet<u32>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render<S: TileSurface>(
        &mut self,
        state: &GameState,
        surface: &mut S,
        mode: RenderMode,
    ) -> RenderStats {
        let tile_size = state.tile_size();
        let viewport = state.viewport();
        let (width, height) = surface.size();
        let mut stats = RenderStats::default();

        surface.begin();
        if mode == RenderMode::Full {
            surface.clear(
                tile_phase(viewport.left(), tile_size),
                tile_phase(viewport.top(), tile_size),
                tile_size,
            );
        }

        for (pos, tile) in state.tiles().within(&state.visible_area()) {
            let (left, top) = tile_origin_on_screen(viewport, tile_size, pos);
            if left + tile_size <= 0.0 || left >= width || top + tile_size <= 0.0 || top >= height {
                stats.skipped += 1;
                continue;
            }

            let fill = if tile.is_mine() {
                TileFill::Mine
            } else {
                match tile.owner.and_then(|id| state.players().get(id)) {
                    Some(player) => TileFill::Owner(player.color.clone()),
                    None => {
                        stats.missing_owner += 1;
                        if let Some(id) = tile.owner {
                            self.report_missing(id);
                        }
                        TileFill::UnknownOwner
                    }
                }
            };
            surface.draw_tile(left, top, tile_size, &fill, tile.danger());
            stats.drawn += 1;
        }
        surface.finish();

        debug!(
            "Rendered ({:?}): {} drawn, {} skipped, {} without owner",
            mode, stats.drawn, stats.skipped, stats.missing_owner
        );
        stats
    }

    fn report_missing(&mut self, player_id: u32) {
        if self.reported_missing.insert(player_id) {
            warn!("{}", ConsistencyError::MissingPlayer { player_id });
        }
    }
}

const COVERED_LIGHT: Color = Color::new(0.75, 0.75, 0.75, 1.0);
const COVERED_SHADE: Color = Color::new(0.5, 0.5, 0.5, 1.0);
const TILE_BORDER: Color = Color::new(0.5, 0.5, 0.5, 1.0);
const MINE: Color = RED;
// Drawn hatched so a player who picked magenta still looks different.
const UNKNOWN_OWNER: Color = MAGENTA;
const UNKNOWN_HATCH: Color = BLACK;

const DANGER_COLORS: [Color; 8] = [
    Color::new(0.004, 0.0, 0.996, 1.0),
    Color::new(0.0, 0.502, 0.004, 1.0),
    Color::new(0.996, 0.0, 0.0, 1.0),
    Color::new(0.0, 0.0, 0.498, 1.0),
    Color::new(0.502, 0.0, 0.0, 1.0),
    Color::new(0.0, 0.502, 0.506, 1.0),
    Color::new(0.0, 0.0, 0.0, 1.0),
    Color::new(0.502, 0.502, 0.502, 1.0),
];

/// Parses `#RRGGBB` display tokens.
pub fn parse_hex_color(token: &str) -> Option<Color> {
    let hex = token.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    Some(Color::from_rgba(
        (value >> 16) as u8,
        (value >> 8) as u8,
        value as u8,
        255,
    ))
}

/// Fill for a revealed tile, or `None` when the owner color is unknown or
/// unreadable and the tile gets the hatched fallback instead.
pub fn fill_color(fill: &TileFill) -> Option<Color> {
    match fill {
        TileFill::Mine => Some(MINE),
        TileFill::Owner(token) => parse_hex_color(token),
        TileFill::UnknownOwner => None,
    }
}

/// Window surface backed by an off-screen texture that survives between
/// frames, so incremental renders only paint what changed.
pub struct MacroquadSurface {
    width: f32,
    height: f32,
    target: RenderTarget,
    camera: Camera2D,
}

impl MacroquadSurface {
    pub fn new(width: f32, height: f32) -> Self {
        let target = render_target(width.max(1.0) as u32, height.max(1.0) as u32);
        let mut camera = Camera2D::from_display_rect(Rect::new(0.0, 0.0, width, height));
        camera.render_target = Some(target.clone());
        Self {
            width,
            height,
            target,
            camera,
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        *self = Self::new(width, height);
    }

    /// Copies the off-screen texture to the window.
    pub fn present(&self) {
        set_default_camera();
        draw_texture_ex(
            &self.target.texture,
            0.0,
            0.0,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(self.width, self.height)),
                ..Default::default()
            },
        );
    }

    /// Draws leaderboard rows and the last error over the presented frame.
    pub fn draw_overlay(&self, rows: &[LeaderboardRow], status: &str, error: Option<&str>) {
        let x = 10.0;
        let mut y = 20.0;
        draw_rectangle(0.0, 0.0, 320.0, 24.0 + rows.len() as f32 * 18.0, Color::new(0.0, 0.0, 0.0, 0.6));
        draw_text(status, x, y, 16.0, WHITE);
        for row in rows {
            y += 18.0;
            let color = parse_hex_color(&row.color).unwrap_or(WHITE);
            let line = format!(
                "{:>3}. {:<12} {:>6} {:>10} {:>8.2}",
                row.rank, row.name, row.score, row.elapsed, row.tiles_per_hour
            );
            draw_text(&line, x, y, 16.0, if row.is_current { YELLOW } else { color });
        }
        if let Some(error) = error {
            draw_text(error, x, self.height - 12.0, 18.0, RED);
        }
    }
}

impl TileSurface for MacroquadSurface {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn begin(&mut self) {
        set_camera(&self.camera);
    }

    fn finish(&mut self) {
        set_default_camera();
    }

    fn clear(&mut self, offset_x: f32, offset_y: f32, tile_size: f32) {
        clear_background(COVERED_LIGHT);
        let start_x = -offset_x.rem_euclid(tile_size);
        let start_y = -offset_y.rem_euclid(tile_size);
        let mut y = start_y;
        while y < self.height {
            let mut x = start_x;
            while x < self.width {
                draw_rectangle_lines(x, y, tile_size, tile_size, 2.0, COVERED_SHADE);
                x += tile_size;
            }
            y += tile_size;
        }
    }

    fn draw_tile(&mut self, left: f32, top: f32, tile_size: f32, fill: &TileFill, danger: Option<u8>) {
        draw_rectangle(left, top, tile_size, tile_size, TILE_BORDER);
        let inner = tile_size - 2.0;
        match fill_color(fill) {
            Some(color) => draw_rectangle(left + 1.0, top + 1.0, inner, inner, color),
            None => {
                draw_rectangle(left + 1.0, top + 1.0, inner, inner, UNKNOWN_OWNER);
                let (right, bottom) = (left + 1.0 + inner, top + 1.0 + inner);
                draw_line(left + 1.0, top + 1.0, right, bottom, 2.0, UNKNOWN_HATCH);
                draw_line(left + 1.0, bottom, right, top + 1.0, 2.0, UNKNOWN_HATCH);
            }
        }

        if let Some(count @ 1..=8) = danger {
            let text = count.to_string();
            let dims = measure_text(&text, None, tile_size as u16, 1.0);
            draw_text(
                &text,
                left + (tile_size - dims.width) / 2.0,
                top + (tile_size + dims.offset_y) / 2.0,
                tile_size,
                DANGER_COLORS[usize::from(count - 1)],
            );
        }
    }
}
