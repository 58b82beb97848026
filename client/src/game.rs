//! The client's single game-state container.
//!
//! One `GameState` is built at startup and handed by reference to the router
//! and renderer. Tiles and players can only be written through the crate's
//! merge step; the viewport belongs to the client and is moved by pan and
//! resize.

use crate::coords::{pixel_to_tile_bounds, tile_under_pointer};
use crate::error::{ConsistencyError, ViewportError};
use crate::players::PlayerRegistry;
use crate::tiles::{MergeReport, TileStore};
use crate::viewport::Viewport;
use shared::{PlayerMap, TileArea, TileMap, TilePos};

#[derive(Debug, Clone)]
pub struct GameState {
    tile_size: f32,
    playing: bool,
    tiles: TileStore,
    players: PlayerRegistry,
    viewport: Viewport,
}

impl GameState {
    pub fn new(viewport: Viewport, tile_size: f32) -> Self {
        Self {
            tile_size,
            playing: false,
            tiles: TileStore::new(),
            players: PlayerRegistry::new(),
            viewport,
        }
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// True once the server has accepted our Join.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn tiles(&self) -> &TileStore {
        &self.tiles
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn visible_area(&self) -> TileArea {
        pixel_to_tile_bounds(&self.viewport, self.tile_size)
    }

    pub fn tile_at_pointer(&self, x: f32, y: f32) -> TilePos {
        tile_under_pointer(&self.viewport, self.tile_size, x, y)
    }

    /// Moves the view by a drag delta; dragging right reveals what is left.
    pub fn pan(&mut self, dx: f32, dy: f32) -> Result<(), ViewportError> {
        self.viewport.translate(-f64::from(dx), -f64::from(dy))
    }

    pub fn resize(&mut self, width: f32, height: f32) -> Result<(), ViewportError> {
        self.viewport.resize(f64::from(width), f64::from(height))
    }

    pub(crate) fn merge_tiles(&mut self, delta: &TileMap) -> MergeReport {
        self.tiles.merge(delta)
    }

    pub(crate) fn merge_players(&mut self, delta: &PlayerMap) -> Vec<ConsistencyError> {
        self.players.merge(delta)
    }

    pub(crate) fn rename_player(&mut self, id: u32, name: &str) -> Result<(), ConsistencyError> {
        self.players.rename(id, name)
    }

    pub(crate) fn seed_viewport(&mut self, area: &TileArea) -> Result<(), ViewportError> {
        self.viewport.set_from_tile_bounds(area, self.tile_size)
    }

    pub(crate) fn start_playing(&mut self) {
        self.playing = true;
    }
}
