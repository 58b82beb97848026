//! Sparse store of every tile the server has told us about.
//!
//! The grid is unbounded, so only mentioned coordinates are kept. Entries are
//! never removed and known facts are never overwritten: a merge can only
//! insert new tiles or fill fields an earlier partial delta left out.

use crate::error::{ConsistencyError, TileField};
use shared::{TileArea, TilePos, TileRecord};
use std::collections::HashMap;

/// Locally known facts about one tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tile {
    pub is_mine: Option<bool>,
    pub adjacent_mines: Option<u8>,
    pub owner: Option<u32>,
}

impl Tile {
    pub fn is_mine(&self) -> bool {
        self.is_mine.unwrap_or(false)
    }

    /// Adjacent mine count for safe tiles; `None` for mines or unknown counts.
    pub fn danger(&self) -> Option<u8> {
        match self.is_mine {
            Some(false) => self.adjacent_mines,
            _ => None,
        }
    }
}

impl From<&TileRecord> for Tile {
    fn from(record: &TileRecord) -> Self {
        Self {
            is_mine: record.is_mine,
            adjacent_mines: record.adjacent_mines,
            owner: record.player_id,
        }
    }
}

/// What a merge did, including every contradiction it refused to apply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub filled: usize,
    pub unchanged: usize,
    pub conflicts: Vec<ConsistencyError>,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.filled > 0
    }
}

#[derive(Debug, Default, Clone)]
pub struct TileStore {
    tiles: HashMap<TilePos, Tile>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, pos: TilePos) -> Option<&Tile> {
        self.tiles.get(&pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TilePos, &Tile)> {
        self.tiles.iter().map(|(pos, tile)| (*pos, tile))
    }

    /// Folds a delta into the store. First write wins for every field.
    pub fn merge<'a, I>(&mut self, delta: I) -> MergeReport
    where
        I: IntoIterator<Item = (&'a TilePos, &'a TileRecord)>,
    {
        let mut report = MergeReport::default();
        for (pos, record) in delta {
            match self.tiles.get_mut(pos) {
                None => {
                    self.tiles.insert(*pos, Tile::from(record));
                    report.inserted += 1;
                }
                Some(tile) => {
                    let mut filled = false;
                    filled |= fill(&mut tile.is_mine, record.is_mine, *pos, TileField::IsMine, &mut report);
                    filled |= fill(
                        &mut tile.adjacent_mines,
                        record.adjacent_mines,
                        *pos,
                        TileField::AdjacentMines,
                        &mut report,
                    );
                    filled |= fill(&mut tile.owner, record.player_id, *pos, TileField::Owner, &mut report);
                    if filled {
                        report.filled += 1;
                    } else {
                        report.unchanged += 1;
                    }
                }
            }
        }
        report
    }

    /// Known tiles inside `area`.
    ///
    /// Looks up each position of the area when it holds fewer positions
    /// than the store, otherwise scans the store and filters.
    pub fn within(&self, area: &TileArea) -> Vec<(TilePos, &Tile)> {
        if area.tile_count() < self.tiles.len() as u64 {
            area.positions()
                .filter_map(|pos| self.tiles.get(&pos).map(|tile| (pos, tile)))
                .collect()
        } else {
            self.iter().filter(|(pos, _)| area.contains(*pos)).collect()
        }
    }

    /// Distinct owners of known tiles inside `area`.
    pub fn owners_within(&self, area: &TileArea) -> Vec<u32> {
        let mut owners: Vec<u32> = self
            .within(area)
            .into_iter()
            .filter_map(|(_, tile)| tile.owner)
            .collect();
        owners.sort_unstable();
        owners.dedup();
        owners
    }
}

fn fill<T: Copy + PartialEq>(
    slot: &mut Option<T>,
    incoming: Option<T>,
    pos: TilePos,
    field: TileField,
    report: &mut MergeReport,
) -> bool {
    match (*slot, incoming) {
        (None, Some(value)) => {
            *slot = Some(value);
            true
        }
        (Some(current), Some(value)) if current != value => {
            report
                .conflicts
                .push(ConsistencyError::TileConflict { pos, field });
            false
        }
        _ => false,
    }
}
