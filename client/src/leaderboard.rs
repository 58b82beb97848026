//! Leaderboard row selection.
//!
//! Produces the rows to show, not how to show them: the current player with
//! their neighbours in the ranking, the leader, and anyone who owns a tile on
//! screen. Each player appears at most once.

use crate::players::{Player, PlayerRegistry};
use crate::tiles::TileStore;
use shared::TileArea;
use std::cmp::Ordering;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Score,
    TilesPerHour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    /// 1-based position in the full sorted ranking.
    pub rank: usize,
    pub player_id: u32,
    pub name: String,
    pub color: String,
    pub score: u64,
    pub elapsed: String,
    pub tiles_per_hour: f64,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct Leaderboard {
    pub sort_key: SortKey,
    pub order: SortOrder,
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self {
            sort_key: SortKey::Score,
            order: SortOrder::Descending,
        }
    }
}

impl Leaderboard {
    /// Selects a sort key; picking the active key again flips the order.
    pub fn sort_by(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.order = match self.order {
                SortOrder::Ascending => SortOrder::Descending,
                SortOrder::Descending => SortOrder::Ascending,
            };
        } else {
            self.sort_key = key;
        }
    }

    /// Every player in ranking order.
    pub fn ranked<'a>(&self, players: &'a PlayerRegistry, now: SystemTime) -> Vec<&'a Player> {
        let mut ranked: Vec<&Player> = players.iter().collect();
        ranked.sort_by(|a, b| {
            let ordering = match self.sort_key {
                SortKey::Score => a.score.cmp(&b.score),
                SortKey::TilesPerHour => a
                    .tiles_per_hour(now)
                    .partial_cmp(&b.tiles_per_hour(now))
                    .unwrap_or(Ordering::Equal),
            };
            let ordering = match self.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            // Ties keep a stable order across frames.
            ordering.then(a.id.cmp(&b.id))
        });
        ranked
    }

    pub fn rows(
        &self,
        players: &PlayerRegistry,
        tiles: &TileStore,
        current: Option<u32>,
        visible: &TileArea,
        now: SystemTime,
    ) -> Vec<LeaderboardRow> {
        let ranked = self.ranked(players, now);
        if ranked.is_empty() {
            return Vec::new();
        }

        let mut picked: Vec<usize> = Vec::new();
        let mut pick = |index: usize| {
            if !picked.contains(&index) {
                picked.push(index);
            }
        };

        if let Some(index) = current.and_then(|id| ranked.iter().position(|p| p.id == id)) {
            if index > 0 {
                pick(index - 1);
            }
            pick(index);
            if index + 1 < ranked.len() {
                pick(index + 1);
            }
        }
        pick(0);

        let on_screen = tiles.owners_within(visible);
        for (index, player) in ranked.iter().enumerate() {
            if on_screen.binary_search(&player.id).is_ok() {
                pick(index);
            }
        }

        picked
            .into_iter()
            .map(|index| {
                let player = ranked[index];
                LeaderboardRow {
                    rank: index + 1,
                    player_id: player.id,
                    name: player.name.clone(),
                    color: player.color.clone(),
                    score: player.score,
                    elapsed: format_elapsed(player.elapsed(now)),
                    tiles_per_hour: player.tiles_per_hour(now),
                    is_current: Some(player.id) == current,
                }
            })
            .collect()
    }
}

/// Formats play time as `"1h 2m 3s"`, dropping leading zero units.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
