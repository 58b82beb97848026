//! Registry of every player named by a server delta.

use crate::error::ConsistencyError;
use log::warn;
use shared::{PlayerRecord, ANONYMOUS_NAME};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Below this much elapsed play time the tiles-per-hour rate is reported as
/// zero instead of dividing by a vanishing interval.
pub const MIN_RATE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub score: u64,
    pub join_time: SystemTime,
}

impl Player {
    fn from_record(id: u32, record: &PlayerRecord, previous_name: Option<&str>) -> Self {
        let name = record
            .name
            .as_deref()
            .or(previous_name)
            .map(normalize_name)
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string());
        Self {
            id,
            name,
            color: record.color.clone(),
            score: record.score,
            join_time: epoch_seconds(record.join_time),
        }
    }

    /// Play time up to `now`; zero if the join time lies in the future.
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        now.duration_since(self.join_time).unwrap_or_default()
    }

    /// Tiles revealed per hour since joining.
    ///
    /// Returns `0.0` while less than [`MIN_RATE_WINDOW`] has elapsed, which
    /// also covers clock skew putting `join_time` after `now`.
    pub fn tiles_per_hour(&self, now: SystemTime) -> f64 {
        let elapsed = self.elapsed(now);
        if elapsed < MIN_RATE_WINDOW {
            return 0.0;
        }
        self.score as f64 / (elapsed.as_secs_f64() / 3600.0)
    }
}

fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        ANONYMOUS_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Join instant from epoch seconds. Anything that is not a representable
/// instant after the epoch falls back to the epoch itself.
fn epoch_seconds(seconds: f64) -> SystemTime {
    if seconds == 0.0 {
        return UNIX_EPOCH;
    }
    let instant = Duration::try_from_secs_f64(seconds)
        .ok()
        .and_then(|since| UNIX_EPOCH.checked_add(since));
    instant.unwrap_or_else(|| {
        warn!("Unusable join time {}, using the epoch", seconds);
        UNIX_EPOCH
    })
}

#[derive(Debug, Default, Clone)]
pub struct PlayerRegistry {
    players: HashMap<u32, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Replaces each named player with the record from the delta.
    ///
    /// A record without a name keeps the name already known, since renames
    /// arrive separately through `NicknameUpdated`. Id 0 is rejected.
    pub fn merge<'a, I>(&mut self, delta: I) -> Vec<ConsistencyError>
    where
        I: IntoIterator<Item = (&'a u32, &'a PlayerRecord)>,
    {
        let mut errors = Vec::new();
        for (&id, record) in delta {
            if id == 0 {
                errors.push(ConsistencyError::InvalidPlayerId);
                continue;
            }
            let previous_name = self.players.get(&id).map(|p| p.name.clone());
            let player = Player::from_record(id, record, previous_name.as_deref());
            self.players.insert(id, player);
        }
        errors
    }

    /// Sets a player's display name. Empty names become the anonymous name.
    pub fn rename(&mut self, id: u32, name: &str) -> Result<(), ConsistencyError> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(ConsistencyError::MissingPlayer { player_id: id })?;
        player.name = normalize_name(name);
        Ok(())
    }
}
