//! Wire protocol shared between the sweeper client and server.
//!
//! Outbound intents are JSON objects tagged by `action_type`. Inbound
//! responses are single-key JSON objects whose key names the message type.
//! Tile maps are keyed by the canonical `"x,y"` text form of a [`TilePos`],
//! player maps by the decimal player id.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name a player gets when the server sends no (or an empty) name.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Grid coordinate of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TilePos {
    pub x: i64,
    pub y: i64,
}

impl TilePos {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tile key {0:?}, expected \"x,y\"")]
pub struct ParsePosError(pub String);

impl FromStr for TilePos {
    type Err = ParsePosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePosError(s.to_string());
        let (x, y) = s.split_once(',').ok_or_else(err)?;
        let x = x.trim().parse().map_err(|_| err())?;
        let y = y.trim().parse().map_err(|_| err())?;
        Ok(TilePos { x, y })
    }
}

// Positions travel as `[x, y]` everywhere except as map keys.
impl Serialize for TilePos {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.x, self.y].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TilePos {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [x, y] = <[i64; 2]>::deserialize(deserializer)?;
        Ok(TilePos { x, y })
    }
}

/// Inclusive rectangle of tiles, `[[x0, y0], [x1, y1]]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileArea {
    pub min: TilePos,
    pub max: TilePos,
}

impl TileArea {
    pub const fn new(min: TilePos, max: TilePos) -> Self {
        Self { min, max }
    }

    pub fn from_corners(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self::new(TilePos::new(x0, y0), TilePos::new(x1, y1))
    }

    pub fn width(&self) -> i64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i64 {
        self.max.y - self.min.y
    }

    /// True when the area spans at least one tile edge in both directions.
    pub fn is_proper(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    /// Number of positions covered, saturating for absurdly large areas.
    pub fn tile_count(&self) -> u64 {
        if self.max.x < self.min.x || self.max.y < self.min.y {
            return 0;
        }
        let w = self.max.x.abs_diff(self.min.x).saturating_add(1);
        let h = self.max.y.abs_diff(self.min.y).saturating_add(1);
        w.saturating_mul(h)
    }

    pub fn contains(&self, pos: TilePos) -> bool {
        pos.x >= self.min.x && pos.x <= self.max.x && pos.y >= self.min.y && pos.y <= self.max.y
    }

    /// Row-major iteration over every covered position.
    pub fn positions(&self) -> impl Iterator<Item = TilePos> {
        let area = *self;
        (area.min.y..=area.max.y)
            .flat_map(move |y| (area.min.x..=area.max.x).map(move |x| TilePos::new(x, y)))
    }
}

impl Serialize for TileArea {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.min, self.max].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TileArea {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [min, max] = <[TilePos; 2]>::deserialize(deserializer)?;
        Ok(TileArea { min, max })
    }
}

/// Partial tile facts as sent by the server. Absent fields are unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mine: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjacent_mines: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<u32>,
}

impl TileRecord {
    pub fn revealed(is_mine: bool, adjacent_mines: u8, player_id: u32) -> Self {
        Self {
            is_mine: Some(is_mine),
            adjacent_mines: Some(adjacent_mines),
            player_id: Some(player_id),
        }
    }
}

/// Player metadata as sent by the server. `join_time` is in epoch seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub join_time: f64,
}

pub type TileMap = HashMap<TilePos, TileRecord>;
pub type PlayerMap = HashMap<u32, PlayerRecord>;

/// Serde adapter for tile maps keyed by `"x,y"` strings.
pub mod tile_map {
    use super::{TileMap, TilePos, TileRecord};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S: Serializer>(tiles: &TileMap, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(tiles.iter().map(|(pos, tile)| (pos.to_string(), tile)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TileMap, D::Error> {
        let raw = HashMap::<String, TileRecord>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, tile)| {
                key.parse::<TilePos>()
                    .map(|pos| (pos, tile))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

/// Intents sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type")]
pub enum ClientAction {
    Join {
        visible_area: TileArea,
        token: Option<String>,
    },
    Update {
        area_to_update: TileArea,
    },
    Uncover {
        player_id: u32,
        token: String,
        position: TilePos,
        visible_area: TileArea,
    },
    UpdateNickname {
        player_id: u32,
        token: String,
        new_name: String,
    },
}

impl ClientAction {
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::Join { .. } => "Join",
            ClientAction::Update { .. } => "Update",
            ClientAction::Uncover { .. } => "Uncover",
            ClientAction::UpdateNickname { .. } => "UpdateNickname",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedPayload {
    pub player_id: u32,
    pub token: String,
    pub update_area: TileArea,
    #[serde(default, with = "tile_map")]
    pub tiles: TileMap,
    #[serde(default)]
    pub players: PlayerMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_area: Option<TileArea>,
    #[serde(default, with = "tile_map")]
    pub tiles: TileMap,
    #[serde(default)]
    pub players: PlayerMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UncoveredPayload {
    #[serde(default, with = "tile_map")]
    pub tiles: TileMap,
    #[serde(default)]
    pub players: PlayerMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicknameUpdatedPayload {
    pub player_id: u32,
    pub new_name: String,
    #[serde(default, with = "tile_map")]
    pub tiles: TileMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Responses sent from the server, one variant per top-level tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Joined(JoinedPayload),
    Updated(UpdatedPayload),
    Uncovered(UncoveredPayload),
    NicknameUpdated(NicknameUpdatedPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Joined,
    Updated,
    Uncovered,
    NicknameUpdated,
    Error,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Joined,
        MessageKind::Updated,
        MessageKind::Uncovered,
        MessageKind::NicknameUpdated,
        MessageKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Joined => "Joined",
            MessageKind::Updated => "Updated",
            MessageKind::Uncovered => "Uncovered",
            MessageKind::NicknameUpdated => "NicknameUpdated",
            MessageKind::Error => "Error",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message must have exactly one top-level key, found {0}")]
    TagCount(usize),
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ServerMessage {
    /// Decodes one inbound text frame into a typed message.
    ///
    /// The tag is inspected before the payload so an unrecognised type is
    /// reported as such instead of as a generic parse failure.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
        if object.len() != 1 {
            return Err(DecodeError::TagCount(object.len()));
        }
        let tag = object.keys().next().cloned().unwrap_or_default();
        let kind = MessageKind::from_tag(&tag).ok_or(DecodeError::UnknownType(tag))?;
        serde_json::from_value(value).map_err(|source| DecodeError::Payload { kind, source })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Joined(_) => MessageKind::Joined,
            ServerMessage::Updated(_) => MessageKind::Updated,
            ServerMessage::Uncovered(_) => MessageKind::Uncovered,
            ServerMessage::NicknameUpdated(_) => MessageKind::NicknameUpdated,
            ServerMessage::Error(_) => MessageKind::Error,
        }
    }

    /// Tile delta carried by the message, if the type carries one.
    pub fn tiles(&self) -> Option<&TileMap> {
        match self {
            ServerMessage::Joined(p) => Some(&p.tiles),
            ServerMessage::Updated(p) => Some(&p.tiles),
            ServerMessage::Uncovered(p) => Some(&p.tiles),
            ServerMessage::NicknameUpdated(p) => Some(&p.tiles),
            ServerMessage::Error(_) => None,
        }
    }

    /// Player delta carried by the message, if the type carries one.
    pub fn players(&self) -> Option<&PlayerMap> {
        match self {
            ServerMessage::Joined(p) => Some(&p.players),
            ServerMessage::Updated(p) => Some(&p.players),
            ServerMessage::Uncovered(p) => Some(&p.players),
            ServerMessage::NicknameUpdated(_) | ServerMessage::Error(_) => None,
        }
    }
}
