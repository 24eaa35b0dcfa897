use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::actions::GameAction;
use crate::game::state::Location;
use crate::net::snapshot::EffectSummary;

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Bind the connection to a save, loading it if needed
    Open { player: String, save: String },
    /// Periodic tick request
    Sync,
    /// Explicit player action
    Action(GameAction),
    /// Unload the session and persist it
    Close,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Session opened; the delta carries the full initial view
    Opened(SyncResponse),
    /// Result of a sync or an action
    Sync(SyncResponse),
    /// Request failed before producing a response
    Error { kind: ErrorKind, message: String },
    /// Session closed
    Closed,
    /// Pong response with server timestamp
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Re-open the session before retrying
    SessionNotFound,
    /// Too many sessions loaded
    Capacity,
    /// A message arrived before `Open`
    NotOpened,
    /// Undecodable frame
    Protocol,
    Internal,
}

/// Sync/action response payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    /// User-visible outcome or failure reason
    pub message: Option<String>,
    /// `None` when nothing observable changed
    pub delta: Option<Delta>,
    pub time_of_day: u32,
    pub current_day: u32,
    /// Threshold-crossing and effect messages, in order
    #[serde(default)]
    pub messages: Vec<String>,
    /// Non-fatal engine errors from this batch
    #[serde(default)]
    pub errors: Vec<String>,
    /// Time jumped discretely; the client clock must re-anchor
    #[serde(default)]
    pub force_resync: bool,
    /// Accrual stopped because the player has been idle too long
    #[serde(default)]
    pub auto_paused: bool,
}

// ============================================================================
// Delta
// ============================================================================

/// Sparse change set between two snapshots; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub character: Option<CharacterDelta>,
    pub location: Option<Location>,
    pub npcs: Option<NpcDelta>,
    pub buildings: Option<BuildingDelta>,
    pub inventory: Option<InventoryDelta>,
    pub equipment: Option<EquipmentDelta>,
    pub effects: Option<EffectsDelta>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.character.is_none()
            && self.location.is_none()
            && self.npcs.is_none()
            && self.buildings.is_none()
            && self.inventory.is_none()
            && self.equipment.is_none()
            && self.effects.is_none()
    }

    /// Number of present sections
    pub fn section_count(&self) -> usize {
        [
            self.character.is_some(),
            self.location.is_some(),
            self.npcs.is_some(),
            self.buildings.is_some(),
            self.inventory.is_some(),
            self.equipment.is_some(),
            self.effects.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Changed character scalars
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDelta {
    pub hp: Option<i32>,
    pub max_hp: Option<i32>,
    pub mana: Option<i32>,
    pub max_mana: Option<i32>,
    pub fatigue: Option<i32>,
    pub hunger: Option<i32>,
    pub gold: Option<i64>,
    pub xp: Option<i64>,
    pub time_of_day: Option<u32>,
    pub current_day: Option<u32>,
}

/// NPC presence as set differences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Changed building flags; `None` means the building is no longer listed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingDelta {
    pub state_changed: BTreeMap<String, Option<bool>>,
}

/// Changed inventory slots keyed by slot index
///
/// A length is present only when the container grew or shrank; slot changes
/// never address an index at or past the new length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    pub general_slots: BTreeMap<usize, SlotDelta>,
    pub backpack_slots: BTreeMap<usize, SlotDelta>,
    pub general_len: Option<usize>,
    pub backpack_len: Option<usize>,
}

/// One changed slot
///
/// `empty` clears the slot; otherwise only the present sub-fields changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDelta {
    pub item_id: Option<String>,
    pub quantity: Option<u32>,
    pub empty: bool,
}

/// Changed equipment slots; `None` means unequipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentDelta {
    pub changed: BTreeMap<String, Option<String>>,
}

/// Changed effect summaries; `None` means the effect is gone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectsDelta {
    pub changed: BTreeMap<String, Option<EffectSummary>>,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

/// JSON view of a response, for logging and HTTP-style clients
pub fn to_json(response: &SyncResponse) -> Result<String, EncodeError> {
    serde_json::to_string(response).map_err(|e| EncodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::SlotContainer;

    fn sample_delta() -> Delta {
        let mut delta = Delta::default();
        delta.character = Some(CharacterDelta {
            time_of_day: Some(10),
            current_day: Some(2),
            ..Default::default()
        });
        delta.npcs = Some(NpcDelta {
            added: vec!["c".to_string()],
            removed: vec!["a".to_string()],
        });
        let mut equipment = EquipmentDelta::default();
        equipment.changed.insert("mainHand".to_string(), None);
        delta.equipment = Some(equipment);
        let mut inventory = InventoryDelta::default();
        inventory.general_slots.insert(
            3,
            SlotDelta {
                quantity: Some(2),
                ..Default::default()
            },
        );
        delta.inventory = Some(inventory);
        delta
    }

    #[test]
    fn test_empty_delta() {
        assert!(Delta::default().is_empty());
        assert_eq!(Delta::default().section_count(), 0);
        assert_eq!(sample_delta().section_count(), 4);
    }

    #[test]
    fn test_encode_decode_client_message() {
        let msg = ClientMessage::Action(GameAction::UseItem {
            container: SlotContainer::Backpack,
            slot: 7,
        });
        let encoded = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_encode_decode_sync_response() {
        let response = SyncResponse {
            success: true,
            message: Some("You waited 20 minutes.".to_string()),
            delta: Some(sample_delta()),
            time_of_day: 10,
            current_day: 2,
            messages: vec!["You are now Hungry.".to_string()],
            force_resync: true,
            ..Default::default()
        };
        let encoded = encode(&ServerMessage::Sync(response.clone())).unwrap();
        let decoded: ServerMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, ServerMessage::Sync(response));
    }

    #[test]
    fn test_json_view_marks_unequipped_as_null() {
        let response = SyncResponse {
            success: true,
            delta: Some(sample_delta()),
            ..Default::default()
        };
        let json = to_json(&response).unwrap();
        assert!(json.contains(r#""changed":{"mainHand":null}"#));
        assert!(json.contains(r#""general_slots":{"3":{"item_id":null,"quantity":2,"empty":false}}"#));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<ClientMessage, _> = decode(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(result.is_err());
    }
}
