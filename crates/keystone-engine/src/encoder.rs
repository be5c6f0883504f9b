//! JSON view encoder.
//!
//! Stands in for a binary wire codec: each player's update is a JSON
//! document describing the player itself and every player and NPC within
//! viewing distance.

use keystone_core::actor::{Actor, Mob};
use keystone_core::collab::{EncodeError, UpdateEncoder};
use keystone_core::sync::PlayerView;
use keystone_types::{ActorIndex, Direction, Position, UpdateFlag};
use serde::Serialize;

/// One actor as seen by a player.
#[derive(Debug, Serialize)]
struct LocalActor {
    index: Option<ActorIndex>,
    position: Position,
    walk: Option<Direction>,
    run: Option<Direction>,
    flags: Vec<UpdateFlag>,
}

impl LocalActor {
    fn of(mob: &Mob) -> Self {
        let step = mob.last_step();
        Self {
            index: mob.index(),
            position: mob.position(),
            walk: step.map(|s| s.walk),
            run: step.and_then(|s| s.run),
            flags: mob.flags.iter().collect(),
        }
    }
}

/// Full update document for one player.
#[derive(Debug, Serialize)]
struct ViewPayload<'a> {
    tick: u64,
    #[serde(rename = "self")]
    own: LocalActor,
    region_base: Option<Position>,
    chat: Option<&'a str>,
    players: Vec<LocalActor>,
    npcs: Vec<LocalActor>,
}

/// Serializes player views as JSON with `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonViewEncoder;

impl UpdateEncoder for JsonViewEncoder {
    fn encode(&self, player: &Mob, view: &PlayerView<'_>) -> Result<Vec<u8>, EncodeError> {
        let data = player.as_player();
        let payload = ViewPayload {
            tick: view.tick,
            own: LocalActor::of(player),
            region_base: data.filter(|p| p.region_changed).and_then(|p| p.last_region),
            chat: data.and_then(|p| p.chat.as_deref()),
            players: view.local_players(player).into_iter().map(LocalActor::of).collect(),
            npcs: view.local_npcs(player).into_iter().map(LocalActor::of).collect(),
        };
        serde_json::to_vec(&payload).map_err(|e| EncodeError::Serialize {
            index: player.index().unwrap_or(ActorIndex(u16::MAX)),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keystone_core::actor::Credentials;
    use keystone_core::registry::Registry;
    use keystone_types::EntityType;
    use keystone_world::SpatialIndex;

    use super::*;

    #[test]
    fn payload_lists_local_actors() {
        let mut players = Registry::new(8);
        let mut npcs = Registry::new(8);
        let mut spatial = SpatialIndex::new();

        let mut viewer = Mob::player(Credentials::new("v", "pw"), Position::new(3200, 3200, 0));
        viewer.chat("hi");
        let viewer_id = viewer.id();
        let npc = Mob::npc(9, Position::new(3205, 3203, 0));
        spatial.register_at(viewer_id, EntityType::Player, viewer.position()).unwrap();
        spatial.register_at(npc.id(), EntityType::Npc, npc.position()).unwrap();
        players.add(viewer).unwrap();
        npcs.add(npc).unwrap();

        let view = PlayerView {
            players: &players,
            npcs: &npcs,
            spatial: &spatial,
            viewing_distance: 15,
            tick: 12,
        };
        let viewer = players.get_by_id(viewer_id).unwrap();
        let bytes = JsonViewEncoder.encode(viewer, &view).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["tick"], 12);
        assert_eq!(json["chat"], "hi");
        assert_eq!(json["self"]["index"], 0);
        assert_eq!(json["players"].as_array().unwrap().len(), 0);
        assert_eq!(json["npcs"].as_array().unwrap().len(), 1);
        assert_eq!(json["npcs"][0]["position"]["x"], 3205);
        assert_eq!(json["self"]["flags"][0], "Chat");
    }
}
