//! Per-participant ephemeral state (who is here, where their cursor is).
//!
//! Presence is keyed by the shared text's client id and never persisted.
//! Remote entries arrive as JSON over whatever side channel the host uses
//! and are applied with [`PresenceStore::apply_remote_json`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ClientId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub color: String,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self {
            name: "Anonymous".to_string(),
            color: "#4f46e5".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorInfo {
    /// Text offset, for text surfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl CursorInfo {
    /// A diagram-surface cursor stamped with the current time.
    pub fn at(x: f64, y: f64, cell_id: Option<String>) -> Self {
        Self {
            position: None,
            x,
            y,
            cell_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorInfo>,
}

/// Another participant's cursor, in the shape the diagram surface draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCursor {
    pub client_id: ClientId,
    pub name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PresenceStore {
    local_id: ClientId,
    states: BTreeMap<ClientId, PresenceState>,
}

impl PresenceStore {
    pub fn new(local_id: ClientId) -> Self {
        Self {
            local_id,
            states: BTreeMap::new(),
        }
    }

    pub fn local_id(&self) -> ClientId {
        self.local_id
    }

    pub fn local(&self) -> Option<&PresenceState> {
        self.states.get(&self.local_id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&PresenceState> {
        self.states.get(&client_id)
    }

    pub fn set_local_user(&mut self, user: UserInfo) {
        self.states.entry(self.local_id).or_default().user = Some(user);
    }

    pub fn set_local_cursor(&mut self, cursor: CursorInfo) {
        self.states.entry(self.local_id).or_default().cursor = Some(cursor);
    }

    /// Clear every local field (on teardown).
    pub fn clear_local(&mut self) {
        self.states.remove(&self.local_id);
    }

    /// Replace a remote participant's state; `None` means they left.
    pub fn apply_remote(&mut self, client_id: ClientId, state: Option<PresenceState>) {
        if client_id == self.local_id {
            tracing::debug!("Ignoring remote presence for local client {}", client_id);
            return;
        }
        match state {
            Some(state) => {
                self.states.insert(client_id, state);
            }
            None => {
                self.states.remove(&client_id);
            }
        }
    }

    pub fn apply_remote_json(&mut self, client_id: ClientId, json: &str) -> Result<(), serde_json::Error> {
        let state: Option<PresenceState> = serde_json::from_str(json)?;
        self.apply_remote(client_id, state);
        Ok(())
    }

    /// The local state, for transport.
    pub fn encode_local(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.local())
    }

    /// Drop remote entries whose cursor is older than `max_age_ms`.
    pub fn prune_stale(&mut self, now_ms: i64, max_age_ms: i64) -> usize {
        let local_id = self.local_id;
        let before = self.states.len();
        self.states.retain(|id, state| {
            *id == local_id
                || state
                    .cursor
                    .as_ref()
                    .map_or(true, |c| now_ms - c.timestamp <= max_age_ms)
        });
        before - self.states.len()
    }

    /// Cursors of every other participant that has both a user and a cursor.
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.states
            .iter()
            .filter(|(id, _)| **id != self.local_id)
            .filter_map(|(id, state)| {
                let user = state.user.as_ref()?;
                let cursor = state.cursor.as_ref()?;
                Some(RemoteCursor {
                    client_id: *id,
                    name: user.name.clone(),
                    color: user.color.clone(),
                    x: cursor.x,
                    y: cursor.y,
                    cell_id: cursor.cell_id.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_state(name: &str, x: f64) -> PresenceState {
        PresenceState {
            user: Some(UserInfo {
                name: name.to_string(),
                color: "#ff0000".to_string(),
            }),
            cursor: Some(CursorInfo::at(x, 1.0, None)),
        }
    }

    #[test]
    fn test_remote_cursors_exclude_local() {
        let mut store = PresenceStore::new(1);
        store.set_local_user(UserInfo::default());
        store.set_local_cursor(CursorInfo::at(0.0, 0.0, None));
        store.apply_remote(3, Some(remote_state("carol", 30.0)));
        store.apply_remote(2, Some(remote_state("bob", 20.0)));

        let cursors = store.remote_cursors();
        let names: Vec<_> = cursors.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);
    }

    #[test]
    fn test_participant_without_cursor_is_not_drawn() {
        let mut store = PresenceStore::new(1);
        store.apply_remote(
            2,
            Some(PresenceState {
                user: Some(UserInfo::default()),
                cursor: None,
            }),
        );
        assert!(store.remote_cursors().is_empty());
    }

    #[test]
    fn test_json_transport() {
        let mut alice = PresenceStore::new(1);
        alice.set_local_user(UserInfo {
            name: "alice".to_string(),
            color: "#00ff00".to_string(),
        });
        alice.set_local_cursor(CursorInfo::at(5.0, 6.0, Some("cell-2".to_string())));

        let mut bob = PresenceStore::new(2);
        bob.apply_remote_json(1, &alice.encode_local().unwrap()).unwrap();
        assert_eq!(bob.get(1), alice.local());

        // null means the participant left
        bob.apply_remote_json(1, "null").unwrap();
        assert!(bob.get(1).is_none());
        assert!(bob.apply_remote_json(1, "{not json").is_err());
    }

    #[test]
    fn test_remote_update_cannot_overwrite_local() {
        let mut store = PresenceStore::new(1);
        store.set_local_user(UserInfo::default());
        store.apply_remote(1, None);
        assert!(store.local().is_some());
    }

    #[test]
    fn test_clear_local_and_prune() {
        let mut store = PresenceStore::new(1);
        store.set_local_user(UserInfo::default());
        let mut old = remote_state("old", 1.0);
        if let Some(cursor) = old.cursor.as_mut() {
            cursor.timestamp = 1_000;
        }
        store.apply_remote(2, Some(old));
        store.apply_remote(3, Some(remote_state("fresh", 2.0)));

        let now = chrono::Utc::now().timestamp_millis();
        assert_eq!(store.prune_stale(now, 60_000), 1);
        assert!(store.get(3).is_some());

        store.clear_local();
        assert!(store.local().is_none());
    }
}
