//! Process-wide registry of live connections: which user a socket speaks for
//! and which chat rooms it has joined. Entries exist only for the lifetime of
//! a connection and are never persisted.

use std::collections::HashSet;

use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct PresenceHub {
    user_sockets: DashMap<Uuid, String>,
    socket_users: DashMap<String, Uuid>,
    socket_chats: DashMap<String, HashSet<Uuid>>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a socket to an authenticated user. A fresh connection from the
    /// same user replaces the previous binding (last connection wins).
    pub fn authenticate(&self, socket_id: &str, user_id: Uuid) {
        if let Some(previous) = self.user_sockets.insert(user_id, socket_id.to_string()) {
            if previous != socket_id {
                self.socket_users.remove(&previous);
            }
        }
        self.socket_users.insert(socket_id.to_string(), user_id);
    }

    /// The user a socket authenticated as, if any.
    pub fn user_for(&self, socket_id: &str) -> Option<Uuid> {
        self.socket_users.get(socket_id).map(|e| *e.value())
    }

    pub fn join_chat(&self, socket_id: &str, chat_id: Uuid) {
        self.socket_chats
            .entry(socket_id.to_string())
            .or_default()
            .insert(chat_id);
    }

    pub fn leave_chat(&self, socket_id: &str, chat_id: Uuid) {
        if let Some(mut chats) = self.socket_chats.get_mut(socket_id) {
            chats.remove(&chat_id);
        }
    }

    pub fn chats_for(&self, socket_id: &str) -> Vec<Uuid> {
        self.socket_chats
            .get(socket_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop everything the socket owned. Cleanup only; chat state is never
    /// mutated on disconnect. Returns the user the socket belonged to.
    pub fn disconnect(&self, socket_id: &str) -> Option<Uuid> {
        self.socket_chats.remove(socket_id);
        let user_id = self.socket_users.remove(socket_id).map(|(_, u)| u)?;
        // only unbind the user if this socket still holds the binding
        self.user_sockets
            .remove_if(&user_id, |_, sid| sid == socket_id);
        Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_and_lookup() {
        let hub = PresenceHub::new();
        let user = Uuid::new_v4();

        hub.authenticate("s1", user);

        assert_eq!(hub.user_for("s1"), Some(user));
        assert_eq!(hub.user_for("s2"), None);
    }

    #[test]
    fn reconnect_replaces_previous_socket() {
        let hub = PresenceHub::new();
        let user = Uuid::new_v4();

        hub.authenticate("s1", user);
        hub.authenticate("s2", user);

        assert_eq!(hub.user_for("s1"), None);
        assert_eq!(hub.user_for("s2"), Some(user));

        // a stale disconnect from the old socket must not unbind the new one
        hub.disconnect("s1");
        assert_eq!(hub.user_for("s2"), Some(user));
    }

    #[test]
    fn join_and_leave_chats() {
        let hub = PresenceHub::new();
        let chat_a = Uuid::new_v4();
        let chat_b = Uuid::new_v4();

        hub.join_chat("s1", chat_a);
        hub.join_chat("s1", chat_b);
        let mut chats = hub.chats_for("s1");
        chats.sort();
        let mut expected = vec![chat_a, chat_b];
        expected.sort();
        assert_eq!(chats, expected);

        hub.leave_chat("s1", chat_a);
        assert_eq!(hub.chats_for("s1"), vec![chat_b]);
    }

    #[test]
    fn disconnect_cleans_everything() {
        let hub = PresenceHub::new();
        let user = Uuid::new_v4();
        let chat = Uuid::new_v4();

        hub.authenticate("s1", user);
        hub.join_chat("s1", chat);

        assert_eq!(hub.disconnect("s1"), Some(user));
        assert_eq!(hub.user_for("s1"), None);
        assert!(hub.chats_for("s1").is_empty());
        assert_eq!(hub.disconnect("s1"), None);
    }
}
