/// Session storage
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::app_state::TerminalSession;

/// In-place change applied under the repository lock
pub type SessionUpdate = Box<dyn FnOnce(&mut TerminalSession) + Send>;

/// Storage abstraction for sessions. Every read returns a snapshot.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or replace
    async fn save(&self, session: TerminalSession);

    async fn find_by_id(&self, id: &str) -> Option<TerminalSession>;

    async fn find_all(&self) -> Vec<TerminalSession>;

    async fn find_by_user_id(&self, user_id: &str) -> Vec<TerminalSession>;

    /// Apply `update` to the stored session and return the result
    async fn modify(&self, id: &str, update: SessionUpdate) -> Option<TerminalSession>;

    async fn delete(&self, id: &str) -> Option<TerminalSession>;

    async fn count(&self) -> usize;
}

/// Process-lifetime repository backed by a map
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, TerminalSession>>,
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, session: TerminalSession) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id().to_string(), session);
    }

    async fn find_by_id(&self, id: &str) -> Option<TerminalSession> {
        let sessions = self.sessions.lock().await;
        sessions.get(id).cloned()
    }

    async fn find_all(&self) -> Vec<TerminalSession> {
        let sessions = self.sessions.lock().await;
        sessions.values().cloned().collect()
    }

    async fn find_by_user_id(&self, user_id: &str) -> Vec<TerminalSession> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .filter(|session| session.user_id() == user_id)
            .cloned()
            .collect()
    }

    async fn modify(&self, id: &str, update: SessionUpdate) -> Option<TerminalSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(id)?;
        update(session);
        Some(session.clone())
    }

    async fn delete(&self, id: &str) -> Option<TerminalSession> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(id)
    }

    async fn count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::NewSession;
    use crate::config::TerminalSize;

    fn session(id: &str, user_id: &str) -> TerminalSession {
        TerminalSession::create(
            id.to_string(),
            NewSession {
                user_id: user_id.to_string(),
                title: None,
                working_directory: ".".to_string(),
                shell_type: "bash".to_string(),
                terminal_size: TerminalSize::default(),
            },
            1_000,
            60_000,
        )
    }

    #[tokio::test]
    async fn crud_round() {
        let repository = InMemorySessionRepository::default();
        repository.save(session("a", "u1")).await;
        repository.save(session("b", "u2")).await;
        repository.save(session("c", "u1")).await;
        assert_eq!(repository.count().await, 3);

        let mut mine: Vec<String> = repository
            .find_by_user_id("u1")
            .await
            .into_iter()
            .map(|s| s.id().to_string())
            .collect();
        mine.sort();
        assert_eq!(mine, vec!["a", "c"]);

        assert!(repository.delete("b").await.is_some());
        assert!(repository.find_by_id("b").await.is_none());
        assert!(repository.delete("b").await.is_none());
        assert_eq!(repository.find_all().await.len(), 2);
    }

    #[tokio::test]
    async fn snapshots_are_detached_from_storage() {
        let repository = InMemorySessionRepository::default();
        repository.save(session("a", "u1")).await;

        let mut snapshot = repository.find_by_id("a").await.unwrap();
        snapshot.terminate(2_000);
        assert!(repository.find_by_id("a").await.unwrap().status() != snapshot.status());

        let size = TerminalSize::new(40, 12).unwrap();
        let updated = repository
            .modify("a", Box::new(move |s: &mut TerminalSession| s.resize(size, 2_000)))
            .await
            .unwrap();
        assert_eq!(updated.terminal_size(), size);
        assert_eq!(repository.find_by_id("a").await.unwrap().terminal_size(), size);
        assert!(repository.modify("missing", Box::new(|_: &mut TerminalSession| {})).await.is_none());
    }
}
