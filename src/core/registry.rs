//! Session registry
//!
//! Owns every live [`Session`] and the focus pointer. Sessions are kept in
//! creation order; ids are the lowest unused positive integers so that the
//! grid slots and prefix digits stay small and stable.

use std::path::PathBuf;

use thiserror::Error;

use super::pty::PtyError;
use super::session::{Session, SessionId};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no session {0}")]
    NotFound(SessionId),
    #[error(transparent)]
    Pty(#[from] PtyError),
}

#[derive(Default)]
pub struct SessionRegistry {
    /// Creation order; display order for the grid and digit shortcuts.
    sessions: Vec<Session>,
    focused: Option<SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn focused_id(&self) -> Option<SessionId> {
        self.focused
    }

    pub fn focused_mut(&mut self) -> Option<&mut Session> {
        let id = self.focused?;
        self.get_mut(id)
    }

    /// Spawn a new session and focus it.
    pub fn create(
        &mut self,
        cwd: PathBuf,
        command: &str,
        args: &[String],
        rows: u16,
        cols: u16,
    ) -> Result<SessionId, RegistryError> {
        let id = self.next_id();
        let session = Session::spawn(id, cwd, command, args, rows, cols)?;
        self.sessions.push(session);
        self.focused = Some(id);
        tracing::info!("created session {}", id);
        Ok(id)
    }

    /// Remove a session. If it was focused, focus moves to the neighbor
    /// with the next lower id, falling back to the next higher one.
    pub fn delete(&mut self, id: SessionId) -> Result<(), RegistryError> {
        let idx = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or(RegistryError::NotFound(id))?;
        self.sessions.remove(idx);
        tracing::info!("deleted session {}", id);

        if self.focused == Some(id) {
            self.focused = self.neighbor_of(id);
        }
        Ok(())
    }

    pub fn focus(&mut self, id: SessionId) -> Result<(), RegistryError> {
        if self.get(id).is_none() {
            return Err(RegistryError::NotFound(id));
        }
        self.focused = Some(id);
        Ok(())
    }

    /// Focus the nth session in display order, 1-based.
    pub fn focus_nth(&mut self, n: usize) -> Result<SessionId, RegistryError> {
        let id = n
            .checked_sub(1)
            .and_then(|i| self.sessions.get(i))
            .map(|s| s.id)
            .ok_or(RegistryError::NotFound(n as SessionId))?;
        self.focused = Some(id);
        Ok(id)
    }

    /// Remove every session whose child has exited, returning their ids.
    /// Focus is repaired with the same neighbor rule as explicit deletion.
    pub fn reap_exited(&mut self) -> Vec<SessionId> {
        for session in &mut self.sessions {
            session.check_exit();
        }
        let dead: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| !s.alive())
            .map(|s| s.id)
            .collect();
        for id in &dead {
            // cannot fail, the id came from the list
            let _ = self.delete(*id);
        }
        dead
    }

    fn next_id(&self) -> SessionId {
        let mut id = 1;
        while self.sessions.iter().any(|s| s.id == id) {
            id += 1;
        }
        id
    }

    /// Id of the neighbor that inherits focus when `id` goes away:
    /// highest id below it, else lowest id above it.
    fn neighbor_of(&self, id: SessionId) -> Option<SessionId> {
        self.sessions
            .iter()
            .map(|s| s.id)
            .filter(|&other| other < id)
            .max()
            .or_else(|| {
                self.sessions
                    .iter()
                    .map(|s| s.id)
                    .filter(|&other| other > id)
                    .min()
            })
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn spawn_n(registry: &mut SessionRegistry, n: usize) {
        let cwd = std::env::current_dir().unwrap();
        for _ in 0..n {
            registry
                .create(cwd.clone(), "sleep", &["5".to_string()], 24, 80)
                .expect("spawn sleep");
        }
    }

    #[test]
    fn test_create_assigns_lowest_unused_id() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 3);
        assert_eq!(
            registry.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        registry.delete(2).unwrap();
        spawn_n(&mut registry, 1);
        // gap is reused
        assert_eq!(
            registry.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![1, 3, 2]
        );
    }

    #[test]
    fn test_create_focuses_new_session() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 2);
        assert_eq!(registry.focused_id(), Some(2));
    }

    #[test]
    fn test_delete_focused_prefers_lower_neighbor() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 3);
        registry.focus(2).unwrap();

        registry.delete(2).unwrap();
        assert_eq!(registry.focused_id(), Some(1));
    }

    #[test]
    fn test_delete_focused_falls_back_to_higher_neighbor() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 2);
        registry.focus(1).unwrap();

        registry.delete(1).unwrap();
        assert_eq!(registry.focused_id(), Some(2));
    }

    #[test]
    fn test_delete_last_session_clears_focus() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 1);
        registry.delete(1).unwrap();

        assert_eq!(registry.focused_id(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_delete_unfocused_keeps_focus() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 3);
        registry.focus(3).unwrap();

        registry.delete(1).unwrap();
        assert_eq!(registry.focused_id(), Some(3));
    }

    #[test]
    fn test_focus_nth_out_of_range_is_error() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 2);
        registry.focus(1).unwrap();

        assert!(matches!(
            registry.focus_nth(5),
            Err(RegistryError::NotFound(_))
        ));
        // focus untouched on failure
        assert_eq!(registry.focused_id(), Some(1));
    }

    #[test]
    fn test_focus_nth_uses_display_order() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 3);
        registry.delete(2).unwrap();
        spawn_n(&mut registry, 1); // id 2, display position 3

        assert_eq!(registry.focus_nth(3).unwrap(), 2);
    }

    #[test]
    fn test_focus_unknown_id_is_error() {
        let mut registry = SessionRegistry::new();
        spawn_n(&mut registry, 1);
        assert!(matches!(registry.focus(9), Err(RegistryError::NotFound(9))));
    }
}
