//! Note records and the store they live in.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// A stored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub title: String,
    pub body: String,
    /// Subject of the token that created the note.
    pub by: String,
}

/// A note that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub title: String,
    pub body: String,
    pub by: String,
}

/// Storage for notes. Ids are assigned by the store, starting at 1.
pub trait NoteStore: Send + Sync {
    fn insert(&self, note: NewNote) -> Note;

    fn list(&self) -> Vec<Note>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store. Each service instance has its own.
#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: RwLock<Vec<Note>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NoteStore for MemoryNoteStore {
    fn insert(&self, note: NewNote) -> Note {
        let mut notes = self.notes.write().unwrap_or_else(PoisonError::into_inner);
        let note = Note {
            id: notes.len() as u64 + 1,
            title: note.title,
            body: note.body,
            by: note.by,
        };
        notes.push(note.clone());
        note
    }

    fn list(&self) -> Vec<Note> {
        self.notes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn len(&self) -> usize {
        self.notes.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn new_note(title: &str) -> NewNote {
        NewNote {
            title: title.to_string(),
            body: "body".to_string(),
            by: "student".to_string(),
        }
    }

    #[test]
    fn test_ids_increment_from_one() {
        let store = MemoryNoteStore::new();
        assert!(store.is_empty());

        assert_eq!(store.insert(new_note("a")).id, 1);
        assert_eq!(store.insert(new_note("b")).id, 2);

        let notes = store.list();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].title, "b");
        assert_eq!(notes[1].by, "student");
    }

    #[test]
    fn test_concurrent_inserts_get_unique_ids() {
        let store = Arc::new(MemoryNoteStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    (0..25).map(|_| store.insert(new_note("n")).id).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=100).collect::<Vec<_>>());
    }
}
