//! Note storage.

pub mod store;

pub use store::{MemoryNoteStore, NewNote, Note, NoteStore};
