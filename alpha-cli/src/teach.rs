use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the single document holding every teach note.
pub const STORAGE_KEY: &str = "alpha_teach";

/// question (trimmed, lower-cased) -> answer type -> answer
pub type TeachNotes = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Error)]
pub enum TeachError {
    #[error("Please fill in all fields")]
    MissingField,
    #[error("Failed to access teach notes: {0}")]
    Storage(#[from] io::Error),
    #[error("Teach notes are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Raw key-value slot the notes document lives in.
pub trait NoteStorage: Send {
    fn read(&self) -> io::Result<Option<String>>;
    fn write(&self, contents: &str) -> io::Result<()>;
}

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("alpha-chat").join(format!("{}.json", STORAGE_KEY)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NoteStorage for FileStorage {
    fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)
    }
}

/// In-memory slot. Clones share the same contents.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryStorage {
    contents: Arc<Mutex<Option<String>>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().map(|slot| slot.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl NoteStorage for MemoryStorage {
    fn read(&self) -> io::Result<Option<String>> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> io::Result<()> {
        let mut slot = self
            .contents
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory storage poisoned"))?;
        *slot = Some(contents.to_string());
        Ok(())
    }
}

pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// User-taught answers, kept apart from the relay.
///
/// Every save reads the whole document, merges one answer, and writes it
/// back. Two processes saving at once can lose one of the updates.
pub struct TeachStore {
    storage: Box<dyn NoteStorage>,
}

impl TeachStore {
    pub fn new(storage: Box<dyn NoteStorage>) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> Result<TeachNotes, TeachError> {
        match self.storage.read()? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(TeachNotes::new()),
        }
    }

    pub fn lookup(&self, question: &str) -> Result<Option<BTreeMap<String, String>>, TeachError> {
        Ok(self.load()?.remove(&normalize_question(question)))
    }

    pub fn save(&self, question: &str, answer_type: &str, answer_text: &str) -> Result<(), TeachError> {
        let key = normalize_question(question);
        let answer = answer_text.trim();
        if key.is_empty() || answer.is_empty() {
            return Err(TeachError::MissingField);
        }

        let mut notes = self.load()?;
        notes
            .entry(key.clone())
            .or_default()
            .insert(answer_type.to_string(), answer.to_string());
        self.storage.write(&serde_json::to_string(&notes)?)?;

        info!("Saved teach note for {:?} ({})", key, answer_type);
        debug!("Teach notes now hold {} questions", notes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memory_store() -> (TeachStore, MemoryStorage) {
        let storage = MemoryStorage::default();
        (TeachStore::new(Box::new(storage.clone())), storage)
    }

    #[test]
    fn save_then_read_uses_normalized_question() {
        let (store, _) = memory_store();
        store.save("  What Is Rust?  ", "general", " A language ").unwrap();

        let notes = store.load().unwrap();
        assert_eq!(notes["what is rust?"]["general"], "A language");
        assert_eq!(
            store.lookup("WHAT IS RUST?").unwrap().unwrap()["general"],
            "A language"
        );
    }

    #[test]
    fn second_type_for_same_question_is_merged() {
        let (store, _) = memory_store();
        store.save("What is Rust?", "general", "A language").unwrap();
        store.save("what is rust?", "developer", "A systems language").unwrap();

        let entry = store.lookup("What is Rust?").unwrap().unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(entry["general"], "A language");
        assert_eq!(entry["developer"], "A systems language");
    }

    #[test]
    fn saving_same_note_twice_is_idempotent() {
        let (store, storage) = memory_store();
        store.save("q", "general", "a").unwrap();
        let first = storage.contents();

        store.save("q", "general", "a").unwrap();
        assert_eq!(storage.contents(), first);
    }

    #[test]
    fn empty_fields_are_a_validation_error_and_leave_store_untouched() {
        let (store, storage) = memory_store();
        store.save("kept", "general", "yes").unwrap();
        let before = storage.contents();

        for (question, answer) in [("", "a"), ("   ", "a"), ("q", ""), ("q", "  \n")] {
            let err = store.save(question, "general", answer).unwrap_err();
            assert!(matches!(err, TeachError::MissingField));
            assert_eq!(err.to_string(), "Please fill in all fields");
        }
        assert_eq!(storage.contents(), before);
    }

    #[test]
    fn empty_storage_loads_as_no_notes() {
        let (store, _) = memory_store();
        assert!(store.load().unwrap().is_empty());
        assert!(store.lookup("anything").unwrap().is_none());
    }

    #[test]
    fn corrupt_document_is_reported() {
        let storage = MemoryStorage::default();
        storage.write("{not json").unwrap();
        let store = TeachStore::new(Box::new(storage));

        assert!(matches!(store.load(), Err(TeachError::Corrupt(_))));
        assert!(matches!(store.save("q", "general", "a"), Err(TeachError::Corrupt(_))));
    }

    #[test]
    fn file_storage_persists_across_stores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("alpha_teach.json");

        TeachStore::new(Box::new(FileStorage::new(&path)))
            .save("Capital of France?", "student", "Paris")
            .unwrap();

        let reopened = TeachStore::new(Box::new(FileStorage::new(&path)));
        assert_eq!(
            reopened.lookup("capital of france?").unwrap().unwrap()["student"],
            "Paris"
        );

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"capital of france?":{"student":"Paris"}}"#);
    }
}
