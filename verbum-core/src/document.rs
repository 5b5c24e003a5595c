// Keyed documents: commentaries, dictionaries, plain text books

use crate::error::{Error, Result};
use crate::position::KeyRef;
use serde::{Deserialize, Serialize};

/// One named entry of a keyed document, read paragraph by paragraph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentKey {
    pub name: String,
    pub paragraphs: Vec<String>,
}

impl DocumentKey {
    pub fn new(name: impl Into<String>, paragraphs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            paragraphs,
        }
    }

    fn paragraph_count(&self) -> u32 {
        self.paragraphs.len().max(1) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDocument {
    pub id: String,
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    keys: Vec<DocumentKey>,
}

fn default_language() -> String {
    "en".to_string()
}

impl KeyDocument {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        language: impl Into<String>,
        keys: Vec<DocumentKey>,
    ) -> Result<Self> {
        let id = id.into();
        if keys.is_empty() {
            return Err(Error::UnknownDocument(format!("document {} has no keys", id)));
        }
        Ok(Self {
            id,
            name: name.into(),
            language: language.into(),
            keys,
        })
    }

    /// Build a document from plain text: a line starting with `# ` opens a
    /// new key, blank lines separate paragraphs. Text before the first
    /// heading goes into a key named after the document.
    pub fn from_plain_text(id: impl Into<String>, name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let mut keys: Vec<DocumentKey> = Vec::new();
        let mut paragraph = String::new();

        fn flush(keys: &mut Vec<DocumentKey>, paragraph: &mut String, fallback: &str) {
            if paragraph.trim().is_empty() {
                paragraph.clear();
                return;
            }
            if keys.is_empty() {
                keys.push(DocumentKey::new(fallback, Vec::new()));
            }
            if let Some(key) = keys.last_mut() {
                key.paragraphs.push(paragraph.trim().to_string());
            }
            paragraph.clear();
        }

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(heading) = trimmed.strip_prefix("# ") {
                flush(&mut keys, &mut paragraph, &name);
                keys.push(DocumentKey::new(heading.trim(), Vec::new()));
            } else if trimmed.is_empty() {
                flush(&mut keys, &mut paragraph, &name);
            } else {
                if !paragraph.is_empty() {
                    paragraph.push(' ');
                }
                paragraph.push_str(trimmed);
            }
        }
        flush(&mut keys, &mut paragraph, &name);

        Self::new(id, name, default_language(), keys)
    }

    pub fn keys(&self) -> &[DocumentKey] {
        &self.keys
    }

    pub fn key(&self, index: u32) -> Option<&DocumentKey> {
        self.keys.get(index as usize)
    }

    pub fn key_count(&self) -> u32 {
        self.keys.len() as u32
    }

    pub fn key_index(&self, name: &str) -> Option<u32> {
        self.keys
            .iter()
            .position(|k| k.name.eq_ignore_ascii_case(name))
            .map(|i| i as u32)
    }

    fn paragraphs_in(&self, key: u32) -> u32 {
        self.key(key).map(|k| k.paragraph_count()).unwrap_or(1)
    }

    pub fn paragraph(&self, key: &KeyRef) -> Option<&str> {
        self.key(key.key)?
            .paragraphs
            .get(key.ordinal as usize)
            .map(|p| p.as_str())
    }

    pub fn first(&self) -> KeyRef {
        KeyRef::new(0, 0)
    }

    pub fn last(&self) -> KeyRef {
        let key = self.key_count().saturating_sub(1);
        KeyRef::new(key, self.paragraphs_in(key) - 1)
    }

    pub fn normalize(&self, key: KeyRef) -> KeyRef {
        match self.key(key.key) {
            Some(entry) => KeyRef::new(key.key, key.ordinal.min(entry.paragraph_count() - 1)),
            None => self.first(),
        }
    }

    pub fn next(&self, key: &KeyRef) -> KeyRef {
        let key = self.normalize(*key);
        if key.ordinal + 1 < self.paragraphs_in(key.key) {
            KeyRef::new(key.key, key.ordinal + 1)
        } else {
            self.next_key(&key)
        }
    }

    pub fn previous(&self, key: &KeyRef) -> KeyRef {
        let key = self.normalize(*key);
        if key.ordinal > 0 {
            return KeyRef::new(key.key, key.ordinal - 1);
        }
        let previous = self.previous_key(&key);
        KeyRef::new(previous.key, self.paragraphs_in(previous.key) - 1)
    }

    /// First paragraph of the following key, wrapping to the first key
    pub fn next_key(&self, key: &KeyRef) -> KeyRef {
        let next = key.key + 1;
        if next < self.key_count() {
            KeyRef::new(next, 0)
        } else {
            self.first()
        }
    }

    pub fn previous_key(&self, key: &KeyRef) -> KeyRef {
        if key.key == 0 || key.key >= self.key_count() {
            KeyRef::new(self.key_count().saturating_sub(1), 0)
        } else {
            KeyRef::new(key.key - 1, 0)
        }
    }

    pub fn key_name(&self, key: &KeyRef) -> &str {
        self.key(key.key).map(|k| k.name.as_str()).unwrap_or("")
    }

    pub fn percent(&self, key: &KeyRef) -> f64 {
        key.key.min(self.key_count()) as f64 / self.key_count().max(1) as f64
    }
}
