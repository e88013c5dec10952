//! Record and bank types persisted by the store.

/// A persisted `(text, embedding, bank)` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Store-assigned id, unique and monotonic
    pub id: u64,
    /// Source text
    pub text: String,
    /// Embedding vector for `text`
    pub embedding: Vec<f32>,
    /// Owning bank name
    pub bank: String,
    /// Position of `text` in the bank's declared content
    pub seq: u32,
}

impl Record {
    /// Get embedding dimension
    pub fn dim(&self) -> usize {
        self.embedding.len()
    }
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub text: String,
    pub embedding: Vec<f32>,
    pub bank: String,
    pub seq: u32,
}

impl NewRecord {
    pub fn new(
        bank: impl Into<String>,
        seq: u32,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            text: text.into(),
            embedding,
            bank: bank.into(),
            seq,
        }
    }

    pub(crate) fn with_id(self, id: u64) -> Record {
        Record {
            id,
            text: self.text,
            embedding: self.embedding,
            bank: self.bank,
            seq: self.seq,
        }
    }
}

/// A named, ordered collection of text facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBank {
    pub name: String,
    pub content: Vec<String>,
}

impl NamedBank {
    pub fn new(name: impl Into<String>, content: Vec<String>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
