//! Relay channel derivation.

use std::fmt;

/// Relay channel identifier for one document.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicId([u8; 32]);

impl TopicId {
    /// Derive the topic for a document id.
    ///
    /// Every replica of the same document hashes to the same topic, so the
    /// relay needs no registry of document ids.
    pub fn for_document(document_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"quire:collab:");
        hasher.update(document_id.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicId(")?;
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}
