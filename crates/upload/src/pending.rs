//! The ordered set of documents waiting to be uploaded.

use leaddocs_protocol::DocumentAsset;

/// Pending documents in selection order, unique by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingDocuments {
    docs: Vec<DocumentAsset>,
}

impl PendingDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a document. Returns `false` if its id is already pending.
    pub fn add(&mut self, doc: DocumentAsset) -> bool {
        if self.contains(&doc.id) {
            return false;
        }
        self.docs.push(doc);
        true
    }

    /// Removes a document by id. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &str) -> Option<DocumentAsset> {
        let pos = self.docs.iter().position(|d| d.id == id)?;
        Some(self.docs.remove(pos))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.iter().any(|d| d.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&DocumentAsset> {
        self.docs.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentAsset> {
        self.docs.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.docs.iter().map(|d| d.id.clone()).collect()
    }

    /// Copies the documents named by `ids`, in the order given.
    ///
    /// Unknown and repeated ids are skipped.
    pub fn select(&self, ids: &[String]) -> Vec<DocumentAsset> {
        let mut picked: Vec<DocumentAsset> = Vec::with_capacity(ids.len());
        for id in ids {
            if picked.iter().any(|d| &d.id == id) {
                continue;
            }
            if let Some(doc) = self.get(id) {
                picked.push(doc.clone());
            }
        }
        picked
    }
}

impl From<Vec<DocumentAsset>> for PendingDocuments {
    fn from(docs: Vec<DocumentAsset>) -> Self {
        let mut pending = Self::new();
        for doc in docs {
            pending.add(doc);
        }
        pending
    }
}
