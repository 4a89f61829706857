use serde::{Deserialize, Serialize};

/// Whether a listed resource is a collection or a plain file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// One node returned by a PROPFIND directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Server-relative href, percent-encoded exactly as the server sent it
    pub path: String,
    /// Display name with XML entities resolved; may still be percent-encoded
    pub file_name: String,
    pub kind: EntryKind,
    /// `None` means the folder has not been expanded yet, `Some(vec![])` means
    /// it was expanded and turned out empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<RemoteEntry>>,
}

impl RemoteEntry {
    pub fn file(path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            kind: EntryKind::File,
            children: None,
        }
    }

    pub fn folder(path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            kind: EntryKind::Folder,
            children: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Whether the tree builder has populated this node's children
    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    /// Percent-decoded display name for presentation.
    /// Falls back to the raw name if the decoded bytes are not valid UTF-8.
    pub fn decoded_file_name(&self) -> String {
        urlencoding::decode(&self.file_name)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| self.file_name.clone())
    }

    /// Depth-first, pre-order walk over this node and every expanded descendant
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Number of files anywhere below this node (only expanded folders are counted)
    pub fn file_count(&self) -> usize {
        self.walk().filter(|entry| entry.is_file()).count()
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a RemoteEntry>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a RemoteEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.stack.pop()?;
        if let Some(children) = &entry.children {
            // Reverse so the first child is visited first
            self.stack.extend(children.iter().rev());
        }
        Some(entry)
    }
}

/// The listing without its leading self-descriptor.
///
/// A PROPFIND response always starts with the directory that was queried, so
/// a "contents" view has to skip it.
pub fn contents(listing: &[RemoteEntry]) -> &[RemoteEntry] {
    listing.get(1..).unwrap_or(&[])
}
