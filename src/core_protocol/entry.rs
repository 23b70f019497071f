use crate::constants::{MANIFEST_DIR_TAG, MANIFEST_FILE_TAG};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Dir,
}

/// One directory entry. `name` is relative to whatever was listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// `ls` form: the bare name, directories suffixed with `/`.
    pub fn listing_line(&self) -> String {
        match self.kind {
            EntryKind::Dir => format!("{}/", self.name),
            EntryKind::File => self.name.clone(),
        }
    }

    /// Manifest form: `DIR <name>` or `FILE <name>`.
    pub fn manifest_line(&self) -> String {
        let tag = match self.kind {
            EntryKind::Dir => MANIFEST_DIR_TAG,
            EntryKind::File => MANIFEST_FILE_TAG,
        };
        format!("{} {}", tag, self.name)
    }

    pub fn parse_manifest_line(line: &str) -> Option<Self> {
        let (tag, name) = line.split_once(' ')?;
        if name.is_empty() {
            return None;
        }
        let kind = match tag {
            MANIFEST_DIR_TAG => EntryKind::Dir,
            MANIFEST_FILE_TAG => EntryKind::File,
            _ => return None,
        };
        Some(Self::new(name, kind))
    }

    /// Parses the newline-joined `ls` response back into entries.
    pub fn parse_listing(listing: &str) -> Vec<Self> {
        listing
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| match line.strip_suffix('/') {
                Some(name) => Self::new(name, EntryKind::Dir),
                None => Self::new(line, EntryKind::File),
            })
            .collect()
    }
}
