use serde::{Deserialize, Serialize};

/// A folder of a unit's content tree as returned by the tree provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub docs: Vec<DocEntry>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

/// A text document; content is fetched by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEntry {
    pub id: String,
    pub name: String,
}

/// A binary file. Files without a content hash are not backed up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    pub hash: Option<String>,
}

impl Folder {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_doc(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.docs.push(DocEntry {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_file(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        hash: Option<&str>,
    ) -> Self {
        self.files.push(FileEntry {
            id: id.into(),
            name: name.into(),
            hash: hash.map(str::to_string),
        });
        self
    }

    pub fn with_folder(mut self, folder: Folder) -> Self {
        self.folders.push(folder);
        self
    }
}
