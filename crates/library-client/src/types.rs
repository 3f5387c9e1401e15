//! Library index types

use serde::{Deserialize, Serialize};

/// A book as listed by the library index (`GET /api/list`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryBook {
    pub id: u64,
    pub uuid: String,
    pub title: String,
    /// Display string, multiple authors joined by ` & `
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    /// File paths, one per available format
    #[serde(default)]
    pub formats: Vec<String>,
}

impl LibraryBook {
    pub fn author_list(&self) -> Vec<&str> {
        self.authors
            .split(" & ")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect()
    }
}

/// Response of `GET /api/meta?path=`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetaResponse {
    pub size: u64,
    pub format: String,
    #[serde(default)]
    pub content_hash: Option<String>,
}
