use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier kind for a Comicvine issue id.
pub const ID_COMICVINE: &str = "comicvine";
/// Identifier kind for a Comicvine volume id.
pub const ID_COMICVINE_VOLUME: &str = "comicvine-volume";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IssueMetadata {
    pub comicvine_id: u64,
    pub comicvine_volume_id: Option<u64>,
    pub title: String,
    pub issue_number: Option<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub pubdate: Option<NaiveDate>,
    pub comments: Option<String>,
    pub cover_urls: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct Query {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub identifiers: HashMap<String, u64>,
}

impl Query {
    pub fn issue_id(&self) -> Option<u64> {
        self.identifiers.get(ID_COMICVINE).copied()
    }

    pub fn volume_id(&self) -> Option<u64> {
        self.identifiers.get(ID_COMICVINE_VOLUME).copied()
    }
}

pub mod catalog;
pub mod fetch;
pub mod parser;
pub mod ranking;
pub mod resolution;
pub mod source;
