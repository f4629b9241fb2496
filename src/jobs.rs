// src/jobs.rs

//! Job files: the list of articles a run should extract.
//!
//! ```json
//! { "articles": [ { "title": "Some post", "url": "https://example.com/p/1" } ] }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ControlError, Result};
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct JobFileBody {
    articles: Vec<Article>,
}

/// A parsed job file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFile {
    pub path: PathBuf,
    pub articles: Vec<Article>,
}

impl JobFile {
    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    pub fn summary(&self) -> ImportedJobFile {
        ImportedJobFile {
            path: self.path.clone(),
            article_count: self.article_count(),
        }
    }
}

/// The job file currently selected for the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedJobFile {
    pub path: PathBuf,
    pub article_count: usize,
}

/// Read and parse a job file.
pub fn read_job_file(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<JobFile> {
    let path = path.as_ref();
    if !fs.is_file(path) {
        return Err(ControlError::Config(format!(
            "job file {:?} does not exist or is not a file",
            path
        )));
    }

    let contents = fs.read_to_string(path)?;
    let body: JobFileBody = serde_json::from_str(&contents)?;

    Ok(JobFile {
        path: path.to_path_buf(),
        articles: body.articles,
    })
}
