//! Stopword sets
//!
//! Built-in lists for English, Ukrainian and Russian, merged with any
//! user-supplied words or files.

use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

const ENGLISH: &str = include_str!("../stopwords/en.txt");
const UKRAINIAN: &str = include_str!("../stopwords/uk.txt");
const RUSSIAN: &str = include_str!("../stopwords/ru.txt");

/// Language with a built-in stopword list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "uk")]
    Ukrainian,
    #[serde(rename = "ru")]
    Russian,
}

impl Language {
    fn list(self) -> &'static str {
        match self {
            Language::English => ENGLISH,
            Language::Ukrainian => UKRAINIAN,
            Language::Russian => RUSSIAN,
        }
    }

    /// Built-in stopwords for this language
    pub fn stopwords(self) -> HashSet<String> {
        parse_list(self.list())
    }
}

/// One word per line; blank lines and `#` comments are ignored
fn parse_list(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

/// Union of the stopwords of `languages`, `extra` words and word-list `files`
pub async fn build_stopwords(
    languages: &[Language],
    extra: &[String],
    files: &[PathBuf],
) -> Result<HashSet<String>> {
    let mut words = HashSet::new();

    for &language in languages {
        let list = language.stopwords();
        debug!("Loaded {} stopwords for {:?}", list.len(), language);
        words.extend(list);
    }

    words.extend(
        extra
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty()),
    );

    for path in files {
        let content = tokio::fs::read_to_string(path).await?;
        let list = parse_list(&content);
        debug!("Loaded {} stopwords from {:?}", list.len(), path);
        words.extend(list);
    }

    info!("Using {} stopwords", words.len());
    Ok(words)
}
