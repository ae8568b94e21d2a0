//! Word cloud rendering
//!
//! Tokenizes the corpus with a tantivy text analyzer, counts word
//! frequencies and lays the most frequent words out into an SVG image.

/// Word pattern: a word character followed by word characters or apostrophes
const WORD_PATTERN: &str = r"\w[\w'’]+";
/// Tokens longer than this (in bytes) are dropped
const MAX_TOKEN_LEN: usize = 40;
/// Smallest font size before the canvas counts as full
const MIN_FONT_SIZE: f64 = 8.0;
/// Share of words drawn horizontally
const PREFER_HORIZONTAL: f64 = 0.9;
/// Spiral positions tried per font size
const PLACEMENT_ATTEMPTS: usize = 2000;
/// Average glyph width relative to font size
const GLYPH_WIDTH: f64 = 0.6;

const PALETTE: &[&str] = &[
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58",
    "#b5de2b", "#fde725",
];

use crate::config::WordcloudConfig;
use crate::types::{Error, Result};
use crate::utils::escape_content;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::PathBuf;
use tantivy::tokenizer::{LowerCaser, RegexTokenizer, RemoveLongFilter, TextAnalyzer, TokenStream};
use tracing::{debug, info};

/// Consumer of the joined corpus
#[async_trait]
pub trait RenderSink: Send + Sync {
    /// Render `text` without `stopwords`, returning where the artifact was written
    async fn render(&self, text: &str, stopwords: &HashSet<String>) -> Result<PathBuf>;
}

fn build_analyzer() -> Result<TextAnalyzer> {
    let tokenizer =
        RegexTokenizer::new(WORD_PATTERN).map_err(|e| Error::Render(e.to_string()))?;
    Ok(TextAnalyzer::builder(tokenizer)
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .build())
}

/// Count lowercase words of `text`, most frequent first (ties alphabetical)
///
/// A trailing `'s` is stripped, pure numbers and stopwords are dropped.
pub fn word_frequencies(text: &str, stopwords: &HashSet<String>) -> Result<Vec<(String, usize)>> {
    let mut analyzer = build_analyzer()?;
    let mut counts: HashMap<String, usize> = HashMap::new();

    let mut stream = analyzer.token_stream(text);
    while stream.advance() {
        let raw = stream.token().text.as_str();
        let word = raw
            .strip_suffix("'s")
            .or_else(|| raw.strip_suffix("’s"))
            .unwrap_or(raw);
        if word.chars().count() < 2
            || word.chars().all(|c| c.is_numeric())
            || stopwords.contains(word)
        {
            continue;
        }
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }

    let mut freqs: Vec<(String, usize)> = counts.into_iter().collect();
    freqs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(freqs)
}

/// A word positioned on the canvas (centre coordinates)
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWord {
    pub word: String,
    pub count: usize,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub vertical: bool,
    pub color: &'static str,
}

impl PlacedWord {
    fn bounds(&self) -> Rect {
        let (w, h) = text_box(&self.word, self.font_size, self.vertical);
        Rect {
            left: self.x - w / 2.0,
            top: self.y - h / 2.0,
            right: self.x + w / 2.0,
            bottom: self.y + h / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Rect {
    fn overlaps(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    fn inside(&self, width: f64, height: f64) -> bool {
        self.left >= 0.0 && self.top >= 0.0 && self.right <= width && self.bottom <= height
    }
}

fn text_box(word: &str, font_size: f64, vertical: bool) -> (f64, f64) {
    let w = word.chars().count() as f64 * font_size * GLYPH_WIDTH;
    let h = font_size;
    if vertical { (h, w) } else { (w, h) }
}

/// Place up to `max_words` words on a `width` x `height` canvas
///
/// Font size follows relative frequency; each word spirals out from the
/// centre until it fits without overlapping earlier words.
pub fn layout(
    freqs: &[(String, usize)],
    width: u32,
    height: u32,
    max_words: usize,
    seed: u64,
) -> Vec<PlacedWord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (width, height) = (width as f64, height as f64);
    let Some(max_count) = freqs.first().map(|(_, c)| *c as f64) else {
        return Vec::new();
    };
    let max_font = (height / 3.0).max(MIN_FONT_SIZE);

    let mut placed: Vec<PlacedWord> = Vec::new();
    'words: for (word, count) in freqs.iter().take(max_words) {
        let vertical = !rng.random_bool(PREFER_HORIZONTAL);
        let color = PALETTE[rng.random_range(0..PALETTE.len())];
        let relative = *count as f64 / max_count;
        let mut font_size = (max_font * (0.5 + relative / 2.0)).round();

        while font_size >= MIN_FONT_SIZE {
            let (w, h) = text_box(word, font_size, vertical);
            if w > width || h > height {
                font_size -= 2.0;
                continue;
            }
            let step = font_size / 4.0;
            for attempt in 0..PLACEMENT_ATTEMPTS {
                let t = attempt as f64 * 0.1;
                let candidate = PlacedWord {
                    word: word.clone(),
                    count: *count,
                    x: width / 2.0 + step * t * t.cos(),
                    y: height / 2.0 + step * t * t.sin() * (height / width),
                    font_size,
                    vertical,
                    color,
                };
                let bounds = candidate.bounds();
                if bounds.inside(width, height)
                    && placed.iter().all(|p| !p.bounds().overlaps(&bounds))
                {
                    placed.push(candidate);
                    continue 'words;
                }
            }
            font_size -= 2.0;
        }

        debug!("Canvas full after {} words", placed.len());
        break;
    }

    placed
}

/// Serialize placed words as an SVG document
pub fn to_svg(words: &[PlacedWord], width: u32, height: u32, background: &str) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    );
    let _ = writeln!(
        svg,
        r#"<rect width="100%" height="100%" fill="{}"/>"#,
        html_escape::encode_double_quoted_attribute(background)
    );
    for word in words {
        let rotate = if word.vertical {
            format!(r#" transform="rotate(-90 {:.1} {:.1})""#, word.x, word.y)
        } else {
            String::new()
        };
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="{}" fill="{}" font-family="sans-serif" text-anchor="middle" dominant-baseline="central" data-count="{}"{}>{}</text>"#,
            word.x,
            word.y,
            word.font_size,
            word.color,
            word.count,
            rotate,
            escape_content(&word.word)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

/// Renders an SVG word cloud to a file
pub struct WordCloudRenderer {
    config: WordcloudConfig,
    output: PathBuf,
}

impl WordCloudRenderer {
    pub fn new(config: WordcloudConfig, output: PathBuf) -> Self {
        Self { config, output }
    }
}

#[async_trait]
impl RenderSink for WordCloudRenderer {
    async fn render(&self, text: &str, stopwords: &HashSet<String>) -> Result<PathBuf> {
        let freqs = word_frequencies(text, stopwords)?;
        if freqs.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        info!(
            "Counted {} distinct words, most frequent: {:?}",
            freqs.len(),
            freqs.iter().take(5).map(|(w, _)| w.as_str()).collect::<Vec<_>>()
        );

        let cfg = &self.config;
        let words = layout(&freqs, cfg.width, cfg.height, cfg.max_words, cfg.seed);
        let svg = to_svg(&words, cfg.width, cfg.height, &cfg.background);

        if let Some(parent) = self.output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.output, svg).await?;
        info!("Wrote {} words to {:?}", words.len(), self.output);
        Ok(self.output.clone())
    }
}
