use mender_code_chunker::CodeChunk;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

const CONTENT_WEIGHT: f32 = 0.4;
const PATH_WEIGHT: f32 = 0.3;
const SOURCE_EXTENSION_BONUS: f32 = 0.1;
const MENTIONED_FILE_BONUS: f32 = 0.2;

/// Keywords shorter than this are dropped
const MIN_KEYWORD_CHARS: usize = 3;

/// Default per-chunk character budget applied after scoring
pub const DEFAULT_MAX_CHARS_PER_CHUNK: usize = 5000;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "is", "are",
    "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "should", "could", "may", "might", "must", "can", "this", "that", "these", "those",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "rs", "go", "java", "kt", "rb", "php", "c", "h", "cc", "cpp",
    "hpp", "cs", "swift", "scala",
];

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\b\w+\b").expect("static regex"))
}

fn file_mention_regex() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| Regex::new(r"[\w/]+\.\w+").expect("static regex"))
}

/// Terms pulled out of a defect description once and reused for every chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTerms {
    /// Lowercase, de-duplicated, stop words removed
    pub keywords: Vec<String>,
    /// Path-like tokens such as `src/auth/login.py`, in order of appearance
    pub mentioned_files: Vec<String>,
}

impl QueryTerms {
    #[must_use]
    pub fn parse(query: &str) -> Self {
        Self {
            keywords: extract_keywords(query),
            mentioned_files: mentioned_files(query),
        }
    }
}

/// Lowercase word tokens of `query` minus stop words and short tokens.
///
/// Returned sorted so the result is deterministic; order carries no meaning.
#[must_use]
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let unique: BTreeSet<&str> = word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|word| !STOP_WORDS.contains(word))
        .collect();
    unique.into_iter().map(str::to_string).collect()
}

/// File-path-shaped tokens mentioned in `query`, case preserved
#[must_use]
pub fn mentioned_files(query: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    file_mention_regex()
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .filter(|file| seen.insert(file.clone()))
        .collect()
}

/// Keyword-weighted relevance scoring with post-scoring truncation
#[derive(Debug, Clone)]
pub struct LexicalScorer {
    max_chars_per_chunk: usize,
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS_PER_CHUNK)
    }
}

impl LexicalScorer {
    #[must_use]
    pub const fn new(max_chars_per_chunk: usize) -> Self {
        Self {
            max_chars_per_chunk,
        }
    }

    #[must_use]
    pub const fn max_chars_per_chunk(&self) -> usize {
        self.max_chars_per_chunk
    }

    /// Relevance of one chunk in `[0, 1]`
    #[must_use]
    pub fn score_chunk(&self, chunk: &CodeChunk, terms: &QueryTerms) -> f32 {
        let mut score = 0.0_f32;

        if !terms.keywords.is_empty() {
            let total = terms.keywords.len() as f32;
            let content = chunk.content.to_lowercase();
            let path = joined_path(&chunk.file_path);

            let content_hits = terms
                .keywords
                .iter()
                .filter(|kw| content.contains(kw.as_str()))
                .count();
            let path_hits = terms
                .keywords
                .iter()
                .filter(|kw| path.contains(kw.as_str()))
                .count();

            score += CONTENT_WEIGHT * content_hits as f32 / total;
            score += PATH_WEIGHT * path_hits as f32 / total;
        }

        if chunk
            .extension()
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.as_str()))
        {
            score += SOURCE_EXTENSION_BONUS;
        }

        if terms
            .mentioned_files
            .iter()
            .any(|mention| chunk.file_path.contains(mention.as_str()))
        {
            score += MENTIONED_FILE_BONUS;
        }

        score.clamp(0.0, 1.0)
    }

    /// Scores every chunk in place and returns positions ordered best first.
    ///
    /// The sort is stable, so equal scores keep their input order.
    pub fn rank(&self, chunks: &mut [CodeChunk], query: &str) -> Vec<usize> {
        let terms = QueryTerms::parse(query);
        log::debug!(
            "Lexical ranking: {} keywords, {} mentioned files, {} chunks",
            terms.keywords.len(),
            terms.mentioned_files.len(),
            chunks.len()
        );

        for chunk in chunks.iter_mut() {
            chunk.relevance_score = self.score_chunk(chunk, &terms);
        }

        let mut order: Vec<usize> = (0..chunks.len()).collect();
        order.sort_by(|&a, &b| {
            chunks[b]
                .relevance_score
                .partial_cmp(&chunks[a].relevance_score)
                .unwrap_or(Ordering::Equal)
        });
        order
    }

    /// Top `top_k` chunks for `query`, scored on full content then truncated
    #[must_use]
    pub fn select(&self, mut chunks: Vec<CodeChunk>, query: &str, top_k: usize) -> Vec<CodeChunk> {
        let order = self.rank(&mut chunks, query);

        let mut slots: Vec<Option<CodeChunk>> = chunks.into_iter().map(Some).collect();
        order
            .into_iter()
            .take(top_k)
            .filter_map(|idx| slots[idx].take())
            .map(|chunk| self.truncate(chunk))
            .collect()
    }

    /// Cut content over the character budget down to a line prefix
    #[must_use]
    pub fn truncate(&self, mut chunk: CodeChunk) -> CodeChunk {
        if let Some(shortened) = truncate_content(&chunk.content, self.max_chars_per_chunk) {
            log::debug!(
                "Truncated {} ({} chars over budget {})",
                chunk.id(),
                chunk.content.len(),
                self.max_chars_per_chunk
            );
            chunk.content = shortened;
        }
        chunk
    }
}

fn joined_path(file_path: &str) -> String {
    Path::new(file_path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whole lines that fit in `max_chars`, followed by an elision marker.
///
/// Returns `None` when `content` already fits. A first line longer than the
/// budget is cut at a character boundary.
#[must_use]
pub fn truncate_content(content: &str, max_chars: usize) -> Option<String> {
    if content.len() <= max_chars {
        return None;
    }

    let lines: Vec<&str> = content.lines().collect();
    let mut kept = String::new();
    let mut kept_lines = 0;

    for line in &lines {
        let extra = if kept_lines == 0 { line.len() } else { line.len() + 1 };
        if kept.len() + extra > max_chars {
            break;
        }
        if kept_lines > 0 {
            kept.push('\n');
        }
        kept.push_str(line);
        kept_lines += 1;
    }

    if kept_lines == 0 {
        if let Some(first) = lines.first() {
            kept = first
                .char_indices()
                .take_while(|(i, c)| i + c.len_utf8() <= max_chars)
                .map(|(_, c)| c)
                .collect();
            kept_lines = 1;
        }
    }

    let elided = lines.len().saturating_sub(kept_lines);
    Some(format!(
        "{kept}\n... ({elided} of {} lines truncated)",
        lines.len()
    ))
}
