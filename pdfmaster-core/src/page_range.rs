//! Page range parsing
//!
//! Turns human-written specifications such as `"1,3,5-10"` into zero-based
//! page indices. Parsing happens in two passes:
//!
//! 1. [`PageSpec::parse`] checks syntax and fails on the first malformed token.
//! 2. [`PageSpec::resolve`] expands tokens against a page count and silently
//!    drops anything out of bounds.

use std::fmt;

/// Syntax errors in a page specification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageRangeError {
    /// Empty token, e.g. `"1,,3"` or `""`
    #[error("Empty page token")]
    EmptyToken,

    /// Token part is not a page number
    #[error("Invalid page number: '{0}'")]
    InvalidNumber(String),

    /// Range whose start is after its end
    #[error("Start {start} is greater than end {end}")]
    Reversed { start: u64, end: u64 },
}

/// A single token of a page specification, in 1-based page numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToken {
    /// `N`
    Single(u64),
    /// `N-M`, inclusive
    Range(u64, u64),
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageToken::Single(n) => write!(f, "{n}"),
            PageToken::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

/// Syntactically valid page specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpec {
    tokens: Vec<PageToken>,
}

impl PageSpec {
    /// Parse a comma-separated list of `N` and `N-M` tokens.
    pub fn parse(s: &str) -> Result<Self, PageRangeError> {
        let tokens = s
            .split(',')
            .map(parse_token)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[PageToken] {
        &self.tokens
    }

    /// Expand into zero-based indices valid for `page_count` pages.
    ///
    /// Token order is preserved and duplicates are kept. Indices outside
    /// `0..page_count` are dropped.
    pub fn resolve(&self, page_count: usize) -> PageSelection {
        let last = page_count as u64;
        let mut indices = Vec::new();

        for token in &self.tokens {
            let (start, end) = match *token {
                PageToken::Single(n) => (n, n),
                PageToken::Range(start, end) => (start, end),
            };
            // Clip to 1..=last before expanding so huge ranges stay cheap
            let start = start.max(1);
            let end = end.min(last);
            if start > end {
                continue;
            }
            indices.extend((start..=end).map(|n| (n - 1) as usize));
        }

        PageSelection(indices)
    }
}

fn parse_token(raw: &str) -> Result<PageToken, PageRangeError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(PageRangeError::EmptyToken);
    }

    match token.split_once('-') {
        Some((start, end)) => {
            let start = parse_number(start)?;
            let end = parse_number(end)?;
            if start > end {
                return Err(PageRangeError::Reversed { start, end });
            }
            Ok(PageToken::Range(start, end))
        }
        None => Ok(PageToken::Single(parse_number(token)?)),
    }
}

fn parse_number(part: &str) -> Result<u64, PageRangeError> {
    let part = part.trim();
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PageRangeError::InvalidNumber(part.to_string()));
    }
    part.parse::<u64>()
        .map_err(|_| PageRangeError::InvalidNumber(part.to_string()))
}

/// Ordered, possibly repeating list of in-range zero-based page indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection(Vec<usize>);

impl PageSelection {
    /// Every page of a `page_count` page document, in order.
    pub fn all(page_count: usize) -> Self {
        Self((0..page_count).collect())
    }

    /// Build a selection from raw indices, dropping those out of range.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>, page_count: usize) -> Self {
        Self(indices.into_iter().filter(|&i| i < page_count).collect())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse `spec` and resolve it against `page_count` pages.
pub fn parse_page_selection(spec: &str, page_count: usize) -> Result<PageSelection, PageRangeError> {
    Ok(PageSpec::parse(spec)?.resolve(page_count))
}
