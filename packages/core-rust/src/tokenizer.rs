//! Text processing pipeline for match indexes.
//!
//! A pipeline runs in three fixed stages:
//!
//! 1. normalization filters (`downcase`, `upcase`) over the raw text, in
//!    declaration order;
//! 2. the tokenizer (`standard` word split or character `ngram`);
//! 3. `ngram` token filters over every token, in declaration order.
//!
//! Everything works on Unicode scalar values, never bytes, and the output
//! order is fully determined by the input and the configuration. Write-time
//! and query-time tokenization must agree exactly or matches silently fail.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Upper bound on any configured n-gram length.
pub const MAX_TOKEN_LENGTH: usize = 64;

/// Characters the standard tokenizer splits on, besides whitespace.
const STANDARD_DELIMITERS: [char; 4] = [',', ';', ':', '!'];

/// Splits text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Tokenizer {
    /// Word split on whitespace and `, ; : !`.
    Standard,
    /// Every contiguous run of `token_length` characters.
    Ngram {
        #[serde(rename = "tokenLength")]
        token_length: usize,
    },
}

/// Transforms text before or tokens after the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TokenFilter {
    Downcase,
    Upcase,
    Ngram {
        #[serde(rename = "tokenLength")]
        token_length: usize,
    },
}

/// Tokenizer plus filters shared by every field a match index covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    #[serde(default)]
    pub token_filters: Vec<TokenFilter>,
    pub tokenizer: Tokenizer,
}

impl MatchOptions {
    /// Checks every configured n-gram length against [`MAX_TOKEN_LENGTH`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidTokenLength`] naming `index`.
    pub fn validate(&self, index: &str) -> Result<(), SchemaError> {
        let lengths = self
            .token_filters
            .iter()
            .filter_map(|f| match f {
                TokenFilter::Ngram { token_length } => Some(*token_length),
                _ => None,
            })
            .chain(match self.tokenizer {
                Tokenizer::Ngram { token_length } => Some(token_length),
                Tokenizer::Standard => None,
            });
        for length in lengths {
            if length == 0 || length > MAX_TOKEN_LENGTH {
                return Err(SchemaError::InvalidTokenLength {
                    index: index.to_string(),
                    length,
                    max: MAX_TOKEN_LENGTH,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Primitive processors
// ---------------------------------------------------------------------------

/// Every contiguous run of `n` characters, in order.
/// Text shorter than `n` yields nothing.
#[must_use]
pub fn ngrams(text: &str, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Splits on whitespace and the standard delimiters, dropping empty pieces.
#[must_use]
pub fn standard_split(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || STANDARD_DELIMITERS.contains(&c))
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// TextPipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseFilter {
    Down,
    Up,
}

/// A [`MatchOptions`] assembled once and applied to many texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPipeline {
    case_filters: Vec<CaseFilter>,
    tokenizer: Tokenizer,
    ngram_filters: Vec<usize>,
}

impl TextPipeline {
    #[must_use]
    pub fn new(options: &MatchOptions) -> Self {
        let mut case_filters = Vec::new();
        let mut ngram_filters = Vec::new();
        for filter in &options.token_filters {
            match filter {
                TokenFilter::Downcase => case_filters.push(CaseFilter::Down),
                TokenFilter::Upcase => case_filters.push(CaseFilter::Up),
                TokenFilter::Ngram { token_length } => ngram_filters.push(*token_length),
            }
        }
        Self {
            case_filters,
            tokenizer: options.tokenizer.clone(),
            ngram_filters,
        }
    }

    /// Tokenizes one text.
    #[must_use]
    pub fn process(&self, text: &str) -> Vec<String> {
        let mut normalized = text.to_string();
        for filter in &self.case_filters {
            normalized = match filter {
                CaseFilter::Down => normalized.to_lowercase(),
                CaseFilter::Up => normalized.to_uppercase(),
            };
        }

        let mut tokens = match self.tokenizer {
            Tokenizer::Standard => standard_split(&normalized),
            Tokenizer::Ngram { token_length } => ngrams(&normalized, token_length),
        };

        for n in &self.ngram_filters {
            tokens = tokens.iter().flat_map(|t| ngrams(t, *n)).collect();
        }
        tokens
    }

    /// Tokenizes several texts, concatenating their tokens in input order.
    #[must_use]
    pub fn process_all<'a, I>(&self, texts: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        texts.into_iter().flat_map(|t| self.process(t)).collect()
    }
}

/// One-shot tokenization with an explicit tokenizer and filter list.
#[must_use]
pub fn tokenize(text: &str, tokenizer: &Tokenizer, filters: &[TokenFilter]) -> Vec<String> {
    TextPipeline::new(&MatchOptions {
        token_filters: filters.to_vec(),
        tokenizer: tokenizer.clone(),
    })
    .process(text)
}
