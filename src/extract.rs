//! Scanning text for wikibreak templates.
//!
//! [`Extractor::extract`] returns a lazy iterator: each matcher's regex runs
//! only when the previous matcher is exhausted, and dropping the iterator
//! stops the scan.

use regex::{CaptureMatches, Captures};
use serde::Serialize;
use tracing::warn;

use crate::error::ConfigurationError;
use crate::grammar::{Matcher, MatcherSet};
use crate::options::normalize_options;

/// A wikibreak template found in text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wikibreak {
    /// Lower-cased vocabulary entry that matched. This is the lower-cased
    /// matched text except for letters such as `ſ` that case-fold to another
    /// letter than they lower-case to.
    #[serde(rename = "type")]
    pub type_name: String,
    pub options: Vec<String>,
}

/// Byte range of a match within the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// The matched substring of `text`.
    pub fn as_str<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }

    /// Convert to character offsets within `text`.
    pub fn char_offsets(&self, text: &str) -> (usize, usize) {
        let start = text[..self.start].chars().count();
        (start, start + self.as_str(text).chars().count())
    }
}

/// An extracted value together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureResult<T> {
    pub data: T,
    pub span: Span,
}

/// Receives structural inconsistencies found while scanning.
///
/// A structural inconsistency is a match whose `type` group is missing or
/// empty, which means the grammar and the vocabulary disagree.
pub trait WarningSink {
    fn structural_inconsistency(&self, pattern: &str, context: &str);
}

impl<T: WarningSink + ?Sized> WarningSink for &T {
    fn structural_inconsistency(&self, pattern: &str, context: &str) {
        (**self).structural_inconsistency(pattern, context)
    }
}

/// Logs inconsistencies through `tracing` and carries on.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWarnings;

impl WarningSink for TracingWarnings {
    fn structural_inconsistency(&self, pattern: &str, context: &str) {
        warn!(pattern, context, "wikibreak match without a template name, skipping matcher");
    }
}

/// Finds wikibreak templates using a prebuilt [`MatcherSet`].
#[derive(Debug, Clone)]
pub struct Extractor<W = TracingWarnings> {
    matchers: MatcherSet,
    warnings: W,
}

impl Extractor {
    pub fn new(matchers: MatcherSet) -> Self {
        Extractor {
            matchers,
            warnings: TracingWarnings,
        }
    }

    /// Build an extractor for `names` with the wikibreak grammar.
    pub fn from_names<I, S>(names: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(MatcherSet::build(names)?))
    }
}

impl<W> Extractor<W> {
    /// Replace the warning channel.
    pub fn with_warnings<V: WarningSink>(self, warnings: V) -> Extractor<V> {
        Extractor {
            matchers: self.matchers,
            warnings,
        }
    }

    pub fn matchers(&self) -> &MatcherSet {
        &self.matchers
    }
}

impl<W: WarningSink> Extractor<W> {
    /// Lazily scan `text` for every known template.
    ///
    /// Results of one matcher come out left to right. Matchers run one after
    /// the other, so results are not globally ordered by offset and aliases
    /// matching the same occurrence are all reported.
    pub fn extract<'e, 't>(&'e self, text: &'t str) -> Extractions<'e, 't, W> {
        Extractions {
            text,
            matchers: self.matchers.iter(),
            current: None,
            warnings: &self.warnings,
        }
    }
}

/// Iterator returned by [`Extractor::extract`].
pub struct Extractions<'e, 't, W> {
    text: &'t str,
    matchers: std::slice::Iter<'e, Matcher>,
    current: Option<(&'e Matcher, CaptureMatches<'e, 't>)>,
    warnings: &'e W,
}

impl<'e, 't, W: WarningSink> Iterator for Extractions<'e, 't, W> {
    type Item = CaptureResult<Wikibreak>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((matcher, captures)) = self.current.as_mut() {
                let matcher: &'e Matcher = *matcher;
                match captures.next() {
                    Some(caps) => match capture(matcher, &caps) {
                        Some(result) => return Some(result),
                        None => {
                            let context = caps.get(0).map_or("", |m| m.as_str());
                            self.warnings
                                .structural_inconsistency(matcher.pattern(), context);
                            self.current = None;
                        }
                    },
                    None => self.current = None,
                }
                continue;
            }

            let matcher = self.matchers.next()?;
            self.current = Some((matcher, matcher.regex().captures_iter(self.text)));
        }
    }
}

/// Build a result from one match, or `None` when the `type` group is missing or empty.
fn capture(matcher: &Matcher, caps: &Captures<'_>) -> Option<CaptureResult<Wikibreak>> {
    caps.name("type").filter(|m| !m.as_str().is_empty())?;
    let whole = caps.get(0)?;

    // Both shapes normalize their capture; the empty shape usually yields nothing.
    let options = caps
        .name("options")
        .map(|m| normalize_options(m.as_str()))
        .unwrap_or_default();

    Some(CaptureResult {
        data: Wikibreak {
            type_name: matcher.type_name().to_string(),
            options,
        },
        span: Span {
            start: whole.start(),
            end: whole.end(),
        },
    })
}
