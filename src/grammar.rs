//! Matcher construction for wikibreak templates.
//!
//! Every vocabulary entry is compiled into two regexes: one for the
//! option-bearing shape `{{name|...}}` and one for the empty shape `{{name}}`.
//! Keeping the shapes apart means "no options at all" never turns into a
//! single empty option.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::ConfigurationError;

/// Placeholder substituted with the escaped template name.
const NAME_PLACEHOLDER: &str = "{name}";

/// `{{`, ws/underscore run, name, ws/underscore run, `|`, anything but `{`, `}}`
const OPTION_BEARING_TEMPLATE: &str =
    r"\{\{(?:\s|_)*(?P<type>{name})(?:\s|_)*\|(?P<options>[^{]*)\}\}";

/// `{{`, ws/underscore run, name, ws/underscore run (captured), `}}`
const EMPTY_TEMPLATE: &str = r"\{\{(?:\s|_)*(?P<type>{name})(?P<options>(?:\s|_)*)\}\}";

/// Which of the two template grammars a matcher recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `{{name|opt|opt}}`
    OptionBearing,
    /// `{{name}}`
    Empty,
}

/// A pair of pattern templates, each holding one `{name}` placeholder.
///
/// Both templates must define a `type` capture group around the placeholder.
/// The `options` group is optional; when absent the match carries no options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar<'a> {
    pub option_bearing: &'a str,
    pub empty: &'a str,
}

impl Grammar<'static> {
    /// The wikibreak template grammar.
    pub const WIKIBREAK: Self = Grammar {
        option_bearing: OPTION_BEARING_TEMPLATE,
        empty: EMPTY_TEMPLATE,
    };
}

impl Default for Grammar<'static> {
    fn default() -> Self {
        Grammar::WIKIBREAK
    }
}

impl<'a> Grammar<'a> {
    /// Instantiate both templates for `name`, escaped for literal matching.
    ///
    /// Returns `(option_bearing, empty)` pattern sources.
    pub fn instantiate(&self, name: &str) -> (String, String) {
        let escaped = regex::escape(name);
        (
            self.option_bearing.replace(NAME_PLACEHOLDER, &escaped),
            self.empty.replace(NAME_PLACEHOLDER, &escaped),
        )
    }
}

/// Pattern sources for `name` under the wikibreak grammar.
pub fn wikibreak_patterns(name: &str) -> (String, String) {
    Grammar::WIKIBREAK.instantiate(name)
}

fn compile(name: &str, source: &str) -> Result<Regex, ConfigurationError> {
    let regex = RegexBuilder::new(source)
        .case_insensitive(true)
        .unicode(true)
        .multi_line(true)
        .build()
        .map_err(|source| ConfigurationError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;

    if !regex.capture_names().any(|group| group == Some("type")) {
        return Err(ConfigurationError::MissingGroup("type"));
    }
    Ok(regex)
}

/// One compiled matcher: a type name in one shape.
#[derive(Debug, Clone)]
pub struct Matcher {
    type_name: String,
    shape: Shape,
    regex: Regex,
}

impl Matcher {
    /// Lower-cased vocabulary entry this matcher was built from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Pattern source, used to identify the matcher in warnings.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// Immutable set of matchers, two per vocabulary entry.
///
/// Matchers are ordered per entry: option-bearing first, then empty.
#[derive(Debug, Clone)]
pub struct MatcherSet {
    matchers: Vec<Matcher>,
}

impl MatcherSet {
    /// Build matchers for `names` using the wikibreak grammar.
    pub fn build<I, S>(names: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_grammar(names, Grammar::WIKIBREAK)
    }

    /// Build matchers for `names` using a custom grammar.
    pub fn with_grammar<I, S>(names: I, grammar: Grammar<'_>) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matchers = Vec::new();

        for (position, name) in names.into_iter().enumerate() {
            let name = name.as_ref();
            if name.trim().is_empty() {
                return Err(ConfigurationError::BlankName(position));
            }

            let type_name = name.to_lowercase();
            let (option_bearing, empty) = grammar.instantiate(&type_name);

            matchers.push(Matcher {
                regex: compile(name, &option_bearing)?,
                type_name: type_name.clone(),
                shape: Shape::OptionBearing,
            });
            matchers.push(Matcher {
                regex: compile(name, &empty)?,
                type_name,
                shape: Shape::Empty,
            });
        }

        if matchers.is_empty() {
            return Err(ConfigurationError::EmptyVocabulary);
        }

        debug!(matchers = matchers.len(), "built wikibreak matcher set");
        Ok(MatcherSet { matchers })
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Matcher> {
        self.matchers.iter()
    }
}

impl<'a> IntoIterator for &'a MatcherSet {
    type Item = &'a Matcher;
    type IntoIter = std::slice::Iter<'a, Matcher>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
