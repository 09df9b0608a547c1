//! Extraction of wikibreak templates from wiki markup.
//!
//! A wikibreak is a template such as `{{Wikibreak|back=May}}` or
//! `{{Retired}}` that an editor puts on their user page while away.
//! [`Extractor`] finds every such template in a text and returns its
//! normalized name, its options and the span it came from.
//!
//! ```
//! use wikibreak_scanner::Extractor;
//!
//! let extractor = Extractor::from_names(["Wikibreak", "Retired"]).unwrap();
//! let found: Vec<_> = extractor.extract("Gone. {{wikibreak|back = June}}").collect();
//! assert_eq!(found[0].data.type_name, "wikibreak");
//! assert_eq!(found[0].data.options, vec!["back = June"]);
//! ```

pub mod dump;
pub mod error;
pub mod extract;
pub mod grammar;
pub mod options;
pub mod parallel;
pub mod vocabulary;

pub use error::{ConfigurationError, SchemaError};
pub use extract::{
    CaptureResult, Extractions, Extractor, Span, TracingWarnings, WarningSink, Wikibreak,
};
pub use grammar::{Grammar, Matcher, MatcherSet, Shape};
pub use options::normalize_options;
pub use vocabulary::{Category, Vocabulary};
