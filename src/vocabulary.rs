//! Wikibreak template vocabulary, grouped by category.
//!
//! The built-in document lives in `schema/wikibreaks.yaml` and is embedded at
//! compile time. A replacement document with the same shape can be loaded
//! from disk.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::SchemaError;

const BUILTIN_SCHEMA: &str = include_str!("../schema/wikibreaks.yaml");

#[derive(Debug, Deserialize)]
struct VocabularySchema {
    categories: Vec<CategorySchema>,
}

#[derive(Debug, Deserialize)]
struct CategorySchema {
    name: String,
    #[allow(dead_code)]
    #[serde(default)]
    description: Option<String>,
    templates: Vec<String>,
}

/// One category and its template names, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub templates: Vec<String>,
}

/// Ordered mapping of category name to template names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    categories: Vec<Category>,
}

impl Vocabulary {
    /// The embedded vocabulary.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_yaml_str(BUILTIN_SCHEMA)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, SchemaError> {
        let schema: VocabularySchema = serde_yaml::from_str(contents)?;

        let categories = schema
            .categories
            .into_iter()
            .map(|category| {
                if category.templates.is_empty() {
                    Err(SchemaError::EmptyCategory(category.name))
                } else {
                    Ok(Category {
                        name: category.name,
                        templates: category.templates,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Vocabulary { categories })
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    /// Every template name, flattened in category order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .flat_map(|category| category.templates.iter().map(String::as_str))
    }

    /// First category listing `type_name`, compared case-insensitively.
    pub fn category_of(&self, type_name: &str) -> Option<&str> {
        let wanted = type_name.to_lowercase();
        self.categories
            .iter()
            .find(|category| {
                category
                    .templates
                    .iter()
                    .any(|template| template.to_lowercase() == wanted)
            })
            .map(|category| category.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
categories:
  - name: break
    templates: [Wikibreak, Vacation]
  - name: other
    description: leaving
    templates: [Retired, vacation]
"#;

    #[test]
    fn builtin_vocabulary_parses() {
        let vocabulary = Vocabulary::builtin().unwrap();
        let names: Vec<&str> = vocabulary.categories().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["back_not", "break", "health", "mental", "health_mental", "technical", "other"]
        );
        assert!(vocabulary.names().any(|n| n == "Wikibreak"));
        assert!(vocabulary.names().any(|n| n == "Semi-retired"));
    }

    #[test]
    fn builtin_names_are_not_blank() {
        let vocabulary = Vocabulary::builtin().unwrap();
        assert!(vocabulary.names().all(|n| !n.trim().is_empty()));
    }

    #[test]
    fn names_are_flattened_in_order() {
        let vocabulary = Vocabulary::from_yaml_str(SMALL).unwrap();
        let names: Vec<&str> = vocabulary.names().collect();
        assert_eq!(names, vec!["Wikibreak", "Vacation", "Retired", "vacation"]);
    }

    #[test]
    fn category_lookup_is_case_insensitive() {
        let vocabulary = Vocabulary::from_yaml_str(SMALL).unwrap();
        assert_eq!(vocabulary.category_of("wikibreak"), Some("break"));
        assert_eq!(vocabulary.category_of("RETIRED"), Some("other"));
        assert_eq!(vocabulary.category_of("unknown"), None);
    }

    #[test]
    fn category_lookup_returns_first_listing() {
        let vocabulary = Vocabulary::from_yaml_str(SMALL).unwrap();
        assert_eq!(vocabulary.category_of("vacation"), Some("break"));
    }

    #[test]
    fn empty_category_is_rejected() {
        let err = Vocabulary::from_yaml_str("categories:\n  - name: lonely\n    templates: []\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::EmptyCategory(name) if name == "lonely"));
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let err = Vocabulary::from_yaml_str("categories: {not: [a list").unwrap_err();
        assert!(matches!(err, SchemaError::Yaml(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Vocabulary::load(Path::new("does/not/exist.yaml")).unwrap_err();
        match err {
            SchemaError::Io { path, .. } => assert_eq!(path, Path::new("does/not/exist.yaml")),
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
