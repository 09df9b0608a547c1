//! Option normalization for captured template parameters.

/// Turn a raw options capture into the ordered option list.
///
/// The whole capture is trimmed, underscores are removed (they pad template
/// text in place of spaces) and the rest is split on `|`. Individual
/// segments are not trimmed. A capture that reduces to nothing yields no
/// options rather than one empty option.
pub fn normalize_options(raw: &str) -> Vec<String> {
    let cleaned = raw.trim().replace('_', "");
    if cleaned.is_empty() {
        return Vec::new();
    }
    cleaned.split('|').map(str::to_string).collect()
}
