//! Running the extractor over MediaWiki XML dumps.
//!
//! Pages are cut out of the byte stream at `<page>` boundaries, filtered,
//! scanned and turned into one JSON record per page that carries at least one
//! wikibreak.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::extract::{Extractor, WarningSink};
use crate::vocabulary::Vocabulary;

lazy_static! {
    pub static ref TITLE_PATTERN: Regex = Regex::new(r"<title>([^<]+)</title>").unwrap();
    pub static ref NS_PATTERN: Regex = Regex::new(r"<ns>(-?\d+)</ns>").unwrap();
    // Dumps with full history carry one <text> per revision; the last one wins.
    pub static ref TEXT_PATTERN: Regex = Regex::new(r"(?s)<text[^>]*>(.+?)</text>").unwrap();
    pub static ref REDIRECT_PATTERN: Regex = Regex::new(r#"<redirect\s+title="[^"]+""#).unwrap();
}

/// Decode the XML entities MediaWiki escapes in page text.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

/// Page cut out of the dump, before scanning.
#[derive(Debug)]
pub struct RawPage {
    pub title: String,
    pub ns: i32,
    pub text: String,
    pub is_redirect: bool,
    pub page_id: usize,
}

/// Pull title, namespace and text out of one `<page>` element.
pub fn extract_page_from_xml(page_xml: &str, page_id: usize) -> Option<RawPage> {
    let title = TITLE_PATTERN
        .captures(page_xml)
        .map(|cap| decode_entities(&cap[1]).into_owned())?;

    let ns = NS_PATTERN
        .captures(page_xml)
        .and_then(|cap| cap[1].parse().ok())
        .unwrap_or(0);

    let text = TEXT_PATTERN
        .captures_iter(page_xml)
        .last()
        .map(|cap| decode_entities(&cap[1]).into_owned())
        .unwrap_or_default();

    Some(RawPage {
        title,
        ns,
        text,
        is_redirect: REDIRECT_PATTERN.is_match(page_xml),
        page_id,
    })
}

/// One wikibreak as written to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikibreakRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub options: Vec<String>,
    /// Character offsets into the decoded page text.
    pub span: [usize; 2],
}

/// Output line for a page with wikibreaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub title: String,
    pub ns: i32,
    pub wikibreaks: Vec<WikibreakRecord>,
}

/// Result of processing one page.
#[derive(Debug)]
pub struct ProcessedPage {
    pub record: Option<PageRecord>,
    pub page_id: usize,
    pub was_redirect: bool,
    pub was_filtered: bool,
    pub was_malformed: bool,
}

impl ProcessedPage {
    fn empty(page_id: usize) -> Self {
        ProcessedPage {
            record: None,
            page_id,
            was_redirect: false,
            was_filtered: false,
            was_malformed: false,
        }
    }
}

/// Everything needed to turn pages into records.
#[derive(Debug)]
pub struct PageScanner<W> {
    extractor: Extractor<W>,
    vocabulary: Vocabulary,
    namespaces: Vec<i32>,
}

impl<W: WarningSink> PageScanner<W> {
    /// `namespaces` restricts scanning to those namespaces; empty means all.
    pub fn new(extractor: Extractor<W>, vocabulary: Vocabulary, namespaces: Vec<i32>) -> Self {
        PageScanner {
            extractor,
            vocabulary,
            namespaces,
        }
    }

    pub fn accepts_namespace(&self, ns: i32) -> bool {
        self.namespaces.is_empty() || self.namespaces.contains(&ns)
    }

    /// Scan a page's text and build its record, if it has any wikibreaks.
    pub fn scan_text(&self, title: &str, ns: i32, text: &str) -> Option<PageRecord> {
        let mut captures: Vec<_> = self.extractor.extract(text).collect();
        if captures.is_empty() {
            return None;
        }
        captures.sort_by_key(|capture| capture.span.start);

        let wikibreaks = captures
            .into_iter()
            .map(|capture| {
                let (start, end) = capture.span.char_offsets(text);
                WikibreakRecord {
                    category: self
                        .vocabulary
                        .category_of(&capture.data.type_name)
                        .map(str::to_string),
                    type_name: capture.data.type_name,
                    options: capture.data.options,
                    span: [start, end],
                }
            })
            .collect();

        Some(PageRecord {
            title: title.to_string(),
            ns,
            wikibreaks,
        })
    }

    pub fn process_raw_page(&self, raw: RawPage) -> ProcessedPage {
        let mut result = ProcessedPage::empty(raw.page_id);

        if raw.is_redirect {
            result.was_redirect = true;
        } else if !self.accepts_namespace(raw.ns) {
            result.was_filtered = true;
        } else {
            result.record = self.scan_text(&raw.title, raw.ns, &raw.text);
        }
        result
    }

    /// Process one `<page>` element. Always returns a result so ordered
    /// writers never wait on a page that failed to parse.
    pub fn process_page_xml(&self, page_xml: &str, page_id: usize) -> ProcessedPage {
        match extract_page_from_xml(page_xml, page_id) {
            Some(raw) => self.process_raw_page(raw),
            None => {
                let mut result = ProcessedPage::empty(page_id);
                result.was_malformed = true;
                result
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub pages_processed: usize,
    pub redirects: usize,
    pub filtered: usize,
    pub malformed: usize,
    pub pages_with_wikibreaks: usize,
    pub wikibreaks_found: usize,
    pub records_written: usize,
    pub by_category: BTreeMap<String, usize>,
    pub elapsed: Duration,
}

pub fn update_stats_from_result(stats: &mut Stats, result: &ProcessedPage) {
    stats.pages_processed += 1;
    if result.was_redirect {
        stats.redirects += 1;
    } else if result.was_filtered {
        stats.filtered += 1;
    } else if result.was_malformed {
        stats.malformed += 1;
    } else if let Some(record) = &result.record {
        stats.pages_with_wikibreaks += 1;
        stats.wikibreaks_found += record.wikibreaks.len();
        for wikibreak in &record.wikibreaks {
            let category = wikibreak.category.as_deref().unwrap_or("uncategorized");
            *stats.by_category.entry(category.to_string()).or_insert(0) += 1;
        }
    }
}

/// Write a page record as one JSON line.
pub fn write_record(writer: &mut impl Write, record: &PageRecord) -> std::io::Result<()> {
    let json = serde_json::to_string(record)?;
    writeln!(writer, "{}", json)
}

/// Feed every complete `<page>` element to `callback` until it returns false.
pub fn scan_pages(
    mut reader: impl BufRead,
    mut callback: impl FnMut(String) -> bool,
) -> std::io::Result<()> {
    let mut buffer = String::new();
    let mut undecoded: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; 1024 * 1024];

    loop {
        let bytes_read = reader.read(&mut chunk)?;
        if bytes_read == 0 {
            break;
        }

        undecoded.extend_from_slice(&chunk[..bytes_read]);
        decode_utf8_prefix(&mut undecoded, &mut buffer);

        while let Some(start) = buffer.find("<page>") {
            if let Some(end_offset) = buffer[start..].find("</page>") {
                let end = start + end_offset + "</page>".len();
                let page_xml = buffer[start..end].to_string();
                buffer.drain(..end);

                if !callback(page_xml) {
                    return Ok(());
                }
            } else {
                buffer.drain(..start);
                break;
            }
        }

        // Keep a tail in case "<page>" straddles two chunks.
        if buffer.len() > 10 && !buffer.contains("<page>") {
            let mut cut = buffer.len() - 10;
            while !buffer.is_char_boundary(cut) {
                cut -= 1;
            }
            buffer.drain(..cut);
        }
    }

    if !undecoded.is_empty() {
        debug!(bytes = undecoded.len(), "dump ends inside a UTF-8 sequence");
    }

    Ok(())
}

/// Move the decodable prefix of `bytes` into `buffer`.
///
/// A sequence cut off at the end stays in `bytes` for the next read. Invalid
/// bytes become U+FFFD.
fn decode_utf8_prefix(bytes: &mut Vec<u8>, buffer: &mut String) {
    let mut consumed = 0;
    loop {
        let rest = &bytes[consumed..];
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                buffer.push_str(valid);
                consumed = bytes.len();
                break;
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                buffer.push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                match e.error_len() {
                    Some(invalid) => {
                        buffer.push(char::REPLACEMENT_CHARACTER);
                        consumed += valid_up_to + invalid;
                    }
                    None => {
                        consumed += valid_up_to;
                        break;
                    }
                }
            }
        }
    }
    bytes.drain(..consumed);
}

/// Process pages one at a time on the calling thread.
pub fn run_sequential<W: WarningSink>(
    reader: impl BufRead,
    writer: &mut impl Write,
    scanner: &PageScanner<W>,
    limit: Option<usize>,
    page_limit: Option<usize>,
    quiet: bool,
) -> std::io::Result<Stats> {
    let start_time = Instant::now();
    let mut stats = Stats::default();
    let mut write_error = None;
    let mut page_id = 0;

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
            pb.set_style(style);
        }
        pb
    };

    scan_pages(reader, |page_xml| {
        let result = scanner.process_page_xml(&page_xml, page_id);
        page_id += 1;
        update_stats_from_result(&mut stats, &result);

        if let Some(record) = &result.record {
            if let Err(e) = write_record(&mut *writer, record) {
                write_error = Some(e);
                return false;
            }
            stats.records_written += 1;
        }

        if stats.pages_processed % 1000 == 0 {
            pb.set_message(format!(
                "{} pages, {} wikibreaks",
                stats.pages_processed, stats.wikibreaks_found
            ));
            pb.tick();
        }

        let hit_limit = limit.is_some_and(|l| stats.records_written >= l);
        let hit_page_limit = page_limit.is_some_and(|l| stats.pages_processed >= l);
        !(hit_limit || hit_page_limit)
    })?;

    if let Some(e) = write_error {
        return Err(e);
    }

    writer.flush()?;
    pb.finish_and_clear();
    stats.elapsed = start_time.elapsed();
    Ok(stats)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extract::TracingWarnings;
    use std::io::Cursor;

    const VOCABULARY: &str = r#"
categories:
  - name: break
    templates: [Wikibreak, Vacation]
  - name: other
    templates: [Retired]
"#;

    pub(crate) fn scanner(namespaces: Vec<i32>) -> PageScanner<TracingWarnings> {
        let vocabulary = Vocabulary::from_yaml_str(VOCABULARY).unwrap();
        let extractor = Extractor::from_names(vocabulary.names()).unwrap();
        PageScanner::new(extractor, vocabulary, namespaces)
    }

    pub(crate) fn page(title: &str, ns: i32, text: &str) -> String {
        format!(
            "  <page>\n    <title>{}</title>\n    <ns>{}</ns>\n    <revision>\n      \
             <text xml:space=\"preserve\">{}</text>\n    </revision>\n  </page>\n",
            title, ns, text
        )
    }

    // ─────────────────────────────────────────────────────────────
    // Page parsing
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn decode_entities_handles_ampersand_last() {
        assert_eq!(decode_entities("&amp;lt; &lt;b&gt; &quot;x&quot;"), "&lt; <b> \"x\"");
        assert!(matches!(decode_entities("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn extract_page_reads_title_ns_and_text() {
        let xml = page("User:Alice", 2, "{{Retired}}");
        let raw = extract_page_from_xml(&xml, 7).unwrap();
        assert_eq!(raw.title, "User:Alice");
        assert_eq!(raw.ns, 2);
        assert_eq!(raw.text, "{{Retired}}");
        assert_eq!(raw.page_id, 7);
        assert!(!raw.is_redirect);
    }

    #[test]
    fn extract_page_takes_last_revision_text() {
        let xml = "<page><title>User:Bob</title><ns>2</ns>\
                   <revision><text>old</text></revision>\
                   <revision><text>{{wikibreak}}</text></revision></page>";
        assert_eq!(extract_page_from_xml(xml, 0).unwrap().text, "{{wikibreak}}");
    }

    #[test]
    fn extract_page_without_title_is_none() {
        assert!(extract_page_from_xml("<page><ns>2</ns></page>", 0).is_none());
    }

    #[test]
    fn redirects_are_flagged() {
        let xml = "<page><title>User:Old</title><ns>2</ns>\
                   <redirect title=\"User:New\" /><text>#REDIRECT [[User:New]]</text></page>";
        assert!(extract_page_from_xml(xml, 0).unwrap().is_redirect);
    }

    // ─────────────────────────────────────────────────────────────
    // Scanning pages
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn scan_text_sorts_by_offset_and_labels_categories() {
        let scanner = scanner(vec![]);
        let record = scanner
            .scan_text("User:Carol", 2, "{{retired}} then {{Vacation|back=May}}")
            .unwrap();

        let described: Vec<(&str, Option<&str>, [usize; 2])> = record
            .wikibreaks
            .iter()
            .map(|w| (w.type_name.as_str(), w.category.as_deref(), w.span))
            .collect();
        assert_eq!(
            described,
            vec![
                ("retired", Some("other"), [0, 11]),
                ("vacation", Some("break"), [17, 38]),
            ]
        );
        assert_eq!(record.wikibreaks[1].options, vec!["back=May"]);
    }

    #[test]
    fn scan_text_without_wikibreaks_is_none() {
        assert!(scanner(vec![]).scan_text("User:Dan", 2, "Hello").is_none());
    }

    #[test]
    fn decoded_text_is_scanned() {
        let scanner = scanner(vec![]);
        let result = scanner.process_page_xml(&page("User:Eve", 2, "{{wikibreak|msg=&lt;b&gt;}}"), 0);
        let record = result.record.unwrap();
        assert_eq!(record.wikibreaks[0].options, vec!["msg=<b>"]);
    }

    #[test]
    fn namespace_filter_skips_other_pages() {
        let scanner = scanner(vec![2, 3]);
        let result = scanner.process_page_xml(&page("Main", 0, "{{retired}}"), 0);
        assert!(result.was_filtered);
        assert!(result.record.is_none());

        let result = scanner.process_page_xml(&page("User talk:Finn", 3, "{{retired}}"), 1);
        assert!(result.record.is_some());
    }

    #[test]
    fn malformed_page_still_produces_result() {
        let result = scanner(vec![]).process_page_xml("<page></page>", 4);
        assert!(result.was_malformed);
        assert_eq!(result.page_id, 4);
    }

    #[test]
    fn record_serializes_as_json_line() {
        let record = scanner(vec![]).scan_text("User:Gil", 2, "{{Retired}}").unwrap();
        let mut out = Vec::new();
        write_record(&mut out, &record).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"title\":\"User:Gil\",\"ns\":2,\"wikibreaks\":\
             [{\"type\":\"retired\",\"category\":\"other\",\"options\":[],\"span\":[0,11]}]}\n"
        );
    }

    // ─────────────────────────────────────────────────────────────
    // Stream handling
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn scan_pages_yields_each_page() {
        let dump = format!(
            "<mediawiki>{}{}</mediawiki>",
            page("A", 2, "a"),
            page("B", 2, "b")
        );
        let mut titles = Vec::new();
        scan_pages(Cursor::new(dump), |xml| {
            titles.push(extract_page_from_xml(&xml, 0).unwrap().title);
            true
        })
        .unwrap();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn scan_pages_stops_when_callback_declines() {
        let dump = format!("{}{}{}", page("A", 2, ""), page("B", 2, ""), page("C", 2, ""));
        let mut seen = 0;
        scan_pages(Cursor::new(dump), |_| {
            seen += 1;
            seen < 2
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn scan_pages_keeps_characters_split_across_reads() {
        let head = "<mediawiki>  <page>\n    <title>User:A</title>\n    <ns>2</ns>\n    \
                    <revision>\n      <text xml:space=\"preserve\">{{wikibreak|back=";
        // First byte of the two-byte 'é' is the last byte of the first read.
        let filler = "x".repeat(1024 * 1024 - 1 - head.len());
        let dump = format!(
            "{}{}é}}}}</text>\n    </revision>\n  </page>\n</mediawiki>",
            head, filler
        );
        assert_eq!(dump.find('é'), Some(1024 * 1024 - 1));

        let scanner = scanner(vec![]);
        let mut records = Vec::new();
        scan_pages(Cursor::new(dump), |xml| {
            records.push(scanner.process_page_xml(&xml, 0).record);
            true
        })
        .unwrap();

        assert_eq!(records.len(), 1);
        let record = records[0].as_ref().unwrap();
        let option = &record.wikibreaks[0].options[0];
        assert!(option.ends_with("xé"));
        assert!(!option.contains(char::REPLACEMENT_CHARACTER));
    }

    #[test]
    fn decode_utf8_prefix_holds_back_partial_sequence() {
        let mut buffer = String::new();
        let mut bytes = vec![b'a', 0xC3];
        decode_utf8_prefix(&mut bytes, &mut buffer);
        assert_eq!(buffer, "a");
        assert_eq!(bytes, vec![0xC3]);

        bytes.extend_from_slice(&[0xA9, 0xFF, b'b']);
        decode_utf8_prefix(&mut bytes, &mut buffer);
        assert_eq!(buffer, "aé\u{FFFD}b");
        assert!(bytes.is_empty());
    }

    #[test]
    fn run_sequential_writes_records_and_counts() {
        let dump = format!(
            "<mediawiki>{}{}{}</mediawiki>",
            page("User:A", 2, "{{wikibreak|back=soon}} and {{retired}}"),
            page("Article", 0, "{{retired}}"),
            page("User:B", 2, "nothing here")
        );
        let mut out = Vec::new();
        let stats =
            run_sequential(Cursor::new(dump), &mut out, &scanner(vec![2]), None, None, true).unwrap();

        assert_eq!(stats.pages_processed, 3);
        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.pages_with_wikibreaks, 1);
        assert_eq!(stats.wikibreaks_found, 2);
        assert_eq!(stats.records_written, 1);
        assert_eq!(stats.by_category.get("break"), Some(&1));
        assert_eq!(stats.by_category.get("other"), Some(&1));
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn run_sequential_honours_limits() {
        let dump: String = (0..5)
            .map(|i| page(&format!("User:{}", i), 2, "{{retired}}"))
            .collect();

        let mut out = Vec::new();
        let stats = run_sequential(Cursor::new(dump.clone()), &mut out, &scanner(vec![]), Some(2), None, true)
            .unwrap();
        assert_eq!(stats.records_written, 2);

        let mut out = Vec::new();
        let stats = run_sequential(Cursor::new(dump), &mut out, &scanner(vec![]), None, Some(3), true)
            .unwrap();
        assert_eq!(stats.pages_processed, 3);
    }
}
