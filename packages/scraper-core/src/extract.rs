use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};

use crate::types::epoch_seconds;

/// Product-attribute fields projected into the extracted record. Fields
/// absent in the source object are omitted, never defaulted.
pub const ALLOWED_FIELDS: &[&str] = &[
    "product_id",
    "name",
    "sku",
    "attribute_set_id",
    "attribute_set",
    "type_id",
    "price",
    "min_price",
    "max_price",
    "min_price_format",
    "max_price_format",
    "gold_weight",
    "none_metal_weight",
    "fixed_silver_weight",
    "material_design",
    "qty",
    "collection",
    "collection_id",
    "product_type",
    "product_type_value",
    "category",
    "category_name",
    "store_code",
    "platinum_palladium_info_in_alloy",
    "bracelet_without_chain",
    "show_popup_quantity_eternity",
    "visible_contents",
    "gender",
];

/// Keys whose presence in a parsed candidate marks it as product data.
const INDICATOR_KEYS: &[&str] = &["product_id", "sku", "name", "price", "attribute_set_id"];

/// Looser keyword set for the brace-scan fallback.
const FALLBACK_KEYWORDS: &[&str] = &["product", "sku", "price", "name"];

/// Candidates below this size are ignored by the fallback scan.
const FALLBACK_MIN_LEN: usize = 100;

/// One extraction strategy: a regex that captures a JSON object literal from
/// script text. Strategies are tried in order; the first candidate that
/// parses and validates wins.
struct ScriptPattern {
    name: &'static str,
    regex: Regex,
}

/// Best-effort extractor for embedded product-data JSON.
///
/// This is heuristic by design: false negatives and false positives are both
/// accepted in exchange for not depending on a fixed page schema.
pub struct ProductExtractor {
    patterns: Vec<ScriptPattern>,
}

impl Default for ProductExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductExtractor {
    pub fn new() -> Self {
        let sources: &[(&'static str, &'static str)] = &[
            ("react_data_var", r#"(?s)var\s+react_data\s*=\s*(\{.*?\});"#),
            (
                "react_data_window",
                r#"(?s)window\.react_data\s*=\s*(\{.*?\});"#,
            ),
            ("flat_product_object", r#"(\{[^{}]*"product_id"[^{}]*\})"#),
            (
                "named_var_assignment",
                r#"(?s)var\s+\w+\s*=\s*(\{.*?"product_id".*?\});"#,
            ),
            (
                "window_property_assignment",
                r#"(?s)window\.\w+\s*=\s*(\{.*?"product_id".*?\});"#,
            ),
            (
                "attribute_set_assignment",
                r#"(?s)=\s*(\{.*?"attribute_set_id".*?\});"#,
            ),
            (
                "price_sku_assignment",
                r#"(?s)=\s*(\{.*?"price".*?"sku".*?\});"#,
            ),
        ];

        let patterns = sources
            .iter()
            .map(|(name, source)| ScriptPattern {
                name,
                regex: Regex::new(source).expect("hardcoded extraction pattern must compile"),
            })
            .collect();

        Self { patterns }
    }

    /// Scan page content for an embedded product-data object. Returns the
    /// allowlist projection plus `_metadata`, or `None` when nothing
    /// plausible is found.
    pub fn extract(&self, html: &str) -> Option<Map<String, Value>> {
        let scripts = script_texts(html);

        // Pass 1: ordered pattern strategies, per script, first match wins.
        for script in &scripts {
            for pattern in &self.patterns {
                for captures in pattern.regex.captures_iter(script) {
                    let Some(candidate) = captures.get(1) else {
                        continue;
                    };
                    if let Some(data) = parse_candidate(candidate.as_str()) {
                        if is_product_data(&data, INDICATOR_KEYS) {
                            tracing::debug!(pattern = pattern.name, "found product data in script");
                            return Some(project(&data));
                        }
                    }
                }
            }
        }

        // Pass 2: generic brace-balanced scan over all script text.
        let joined = scripts.join(" ");
        for candidate in balanced_objects(&joined) {
            if candidate.len() <= FALLBACK_MIN_LEN {
                continue;
            }
            let Some(data) = parse_candidate(candidate) else {
                continue;
            };
            if !is_product_data(&data, FALLBACK_KEYWORDS) {
                continue;
            }
            let record = project(&data);
            // The fallback only counts if it actually hit allowlisted fields.
            if record.len() > 1 {
                tracing::debug!("found product data via fallback scan");
                return Some(record);
            }
        }

        None
    }
}

/// Parse a candidate substring as a JSON object. Parse failures are not
/// errors; the caller just moves on to the next candidate.
fn parse_candidate(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn is_product_data(data: &Map<String, Value>, keywords: &[&str]) -> bool {
    let serialized = Value::Object(data.clone()).to_string().to_lowercase();
    keywords.iter().any(|keyword| serialized.contains(keyword))
}

/// Project a source object onto the field allowlist and attach extraction
/// metadata.
fn project(source: &Map<String, Value>) -> Map<String, Value> {
    let mut filtered = Map::new();
    for field in ALLOWED_FIELDS {
        if let Some(value) = source.get(*field) {
            filtered.insert((*field).to_string(), value.clone());
        }
    }

    let fields_extracted = filtered.len();
    filtered.insert(
        "_metadata".to_string(),
        json!({
            "extraction_timestamp": epoch_seconds(),
            "fields_extracted": fields_extracted,
            "total_fields_available": source.len(),
        }),
    );

    filtered
}

/// Collect the text content of every inline script block.
fn script_texts(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script").expect("static selector must parse");
    document
        .select(&selector)
        .map(|element| element.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Page `<title>` text, for diagnostic records.
pub fn page_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").expect("static selector must parse");
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "No title".to_string())
}

/// Scan text for top-level `{...}` spans, honoring string literals and
/// escape sequences so braces inside strings do not derail the depth count.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = object_end(bytes, i) {
                objects.push(&text[i..=end]);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    objects
}

fn object_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(script: &str) -> String {
        format!(
            "<html><head><title>Ring Page</title></head><body>\
             <script type=\"text/javascript\">{script}</script></body></html>"
        )
    }

    #[test]
    fn extracts_react_data_assignment() {
        let extractor = ProductExtractor::new();
        let html = page(r#"var react_data = {"product_id": "110474", "sku": "ABC", "price": 199.99};"#);

        let record = extractor.extract(&html).expect("should extract");
        assert_eq!(record["product_id"], "110474");
        assert_eq!(record["sku"], "ABC");
        assert_eq!(record["price"], 199.99);
        assert_eq!(record["_metadata"]["fields_extracted"], 3);
        assert_eq!(record["_metadata"]["total_fields_available"], 3);
        // Exactly the three allowlisted fields plus metadata.
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn extracts_window_assignment() {
        let extractor = ProductExtractor::new();
        let html = page(r#"window.react_data = {"product_id": 7, "name": "Classic Band"};"#);

        let record = extractor.extract(&html).expect("should extract");
        assert_eq!(record["product_id"], 7);
        assert_eq!(record["name"], "Classic Band");
    }

    #[test]
    fn non_allowlisted_fields_are_dropped() {
        let extractor = ProductExtractor::new();
        let html = page(
            r#"var react_data = {"product_id": "1", "tracking_pixel": "xyz", "gender": "f"};"#,
        );

        let record = extractor.extract(&html).expect("should extract");
        assert!(record.get("tracking_pixel").is_none());
        assert_eq!(record["gender"], "f");
        assert_eq!(record["_metadata"]["fields_extracted"], 2);
        assert_eq!(record["_metadata"]["total_fields_available"], 3);
    }

    #[test]
    fn no_json_at_all_returns_none() {
        let extractor = ProductExtractor::new();
        let html = "<html><body><p>plain page, nothing embedded</p></body></html>";
        assert!(extractor.extract(html).is_none());
    }

    #[test]
    fn unparseable_candidates_are_skipped_silently() {
        let extractor = ProductExtractor::new();
        // Trailing comma makes this invalid JSON; must not panic or match.
        let html = page(r#"var react_data = {"product_id": "1",};"#);
        assert!(extractor.extract(&html).is_none());
    }

    #[test]
    fn fallback_scan_finds_unassigned_objects() {
        let extractor = ProductExtractor::new();
        // Not an assignment the patterns recognize; long enough for the
        // fallback and carrying allowlisted fields.
        let html = page(
            r#"dataLayer.push({"sku": "RING-42", "price": 120.5, "filler_a": "aaaaaaaaaaaaaaaaaaaa", "filler_b": "bbbbbbbbbbbbbbbbbbbb", "filler_c": "cccccccccccccccccccc"});"#,
        );

        let record = extractor.extract(&html).expect("fallback should extract");
        assert_eq!(record["sku"], "RING-42");
        assert_eq!(record["price"], 120.5);
        assert_eq!(record["_metadata"]["fields_extracted"], 2);
    }

    #[test]
    fn fallback_requires_allowlisted_fields() {
        let extractor = ProductExtractor::new();
        // Mentions "name" (keyword) but projects to nothing allowlisted.
        let html = page(
            r#"config.init({"site_name": "Example Store", "filler_a": "aaaaaaaaaaaaaaaaaaaa", "filler_b": "bbbbbbbbbbbbbbbbbbbb", "filler_c": "cccccccccccccccccccc"});"#,
        );
        assert!(extractor.extract(&html).is_none());
    }

    #[test]
    fn page_title_extraction() {
        assert_eq!(
            page_title("<html><head><title> Ring Page </title></head></html>"),
            "Ring Page"
        );
        assert_eq!(page_title("<html><body>untitled</body></html>"), "No title");
    }

    #[test]
    fn balanced_scan_handles_nesting_and_strings() {
        let objects = balanced_objects(r#"foo({"a": {"b": "}"}, "c": 1}) bar {"d": 2}"#);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], r#"{"a": {"b": "}"}, "c": 1}"#);
        assert_eq!(objects[1], r#"{"d": 2}"#);
    }
}
