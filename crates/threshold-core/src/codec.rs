//! YAML codec for the embedded threshold document
//!
//! Decoding models the top-level `tenants` section and records where it sits
//! in the source text. Encoding rewrites that block only: the text before and
//! after it (defaults, state filters, comments) is emitted verbatim, and
//! inside the block every tenant whose overrides did not change keeps its
//! original lines. A patch never reformats content it did not touch.
//!
//! When the block cannot be isolated as a top-level block (for example the
//! whole document is a flow mapping) the document is re-serialized from its
//! parsed form instead. Sibling content survives that path; formatting and
//! comments do not.

use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::{DecodeError, EncodeError};
use crate::models::{is_default_keyword, TenantConfig, TenantMap, ThresholdDocument, ThresholdValue};

const TENANTS_KEY: &str = "tenants";

/// Where the `tenants` block lives relative to the rest of the document
#[derive(Debug, Clone)]
pub(crate) enum Layout {
    /// Verbatim text before and after the block
    Spliced {
        head: String,
        tail: String,
        block: Option<BlockLayout>,
    },
    /// Parsed root with `tenants` nulled out, re-serialized on encode
    Rebuilt { root: Mapping },
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Spliced {
            head: String::new(),
            tail: String::new(),
            block: None,
        }
    }
}

/// The original text of a block-style `tenants` section, split per tenant
#[derive(Debug, Clone)]
pub(crate) struct BlockLayout {
    /// `tenants:` line plus any comments before the first tenant
    header: String,
    /// Indentation of tenant keys
    indent: usize,
    chunks: Vec<TenantChunk>,
}

#[derive(Debug, Clone)]
struct TenantChunk {
    tenant: String,
    config: TenantConfig,
    /// Original lines, if they re-encode exactly `config`
    raw: Option<String>,
}

impl Layout {
    /// Surrounding content equality, ignoring a missing final newline before an appended block
    pub(crate) fn same_surroundings(&self, other: &Layout) -> bool {
        match (self, other) {
            (
                Layout::Spliced { head, tail, .. },
                Layout::Spliced {
                    head: other_head,
                    tail: other_tail,
                    ..
                },
            ) => head.trim_end() == other_head.trim_end() && tail == other_tail,
            (Layout::Rebuilt { root }, Layout::Rebuilt { root: other_root }) => root == other_root,
            _ => false,
        }
    }
}

/// Decode the embedded document
///
/// A document without a `tenants` key decodes with the section absent; it is
/// not initialized here.
pub fn decode(raw: &str) -> Result<ThresholdDocument, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let root = match serde_yaml::from_str::<Value>(raw)? {
        Value::Mapping(map) => map,
        other => {
            return Err(DecodeError::NotAMapping {
                found: kind(&other),
            })
        }
    };

    let Some(section) = root.get(TENANTS_KEY) else {
        debug!("Document has no tenants section");
        let layout = Layout::Spliced {
            head: raw.to_string(),
            tail: String::new(),
            block: None,
        };
        return Ok(ThresholdDocument::from_parts(None, layout));
    };

    let tenants = tenants_from_value(section)?;
    let layout = splice(raw, &root, &tenants).unwrap_or_else(|| {
        warn!("Tenants block is not a plain top-level block; document will be re-serialized on write");
        let mut root = root.clone();
        root.insert(Value::from(TENANTS_KEY), Value::Null);
        Layout::Rebuilt { root }
    });

    Ok(ThresholdDocument::from_parts(Some(tenants), layout))
}

/// Encode the document back to text
///
/// Output is block style with insertion-ordered keys; newly created tenants and
/// metrics follow the existing ones.
pub fn encode(doc: &ThresholdDocument) -> Result<String, EncodeError> {
    match &doc.layout {
        Layout::Spliced { head, tail, block } => {
            let Some(tenants) = doc.tenants() else {
                return Ok(format!("{head}{tail}"));
            };
            let block = match block {
                Some(layout) => render_block(layout, tenants)?,
                None => tenants_block(tenants)?,
            };
            let mut out = String::with_capacity(head.len() + block.len() + tail.len() + 1);
            out.push_str(head);
            if !head.is_empty() && !head.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            out.push_str(tail);
            Ok(out)
        }
        Layout::Rebuilt { root } => {
            let mut root = root.clone();
            match doc.tenants() {
                Some(tenants) => {
                    root.insert(Value::from(TENANTS_KEY), serde_yaml::to_value(tenants)?);
                }
                None => {
                    root.remove(TENANTS_KEY);
                }
            }
            Ok(serde_yaml::to_string(&root)?)
        }
    }
}

/// Serialize just the `tenants:` block
fn tenants_block(tenants: &TenantMap) -> Result<String, EncodeError> {
    #[derive(Serialize)]
    struct Section<'a> {
        tenants: &'a TenantMap,
    }

    Ok(serde_yaml::to_string(&Section { tenants })?)
}

/// Re-emit a block-style section, reusing the original lines of unchanged tenants
fn render_block(layout: &BlockLayout, tenants: &TenantMap) -> Result<String, EncodeError> {
    let mut out = layout.header.clone();
    if !out.ends_with('\n') {
        out.push('\n');
    }

    let pad = " ".repeat(layout.indent);
    for (tenant, config) in tenants {
        let original = layout
            .chunks
            .iter()
            .find(|chunk| chunk.tenant == *tenant && chunk.config == *config)
            .and_then(|chunk| chunk.raw.as_deref());

        match original {
            Some(raw) => {
                out.push_str(raw);
                if !raw.ends_with('\n') {
                    out.push('\n');
                }
            }
            None => {
                let mut single = IndexMap::with_capacity(1);
                single.insert(tenant.as_str(), config);
                for line in serde_yaml::to_string(&single)?.lines() {
                    out.push_str(&pad);
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
    }
    Ok(out)
}

/// Convert a parsed `tenants` value into the typed map
pub(crate) fn tenants_from_value(section: &Value) -> Result<TenantMap, DecodeError> {
    let mapping = match section {
        Value::Null => return Ok(TenantMap::new()),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(DecodeError::InvalidTenants {
                reason: format!("expected a mapping of tenants, found {}", kind(other)),
            })
        }
    };

    let mut tenants = TenantMap::with_capacity(mapping.len());
    for (key, body) in mapping {
        let tenant = scalar_text(key).ok_or_else(|| DecodeError::InvalidTenants {
            reason: format!("tenant key must be a scalar, found {}", kind(key)),
        })?;
        let config = tenant_config(&tenant, body)?;
        tenants.insert(tenant, config);
    }
    Ok(tenants)
}

fn tenant_config(tenant: &str, body: &Value) -> Result<TenantConfig, DecodeError> {
    let mapping = match body {
        Value::Null => return Ok(TenantConfig::new()),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(DecodeError::InvalidTenants {
                reason: format!("tenant `{tenant}` must be a mapping, found {}", kind(other)),
            })
        }
    };

    let mut config = TenantConfig::new();
    for (key, value) in mapping {
        let metric = scalar_text(key).ok_or_else(|| DecodeError::InvalidTenants {
            reason: format!("tenant `{tenant}` has a non-scalar metric key"),
        })?;

        if value.is_null() {
            warn!(tenant = %tenant, metric = %metric, "Override has no value, treating as unset");
            continue;
        }

        let text = scalar_text(value).ok_or_else(|| DecodeError::InvalidTenants {
            reason: format!(
                "tenant `{tenant}` metric `{metric}` must be a scalar, found {}",
                kind(value)
            ),
        })?;

        if is_default_keyword(&text) {
            warn!(tenant = %tenant, metric = %metric, "Dropping stored `default` value");
            continue;
        }

        config.insert(metric, ThresholdValue::parse(&text));
    }
    Ok(config)
}

/// Locate the top-level `tenants:` block and split the text around it
///
/// Returns `None` if the block cannot be isolated such that the remaining text
/// still parses to exactly the sibling content of `root`.
fn splice(raw: &str, root: &Mapping, tenants: &TenantMap) -> Option<Layout> {
    let mut start = None;
    let mut end = raw.len();
    let mut offset = 0;

    for line in raw.split_inclusive('\n') {
        match start {
            None if is_tenants_key_line(line) => start = Some(offset),
            Some(_) if starts_top_level(line) => {
                end = offset;
                break;
            }
            _ => {}
        }
        offset += line.len();
    }

    let start = start?;

    // Trailing blank lines belong to whatever follows the block.
    let mut content_end = start;
    let mut cursor = start;
    for line in raw[start..end].split_inclusive('\n') {
        cursor += line.len();
        if !line.trim().is_empty() {
            content_end = cursor;
        }
    }

    let head = &raw[..start];
    let tail = &raw[content_end..];

    let mut expected = root.clone();
    expected.remove(TENANTS_KEY);
    let rest = format!("{head}{tail}");
    let siblings = match serde_yaml::from_str::<Value>(&rest).ok()? {
        Value::Null => Mapping::new(),
        Value::Mapping(map) => map,
        _ => return None,
    };
    if siblings != expected {
        return None;
    }

    Some(Layout::Spliced {
        head: head.to_string(),
        tail: tail.to_string(),
        block: split_tenants(&raw[start..content_end], tenants),
    })
}

/// Split a block-style `tenants:` section into one chunk of lines per tenant
///
/// Returns `None` for flow-style sections or when the chunks do not parse back
/// to the decoded tenants one for one; the whole block is then re-serialized.
fn split_tenants(block: &str, tenants: &TenantMap) -> Option<BlockLayout> {
    let mut lines = block.split_inclusive('\n');
    let key_line = lines.next()?;
    let (_, value) = key_line.split_once(':')?;
    let value = value.trim();
    if !(value.is_empty() || value.starts_with('#')) {
        return None;
    }

    let mut header = key_line.to_string();
    let mut indent = None;
    let mut raw_chunks: Vec<String> = Vec::new();

    for line in lines {
        let content = line.trim_start_matches(' ');
        let width = line.len() - content.len();

        if content.trim().is_empty() || content.starts_with('#') {
            match raw_chunks.last_mut() {
                Some(chunk) => chunk.push_str(line),
                None => header.push_str(line),
            }
            continue;
        }

        let tenant_indent = *indent.get_or_insert(width);
        if width == tenant_indent {
            raw_chunks.push(line.to_string());
        } else if width > tenant_indent {
            raw_chunks.last_mut()?.push_str(line);
        } else {
            return None;
        }
    }

    if raw_chunks.len() != tenants.len() {
        return None;
    }

    let indent = indent.unwrap_or(2);
    let pad = " ".repeat(indent);
    let mut chunks = Vec::with_capacity(raw_chunks.len());

    for (raw, (tenant, config)) in raw_chunks.into_iter().zip(tenants) {
        let dedented: String = raw
            .split_inclusive('\n')
            .map(|line| {
                line.strip_prefix(pad.as_str())
                    .unwrap_or_else(|| line.trim_start_matches(' '))
            })
            .collect();

        let parsed = match serde_yaml::from_str::<Value>(&dedented).ok()? {
            Value::Mapping(map) if map.len() == 1 => map,
            _ => return None,
        };
        let (key, body) = parsed.iter().next()?;
        if scalar_text(key)?.as_str() != tenant {
            return None;
        }

        let reusable = chunk_matches(body, config);
        chunks.push(TenantChunk {
            tenant: tenant.clone(),
            config: config.clone(),
            raw: reusable.then_some(raw),
        });
    }

    Some(BlockLayout {
        header,
        indent,
        chunks,
    })
}

/// True if `body` holds exactly the entries of `config`, nothing dropped on decode
fn chunk_matches(body: &Value, config: &TenantConfig) -> bool {
    match body {
        Value::Null => config.is_empty(),
        Value::Mapping(map) => {
            map.len() == config.len()
                && map.iter().zip(config.iter()).all(|((key, value), (metric, stored))| {
                    scalar_text(key).as_deref() == Some(metric)
                        && scalar_text(value).is_some_and(|text| ThresholdValue::parse(&text) == *stored)
                })
        }
        _ => false,
    }
}

/// A column-0 `tenants:` key, optionally quoted
fn is_tenants_key_line(line: &str) -> bool {
    let rest = ["tenants", "\"tenants\"", "'tenants'"]
        .iter()
        .find_map(|key| line.strip_prefix(key));

    let Some(rest) = rest else {
        return false;
    };
    let Some(after_colon) = rest.trim_start_matches([' ', '\t']).strip_prefix(':') else {
        return false;
    };
    after_colon.is_empty() || after_colon.starts_with([' ', '\t', '\r', '\n'])
}

/// A line that starts a new top-level node (key, comment, or document marker)
fn starts_top_level(line: &str) -> bool {
    line.chars()
        .next()
        .is_some_and(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// Text form of a scalar; numbers and booleans keep their literal rendering
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Threshold overrides, managed by tenantctl
defaults:
  mysql_connections: 80
  mysql_cpu: 80   # percent
state_filters:
  container_crashloop:
    reasons: [\"CrashLoopBackOff\"]
    severity: critical
tenants:
  db-a:
    mysql_connections: \"70\"
    container_cpu: \"70:critical\"
  db-b:
    mysql_connections: disable

# trailing notes stay put
";

    fn tenant_keys(doc: &ThresholdDocument) -> Vec<String> {
        doc.tenants().unwrap().keys().cloned().collect()
    }

    #[test]
    fn test_decode_reads_tenants_in_order() {
        let doc = decode(SAMPLE).unwrap();

        assert_eq!(tenant_keys(&doc), vec!["db-a", "db-b"]);
        assert_eq!(doc.get("db-a", "mysql_connections").unwrap().to_string(), "70");
        let cpu = doc.get("db-a", "container_cpu").unwrap();
        assert_eq!(cpu.magnitude(), "70");
        assert_eq!(cpu.priority(), Some("critical"));
        assert!(doc.get("db-b", "mysql_connections").unwrap().is_disabled());
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(matches!(decode(""), Err(DecodeError::Empty)));
        assert!(matches!(decode("  \n\t\n"), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_malformed_fails() {
        assert!(matches!(decode("tenants: [unclosed"), Err(DecodeError::Syntax(_))));
    }

    #[test]
    fn test_decode_non_mapping_root_fails() {
        assert!(matches!(
            decode("- a\n- b\n"),
            Err(DecodeError::NotAMapping { found: "a sequence" })
        ));
    }

    #[test]
    fn test_decode_rejects_nested_values() {
        let err = decode("tenants:\n  db-a:\n    cpu: [1, 2]\n").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTenants { .. }));
        assert!(err.to_string().contains("db-a"));
    }

    #[test]
    fn test_decode_accepts_unquoted_scalars() {
        let doc = decode("tenants:\n  db-a:\n    cpu: 80\n    ratio: 0.5\n").unwrap();
        assert_eq!(doc.get("db-a", "cpu").unwrap().to_string(), "80");
        assert_eq!(doc.get("db-a", "ratio").unwrap().to_string(), "0.5");
    }

    #[test]
    fn test_decode_null_tenant_body_is_empty() {
        let doc = decode("tenants:\n  db-a:\n").unwrap();
        assert!(doc.tenant("db-a").unwrap().is_empty());
    }

    #[test]
    fn test_decode_drops_stored_default() {
        let doc = decode("tenants:\n  db-a:\n    cpu: Default\n    mem: \"60\"\n").unwrap();
        assert!(doc.get("db-a", "cpu").is_none());
        assert!(doc.get("db-a", "mem").is_some());
    }

    #[test]
    fn test_missing_tenants_is_not_initialized() {
        let raw = "defaults:\n  mysql_cpu: 80\n";
        let doc = decode(raw).unwrap();

        assert!(!doc.has_tenants());
        assert_eq!(encode(&doc).unwrap(), raw);
    }

    #[test]
    fn test_encode_preserves_surrounding_text_byte_for_byte() {
        let mut doc = decode(SAMPLE).unwrap();
        doc.tenants_mut()
            .get_mut("db-b")
            .unwrap()
            .insert("mysql_cpu", ThresholdValue::parse("40"));

        let out = encode(&doc).unwrap();
        let block_start = SAMPLE.find("tenants:").unwrap();
        assert!(out.starts_with(&SAMPLE[..block_start]));
        assert!(out.ends_with("\n# trailing notes stay put\n"));
        assert!(out.contains("  mysql_cpu: 80   # percent\n"));
    }

    #[test]
    fn test_untouched_tenants_keep_their_lines() {
        let raw = "tenants:\n  # primary\n  db-a:\n    cpu: \"70\"   # tuned 2024-03\n\n  db-b: {mem: \"60\"}\n";
        let mut doc = decode(raw).unwrap();
        doc.tenants_mut()
            .get_mut("db-a")
            .unwrap()
            .insert("cpu", ThresholdValue::parse("75"));

        let out = encode(&doc).unwrap();
        assert!(out.starts_with("tenants:\n  # primary\n  db-a:\n"));
        assert!(out.ends_with("  db-b: {mem: \"60\"}\n"), "{out}");
        assert!(!out.contains("tuned"));
        assert_eq!(decode(&out).unwrap().get("db-a", "cpu").unwrap().to_string(), "75");
    }

    #[test]
    fn test_unmodified_document_encodes_to_identical_text() {
        assert_eq!(encode(&decode(SAMPLE).unwrap()).unwrap(), SAMPLE);
    }

    #[test]
    fn test_encode_is_block_style() {
        let doc = ThresholdDocument::new()
            .with_tenant("db-a", [("cpu", "80"), ("mem", "70:high")].into_iter().collect());

        let out = encode(&doc).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "tenants:");
        assert_eq!(lines[1], "  db-a:");
        assert!(lines[2].starts_with("    cpu: "));
        assert!(lines[3].starts_with("    mem: "));
        assert!(!out.contains('{'));
    }

    #[test]
    fn test_new_keys_are_appended() {
        let mut doc = decode(SAMPLE).unwrap();
        doc.tenants_mut().insert("db-0".to_string(), TenantConfig::new());
        doc.tenants_mut()
            .get_mut("db-a")
            .unwrap()
            .insert("aaa_first_alphabetically", ThresholdValue::parse("1"));

        let redecoded = decode(&encode(&doc).unwrap()).unwrap();
        assert_eq!(tenant_keys(&redecoded), vec!["db-a", "db-b", "db-0"]);
        let metrics: Vec<&str> = redecoded.tenant("db-a").unwrap().iter().map(|(k, _)| k).collect();
        assert_eq!(metrics, vec!["mysql_connections", "container_cpu", "aaa_first_alphabetically"]);
    }

    #[test]
    fn test_round_trip_law() {
        let documents = [
            decode(SAMPLE).unwrap(),
            decode("tenants: {}\n").unwrap(),
            decode("defaults:\n  cpu: 1\ntenants:\n  '123':\n    x: \"a:b\"\n").unwrap(),
            ThresholdDocument::new(),
            ThresholdDocument::new().with_tenant("db-z", TenantConfig::new()),
        ];

        for doc in documents {
            let encoded = encode(&doc).unwrap();
            assert_eq!(decode(&encoded).unwrap(), doc, "round trip failed for:\n{encoded}");
        }
    }

    #[test]
    fn test_round_trip_after_initializing_missing_section() {
        let mut doc = decode("defaults:\n  cpu: 1").unwrap();
        doc.tenants_mut()
            .insert("db-a".to_string(), [("cpu", "80")].into_iter().collect());

        let encoded = encode(&doc).unwrap();
        assert!(encoded.starts_with("defaults:\n  cpu: 1\ntenants:\n"));
        assert_eq!(decode(&encoded).unwrap(), doc);
    }

    #[test]
    fn test_flow_document_is_rebuilt() {
        let mut doc = decode("{defaults: {cpu: 80}, tenants: {db-a: {cpu: '70'}}}").unwrap();
        assert!(matches!(doc.layout, Layout::Rebuilt { .. }));

        doc.tenants_mut()
            .get_mut("db-a")
            .unwrap()
            .insert("mem", ThresholdValue::parse("50"));
        let encoded = encode(&doc).unwrap();
        let root: Value = serde_yaml::from_str(&encoded).unwrap();

        assert_eq!(root["defaults"]["cpu"], Value::from(80));
        assert_eq!(root["tenants"]["db-a"]["mem"], Value::from("50"));
        assert_eq!(decode(&encoded).unwrap().tenants(), doc.tenants());
    }

    #[test]
    fn test_tenants_key_line_detection() {
        assert!(is_tenants_key_line("tenants:\n"));
        assert!(is_tenants_key_line("tenants: {}\n"));
        assert!(is_tenants_key_line("\"tenants\":\n"));
        assert!(is_tenants_key_line("tenants :\n"));
        assert!(is_tenants_key_line("tenants:"));
        assert!(!is_tenants_key_line("  tenants:\n"));
        assert!(!is_tenants_key_line("tenants_extra:\n"));
        assert!(!is_tenants_key_line("# tenants:\n"));
    }
}
