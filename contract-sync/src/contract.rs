//! Contract documents and their content fingerprints.
//!
//! A fingerprint is the SHA-256 of the document's canonical form: the payload
//! decoded to a JSON value and re-serialised compactly with sorted keys.
//! Re-indenting a document, reordering its keys, or switching between JSON
//! and YAML therefore leaves the fingerprint unchanged.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use contract_sync_core::types::{DocumentFormat, Fingerprint, SourceLocation};

use crate::error::FetchError;

/// Encoding a payload was actually decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Yaml,
}

impl Encoding {
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Yaml => "yaml",
        }
    }
}

/// One retrieved version of the remote API description. Never mutated.
#[derive(Debug, Clone)]
pub struct Contract {
    raw: Vec<u8>,
    document: Value,
    encoding: Encoding,
    fingerprint: Fingerprint,
    source: SourceLocation,
    retrieved_at: DateTime<Utc>,
}

impl Contract {
    /// Decode and validate `raw`, stamping it with the current time.
    pub fn parse(
        raw: Vec<u8>,
        format: DocumentFormat,
        source: SourceLocation,
    ) -> Result<Self, FetchError> {
        Self::parse_at(raw, format, source, Utc::now())
    }

    pub fn parse_at(
        raw: Vec<u8>,
        format: DocumentFormat,
        source: SourceLocation,
        retrieved_at: DateTime<Utc>,
    ) -> Result<Self, FetchError> {
        let malformed = |reason: String| FetchError::Malformed {
            location: source.to_string(),
            reason,
        };

        let (document, encoding) = decode(&raw, format).map_err(malformed)?;
        validate(&document).map_err(malformed)?;
        let fingerprint = fingerprint_of(&document);

        Ok(Self {
            raw,
            document,
            encoding,
            fingerprint,
            source,
            retrieved_at,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn source(&self) -> &SourceLocation {
        &self.source
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }

    /// `openapi` (3.x) or `swagger` (2.0) field.
    pub fn spec_version(&self) -> Option<&str> {
        self.document
            .get("openapi")
            .or_else(|| self.document.get("swagger"))
            .and_then(Value::as_str)
    }

    /// `info.version`, the API's own version label.
    pub fn api_version(&self) -> Option<&str> {
        self.document
            .get("info")
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
    }

    /// Pretty canonical JSON, used for snapshots and diffs.
    pub fn canonical_pretty(&self) -> String {
        canonical_pretty(&self.document)
    }
}

fn decode(raw: &[u8], format: DocumentFormat) -> Result<(Value, Encoding), String> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    match format {
        DocumentFormat::Json => serde_json::from_slice(raw)
            .map(|v| (v, Encoding::Json))
            .map_err(|e| format!("invalid JSON: {e}")),
        DocumentFormat::Yaml => decode_yaml(raw)
            .map(|v| (v, Encoding::Yaml))
            .map_err(|e| format!("invalid YAML: {e}")),
        DocumentFormat::Auto => match serde_json::from_slice(raw) {
            Ok(v) => Ok((v, Encoding::Json)),
            Err(json_err) => decode_yaml(raw)
                .map(|v| (v, Encoding::Yaml))
                .map_err(|yaml_err| {
                    format!("neither JSON ({json_err}) nor YAML ({yaml_err})")
                }),
        },
    }
}

// YAML allows non-string keys (`200:` under `responses`), JSON does not.
fn decode_yaml(raw: &[u8]) -> Result<Value, String> {
    let value: serde_yaml::Value = serde_yaml::from_slice(raw).map_err(|e| e.to_string())?;
    yaml_to_json(value)
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("number {n} has no JSON representation"))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported mapping key {other:?}")),
                };
                out.insert(key, yaml_to_json(value)?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn validate(document: &Value) -> Result<(), String> {
    let Some(map) = document.as_object() else {
        return Err("top-level value is not a mapping".to_string());
    };
    let version = map
        .get("openapi")
        .or_else(|| map.get("swagger"))
        .ok_or_else(|| "no `openapi` or `swagger` field".to_string())?;
    if !version.is_string() {
        return Err("`openapi`/`swagger` field is not a string".to_string());
    }
    Ok(())
}

/// Fingerprint of an already-decoded document.
pub fn fingerprint_of(document: &Value) -> Fingerprint {
    let canonical = serde_json::to_vec(&Canonical(document))
        .unwrap_or_else(|_| document.to_string().into_bytes());
    let mut h = Sha256::new();
    h.update(&canonical);
    Fingerprint(hex::encode(h.finalize()))
}

pub(crate) fn canonical_pretty(document: &Value) -> String {
    let mut out = serde_json::to_string_pretty(&Canonical(document))
        .unwrap_or_else(|_| document.to_string());
    out.push('\n');
    out
}

/// Serializes a value with object keys in sorted order at every depth,
/// whatever map ordering `serde_json` was built with.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Canonical(value))?;
                }
                out.end()
            }
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
            scalar => scalar.serialize(serializer),
        }
    }
}
