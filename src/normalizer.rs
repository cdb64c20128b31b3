// Normalization of the two legacy company schemas into the canonical record
// returned to clients and kept in the resilience cache.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub const HEADER_V1: &str = "application/x-company-v1";
pub const HEADER_V2: &str = "application/x-company-v2";

const LEGACY_MEDIA_TYPES: [&str; 2] = [HEADER_V1, HEADER_V2];

#[derive(Error, Debug)]
pub enum NormalizationError {
    #[error("malformed upstream body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("upstream body matches neither legacy schema")]
    UnrecognizedShape,
}

// Data structures for the legacy provider bodies
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct V1Company {
    #[serde(default, rename = "cn")]
    pub company_name: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub closed_on: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct V2Company {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default, rename = "tin")]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub dissolved_on: Option<String>,
}

impl V1Company {
    fn is_populated(&self) -> bool {
        [&self.company_name, &self.created_on, &self.closed_on]
            .into_iter()
            .any(has_text)
    }
}

impl V2Company {
    fn is_populated(&self) -> bool {
        [&self.company_name, &self.tax_id, &self.dissolved_on]
            .into_iter()
            .any(has_text)
    }
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.is_empty())
}

/// The structurally matched legacy shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaVariant {
    V1(V1Company),
    V2(V2Company),
}

impl SchemaVariant {
    /// Parses the body as both shapes and keeps the populated one. V1 is
    /// checked first, so it wins when both populate. A repeated key keeps its
    /// last value.
    pub fn detect(body: &[u8]) -> Result<Self, NormalizationError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;

        let v1 = V1Company::deserialize(&value);
        let v2 = V2Company::deserialize(&value);

        match (v1, v2) {
            (Ok(v1), _) if v1.is_populated() => Ok(SchemaVariant::V1(v1)),
            (_, Ok(v2)) if v2.is_populated() => Ok(SchemaVariant::V2(v2)),
            (Err(e), Err(_)) => Err(NormalizationError::MalformedBody(e)),
            _ => Err(NormalizationError::UnrecognizedShape),
        }
    }

    fn company_name(&self) -> Option<&str> {
        match self {
            SchemaVariant::V1(v1) => v1.company_name.as_deref(),
            SchemaVariant::V2(v2) => v2.company_name.as_deref(),
        }
    }

    fn closing_date(&self) -> Option<&str> {
        match self {
            SchemaVariant::V1(v1) => v1.closed_on.as_deref(),
            SchemaVariant::V2(v2) => v2.dissolved_on.as_deref(),
        }
    }
}

/// Unified company representation, serialized identically for the cache and
/// for the client response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalCompanyRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(rename = "actived", skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rfc3339"
    )]
    pub active_until: Option<DateTime<FixedOffset>>,
}

// Keeps the offset the provider sent, renders UTC as `Z` and drops trailing
// zeros from fractional seconds.
fn format_rfc3339(ts: &DateTime<FixedOffset>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();

    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }

    if ts.offset().local_minus_utc() == 0 {
        out.push('Z');
    } else {
        out.push_str(&ts.format("%:z").to_string());
    }
    out
}

fn serialize_rfc3339<S>(
    value: &Option<DateTime<FixedOffset>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(ts) => serializer.serialize_str(&format_rfc3339(ts)),
        None => serializer.serialize_none(),
    }
}

impl CanonicalCompanyRecord {
    pub fn from_variant(variant: &SchemaVariant, now: DateTime<Utc>) -> Self {
        let name = variant.company_name().unwrap_or_default().to_string();

        // An unparsable or missing closing date leaves both fields unset.
        match variant
            .closing_date()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        {
            Some(until) => Self {
                name,
                active: Some(until.with_timezone(&Utc) > now),
                active_until: Some(until),
            },
            None => Self {
                name,
                active: None,
                active_until: None,
            },
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Declared-version gate: at least one Content-Type token must be one of the
/// legacy media types. Independent from the structural detection.
pub fn validate_declared_version<I, S>(content_types: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    content_types.into_iter().any(|value| {
        value
            .as_ref()
            .split(',')
            .map(str::trim)
            .any(|token| LEGACY_MEDIA_TYPES.contains(&token))
    })
}

pub fn normalize(body: &[u8]) -> Result<CanonicalCompanyRecord, NormalizationError> {
    normalize_at(body, Utc::now())
}

// `now` is injected so activity can be checked against a fixed instant.
pub fn normalize_at(
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<CanonicalCompanyRecord, NormalizationError> {
    let variant = SchemaVariant::detect(body)?;
    Ok(CanonicalCompanyRecord::from_variant(&variant, now))
}
