//! Normalized repository records.
//!
//! API payloads are dynamic JSON; [`Repository::parse`] turns one into a fixed
//! schema. Required fields must be present with the right type, optional fields
//! fall back to their defaults, and unknown fields are ignored.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FetchError, ParseError};

const DEFAULT_BRANCH: &str = "main";

/// One starred repository. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub homepage: Option<String>,

    pub stargazers_count: u64,
    pub forks_count: u64,
    pub open_issues_count: u64,
    pub watchers_count: u64,
    pub network_count: u64,
    pub subscribers_count: u64,

    pub language: Option<String>,
    pub topics: BTreeSet<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,

    pub archived: bool,
    pub disabled: bool,
    pub private: bool,
    pub fork: bool,

    /// Size in kilobytes.
    pub size: u64,
    pub default_branch: String,
    pub license: Option<License>,
}

/// Free-form license descriptor as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct License(pub Map<String, Value>);

impl License {
    pub fn spdx_id(&self) -> Option<&str> {
        self.0.get("spdx_id").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Typed field access over one payload object.
struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    /// Present and non-null.
    fn present(&self, field: &'static str) -> Option<&'a Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    fn required_u64(&self, field: &'static str) -> Result<u64, ParseError> {
        let value = self.present(field).ok_or(ParseError::MissingField(field))?;
        value.as_u64().ok_or(ParseError::InvalidType {
            field,
            expected: "non-negative integer",
        })
    }

    fn required_str(&self, field: &'static str) -> Result<String, ParseError> {
        let value = self.present(field).ok_or(ParseError::MissingField(field))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or(ParseError::InvalidType {
                field,
                expected: "string",
            })
    }

    fn optional_str(&self, field: &'static str) -> Result<Option<String>, ParseError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ParseError::InvalidType {
                field,
                expected: "string",
            }),
        }
    }

    fn count(&self, field: &'static str) -> Result<u64, ParseError> {
        match self.present(field) {
            None => Ok(0),
            Some(v) => v.as_u64().ok_or(ParseError::InvalidType {
                field,
                expected: "non-negative integer",
            }),
        }
    }

    fn flag(&self, field: &'static str) -> Result<bool, ParseError> {
        match self.present(field) {
            None => Ok(false),
            Some(v) => v.as_bool().ok_or(ParseError::InvalidType {
                field,
                expected: "boolean",
            }),
        }
    }

    /// Timestamps never fail: anything unparsable is absent.
    fn timestamp(&self, field: &'static str) -> Option<DateTime<Utc>> {
        self.present(field)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }

    fn topics(&self) -> Result<BTreeSet<String>, ParseError> {
        let invalid = ParseError::InvalidType {
            field: "topics",
            expected: "array of strings",
        };
        match self.present("topics") {
            None => Ok(BTreeSet::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or(invalid.clone()))
                .collect(),
            Some(_) => Err(invalid),
        }
    }

    fn license(&self) -> Result<Option<License>, ParseError> {
        match self.present("license") {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(License(map.clone()))),
            Some(_) => Err(ParseError::InvalidType {
                field: "license",
                expected: "object",
            }),
        }
    }
}

impl Repository {
    /// Parse one raw API payload.
    pub fn parse(raw: &Value) -> Result<Self, ParseError> {
        let fields = Fields(raw.as_object().ok_or(ParseError::NotAnObject)?);

        Ok(Self {
            id: fields.required_u64("id")?,
            name: fields.required_str("name")?,
            full_name: fields.required_str("full_name")?,
            description: fields.optional_str("description")?,
            html_url: fields.required_str("html_url")?,
            homepage: fields.optional_str("homepage")?,

            stargazers_count: fields.required_u64("stargazers_count")?,
            forks_count: fields.count("forks_count")?,
            open_issues_count: fields.count("open_issues_count")?,
            watchers_count: fields.count("watchers_count")?,
            network_count: fields.count("network_count")?,
            subscribers_count: fields.count("subscribers_count")?,

            language: fields.optional_str("language")?,
            topics: fields.topics()?,

            created_at: fields.timestamp("created_at"),
            updated_at: fields.timestamp("updated_at"),
            pushed_at: fields.timestamp("pushed_at"),

            archived: fields.flag("archived")?,
            disabled: fields.flag("disabled")?,
            private: fields.flag("private")?,
            fork: fields.flag("fork")?,

            size: fields.count("size")?,
            default_branch: fields
                .optional_str("default_branch")?
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            license: fields.license()?,
        })
    }

    /// Parse a page body: a JSON array of repository payloads.
    ///
    /// Any decoding problem is reported as [`FetchError::MalformedResponse`].
    pub fn parse_page(body: &[u8]) -> Result<Vec<Self>, FetchError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| FetchError::malformed(format!("invalid JSON: {e}")))?;
        let Value::Array(items) = value else {
            return Err(FetchError::malformed("expected a JSON array of repositories"));
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                Self::parse(item)
                    .map_err(|e| FetchError::malformed(format!("repository at index {index}: {e}")))
            })
            .collect()
    }

    /// Owner part of `full_name`.
    pub fn owner(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or("")
    }

    /// Name part of `full_name`, falling back to `name`.
    pub fn repo_name(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.name)
    }
}

/// ISO 8601 timestamp. Values without an offset are taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}
