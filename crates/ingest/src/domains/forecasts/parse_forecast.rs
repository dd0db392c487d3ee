use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::KST;

pub const START_MARKER: &str = "#START7777";
pub const END_MARKER: &str = "#7777END";

/// `yyyy.MM.dd.HH:mm`, civil time in KST.
const BULLETIN_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year].[month].[day].[hour]:[minute]");

/// One short-range forecast overview bulletin for a station.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSummary {
    pub tm_fc: OffsetDateTime,
    pub stn_id: i64,
    pub tm_in: Option<OffsetDateTime>,
    pub cnt: Option<i64>,
    pub man_fc: Option<String>,
    pub man_fc_id: Option<String>,
    pub man_in: Option<String>,
    pub man_in_id: Option<String>,
    pub man_ip: Option<String>,
    pub wf_sv1: Option<String>,
    pub wf_sv2: Option<String>,
    pub wf_sv3: Option<String>,
    pub wn: Option<String>,
    pub wr: Option<String>,
    pub rem: Option<String>,
}

impl ForecastSummary {
    pub fn new(tm_fc: OffsetDateTime, stn_id: i64) -> Self {
        Self {
            tm_fc,
            stn_id,
            tm_in: None,
            cnt: None,
            man_fc: None,
            man_fc_id: None,
            man_in: None,
            man_in_id: None,
            man_ip: None,
            wf_sv1: None,
            wf_sv2: None,
            wf_sv3: None,
            wn: None,
            wr: None,
            rem: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BulletinError {
    #[error("bulletin body is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("entry {index}: {reason}")]
    Element { index: usize, reason: String },
    #[error("entry {index}: missing required field {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("entry {index}: {field} {value:?} does not match yyyy.MM.dd.HH:mm")]
    Timestamp {
        index: usize,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Default)]
pub struct BulletinBatch {
    pub records: Vec<ForecastSummary>,
    pub errors: Vec<BulletinError>,
}

#[derive(Debug)]
pub enum BulletinPayload {
    /// The envelope carried no entries.
    NoData,
    Batch(BulletinBatch),
}

/// `fct_afs_ds` carries the entries.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    fct_afs_ds: Option<Value>,
}

/// Wire shape of one entry. Every field is optional here; required fields
/// are enforced when converting into [`ForecastSummary`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBulletin {
    #[serde(deserialize_with = "lenient_int")]
    stn_id: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    tm_fc: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    tm_in: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    cnt: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    man_fc: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    man_fc_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    man_in: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    man_in_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    man_ip: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    wf_sv1: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    wf_sv2: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    wf_sv3: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    wn: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    wr: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    rem: Option<String>,
}

impl RawBulletin {
    fn into_summary(self, index: usize) -> Result<ForecastSummary, BulletinError> {
        let stn_id = self.stn_id.ok_or(BulletinError::MissingField {
            index,
            field: "stn_id",
        })?;
        let tm_fc = self.tm_fc.ok_or(BulletinError::MissingField {
            index,
            field: "tm_fc",
        })?;
        let tm_fc = parse_bulletin_time(index, "tm_fc", &tm_fc)?;
        let tm_in = self
            .tm_in
            .map(|value| parse_bulletin_time(index, "tm_in", &value))
            .transpose()?;

        Ok(ForecastSummary {
            tm_fc,
            stn_id,
            tm_in,
            cnt: self.cnt,
            man_fc: self.man_fc,
            man_fc_id: self.man_fc_id,
            man_in: self.man_in,
            man_in_id: self.man_in_id,
            man_ip: self.man_ip,
            wf_sv1: self.wf_sv1,
            wf_sv2: self.wf_sv2,
            wf_sv3: self.wf_sv3,
            wn: self.wn,
            wr: self.wr,
            rem: self.rem,
        })
    }
}

/// Parse a framed bulletin body.
///
/// A body that is not JSON at all fails as a whole. Entries are decoded one at
/// a time; a bad entry lands in `errors` and the rest are still returned.
pub fn parse_bulletins(body: &str) -> Result<BulletinPayload, BulletinError> {
    let cleaned = strip_markers(body);
    if cleaned.is_empty() {
        return Ok(BulletinPayload::NoData);
    }

    let envelope: Envelope = serde_json::from_str(&quote_bare_keys(&cleaned))?;
    let entries = match envelope.fct_afs_ds {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        _ => return Ok(BulletinPayload::NoData),
    };

    let mut batch = BulletinBatch::default();
    for (index, entry) in entries.into_iter().enumerate() {
        let summary = serde_json::from_value::<RawBulletin>(entry)
            .map_err(|e| BulletinError::Element {
                index,
                reason: e.to_string(),
            })
            .and_then(|raw| raw.into_summary(index));
        match summary {
            Ok(summary) => batch.records.push(summary),
            Err(err) => batch.errors.push(err),
        }
    }

    Ok(BulletinPayload::Batch(batch))
}

fn strip_markers(body: &str) -> String {
    body.replace(START_MARKER, "")
        .replace(END_MARKER, "")
        .trim()
        .to_string()
}

/// Wrap unquoted object keys in double quotes so the text parses as strict JSON.
///
/// A bare word counts as a key when it follows `{` or `,` and is followed by `:`.
/// String literals, including escaped quotes inside them, pass through untouched.
pub fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 32);
    let mut in_string = false;
    let mut escaped = false;
    let mut last_significant: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                last_significant = Some(c);
            }
            i += 1;
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }

        if is_key_start(c) && matches!(last_significant, Some('{') | Some(',')) {
            let start = i;
            while i < chars.len() && is_key_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let next = chars[i..].iter().find(|c| !c.is_whitespace());
            if next == Some(&':') {
                out.push('"');
                out.push_str(&word);
                out.push('"');
            } else {
                out.push_str(&word);
            }
            last_significant = word.chars().last();
            continue;
        }

        if !c.is_whitespace() {
            last_significant = Some(c);
        }
        out.push(c);
        i += 1;
    }

    out
}

fn is_key_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn parse_bulletin_time(
    index: usize,
    field: &'static str,
    value: &str,
) -> Result<OffsetDateTime, BulletinError> {
    PrimitiveDateTime::parse(value.trim(), BULLETIN_TIME_FORMAT)
        .map(|at| at.assume_offset(KST))
        .map_err(|_| BulletinError::Timestamp {
            index,
            field,
            value: value.to_string(),
        })
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("{} is not an integer", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("{:?} is not an integer", s))),
        Some(other) => Err(D::Error::custom(format!("expected integer, got {}", other))),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected text, got {}", other))),
    }
}
