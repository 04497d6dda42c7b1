use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

/// Resolver host used when none is configured.
pub const DEFAULT_RESOLVER_DOMAIN: &str = "dx.doi.org";

/// Everything outside the RFC 3986 unreserved set is escaped, including the `/` between prefix
/// and suffix.
const RESOLVER_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `10.` + dotted digit groups + `/` + visible characters other than `"`, `&` and `'`.
const DOI_BODY: &str = r#"10\.\d+(?:\.\d+)*/[^\s"&'\p{C}]+"#;

static DOI_ANYWHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"\b{DOI_BODY}")).unwrap());
static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{DOI_BODY}$")).unwrap());

// A literal prefix/suffix separator means the string is not percent-encoded.
static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"10\.\d+(?:\.\d+)*/").unwrap());
static SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^doi:\s*").unwrap());
static RESOLVER_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://(?:dx\.)?doi\.org/").unwrap());
// `?` is legal inside a suffix, so only a `key=value` tail counts as a query string.
static QUERY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\?[^=]+=.*$").unwrap());

/// Publisher landing-page noise, each applied once and in this order.
static STRIP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/(?:abstract|asset|issuetoc).*$",
        r"\.pdf$",
        r"/(?:standard|pdf/standard|fulltext\.html|pdf|epdf|meta|full|dynaTraceMonitor|references|issues)$",
        r"/cite/[a-z]+$",
        r";jsessionid.+$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

// Vendor conventions: j.NNNN-NNNX, issn.NNNN-NNNX, SNNNN-NNNX (ScienceDirect), (ISSN)NNNN-NNNX.
static ISSN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:j\.|issn\.|S|\(ISSN\))?(\d{4}-\d{3}[\dX])\b").unwrap());

/// Strip resolver URLs, scheme markers, query strings and known publisher URL suffixes from `raw`.
///
/// The result is not guaranteed to be a DOI; use [`is_valid`] for that.
pub fn normalize(raw: &str) -> String {
    normalize_with(raw, DEFAULT_RESOLVER_DOMAIN)
}

/// [`normalize`], also stripping URLs on the resolver at `domain`.
pub fn normalize_with(raw: &str, domain: &str) -> String {
    let mut s = raw.trim().to_string();

    if !SEPARATOR_RE.is_match(&s) {
        s = percent_decode_str(&s).decode_utf8_lossy().into_owned();
    }

    s = SCHEME_RE.replace(&s, "").into_owned();
    s = RESOLVER_PREFIX_RE.replace(&s, "").into_owned();
    if let Some(rest) = strip_resolver(&s, domain) {
        s = rest.to_string();
    }
    s = QUERY_RE.replace(&s, "").into_owned();
    if let Some(rest) = s.strip_suffix('/') {
        s = rest.to_string();
    }
    for pattern in STRIP_PATTERNS.iter() {
        s = pattern.replace(&s, "").into_owned();
    }
    s
}

/// `s` without a leading `http(s)://{domain}/`, compared case-insensitively.
fn strip_resolver<'a>(s: &'a str, domain: &str) -> Option<&'a str> {
    let rest = ["https://", "http://"].iter().find_map(|scheme| {
        s.get(..scheme.len())
            .filter(|head| head.eq_ignore_ascii_case(scheme))
            .map(|_| &s[scheme.len()..])
    })?;
    let host = rest.get(..domain.len())?;
    if domain.is_empty() || !host.eq_ignore_ascii_case(domain) {
        return None;
    }
    rest[domain.len()..].strip_prefix('/')
}

/// Whether `raw` normalises to a string that is a DOI from start to end.
pub fn is_valid(raw: &str) -> bool {
    DOI_RE.is_match(&normalize(raw))
}

/// Find every DOI in `text`, normalised. Matches that stop being valid after normalisation are
/// dropped.
pub fn extract_all(text: &str) -> Vec<String> {
    let text = percent_decode_str(text).decode_utf8_lossy();
    DOI_ANYWHERE_RE
        .find_iter(&text)
        .map(|m| normalize(m.as_str()))
        .filter(|doi| DOI_RE.is_match(doi))
        .collect()
}

/// A validated, normalised DOI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Doi(String);

impl Doi {
    pub fn new(raw: &str) -> Result<Self> {
        Doi::with_resolver(raw, DEFAULT_RESOLVER_DOMAIN)
    }

    /// [`Doi::new`], also accepting URLs on the resolver at `domain`.
    pub fn with_resolver(raw: &str, domain: &str) -> Result<Self> {
        let normalized = normalize_with(raw, domain);
        if DOI_RE.is_match(&normalized) {
            Ok(Doi(normalized))
        } else {
            Err(Error::InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Registrant part, e.g. `10.1037` or `10.1234.56`.
    pub fn prefix(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(p, _)| p)
    }

    /// Everything after the first `/`; may itself contain slashes.
    pub fn suffix(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, s)| s)
    }

    /// Recover an ISSN embedded in the suffix by common publisher conventions.
    pub fn issn_from_suffix(&self) -> Option<&str> {
        ISSN_RE
            .captures(self.suffix())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// `https://{domain}/{percent-encoded DOI}`.
    pub fn resolver_url(&self, domain: &str) -> Result<Url> {
        let raw = format!(
            "https://{domain}/{}",
            utf8_percent_encode(&self.0, RESOLVER_PATH_ENCODE_SET)
        );
        Url::parse(&raw).map_err(|e| Error::Transport {
            url: raw,
            source: Box::new(e),
        })
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Doi {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Doi::new(s)
    }
}

impl AsRef<str> for Doi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
