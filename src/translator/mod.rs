use std::fmt;

use log::debug;

use crate::{
    error::{Error, Result},
    item::{Classification, Contributor, Field, PartialDate, Role},
};

pub mod csl_json;
pub mod unixref;

pub const CSL_JSON: &str = "application/vnd.citationstyles.csl+json";
pub const UNIXREF_XML: &str = "application/vnd.crossref.unixref+xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    CslJson,
    UnixrefXml,
}

impl Format {
    /// The MIME type to put in an `Accept` header for this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Format::CslJson => CSL_JSON,
            Format::UnixrefXml => UNIXREF_XML,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::CslJson => "CSL-JSON",
            Format::UnixrefXml => "UnixRef XML",
        })
    }
}

/// One extraction strategy over one parsed document.
///
/// Construction parses and classifies the document; every other method is a pure lookup that
/// yields `None` (or an empty list) when the document does not carry the field.
pub trait Translator: Send + Sync {
    fn format(&self) -> Format;

    /// The raw text the translator was built from.
    fn source(&self) -> &str;

    fn classification(&self) -> Classification;

    fn text(&self, field: Field) -> Option<String>;

    fn date_parts(&self) -> Option<PartialDate>;

    fn contributors(&self) -> Vec<Contributor>;

    fn authors(&self) -> Vec<Contributor> {
        self.contributors()
            .into_iter()
            .filter(|c| c.role == Role::Author)
            .collect()
    }

    fn editors(&self) -> Vec<Contributor> {
        self.contributors()
            .into_iter()
            .filter(|c| c.role == Role::Editor)
            .collect()
    }
}

/// Trimmed `s`, or `None` when nothing is left.
pub(crate) fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

type ParserFn = fn(&str) -> Result<Box<dyn Translator>>;

fn is_json(essence: &str) -> bool {
    essence.contains("json")
}

fn is_xml(essence: &str) -> bool {
    essence.contains("xml")
}

fn parse_csl_json(body: &str) -> Result<Box<dyn Translator>> {
    Ok(Box::new(csl_json::CslJson::parse(body)?))
}

fn parse_unixref(body: &str) -> Result<Box<dyn Translator>> {
    Ok(Box::new(unixref::Unixref::parse(body)?))
}

/// Content-type matchers and the parser each one selects.
///
/// NOTE: Ordering is important here, as it signifies priority. If two matchers accept a content
/// type, the first one to show up in this list wins.
static PARSERS: &[(fn(&str) -> bool, Format, ParserFn)] = &[
    (is_json, Format::CslJson, parse_csl_json),
    (is_xml, Format::UnixrefXml, parse_unixref),
];

/// Which format a declared content type names, ignoring parameters such as `charset`.
pub fn format_for(content_type: &str) -> Result<Format> {
    lookup(content_type).map(|(format, _)| format)
}

fn lookup(content_type: &str) -> Result<(Format, ParserFn)> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    PARSERS
        .iter()
        .find(|(matches, _, _)| matches(&essence))
        .map(|(_, format, parse)| (*format, *parse))
        .ok_or_else(|| Error::UnsupportedFormat(content_type.to_string()))
}

/// Parse `body` with the translator registered for `content_type`.
pub fn for_content_type(content_type: &str, body: &str) -> Result<Box<dyn Translator>> {
    let (format, parse) = lookup(content_type)?;
    debug!("parsing {} bytes of {content_type} as {format}", body.len());
    parse(body)
}
