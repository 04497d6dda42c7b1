use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{PoisonError, RwLock},
};

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value, json};

use crate::{
    error::Result,
    translator::{self, Format, Translator, csl_json::CslJson, unixref::Unixref},
};

/// Text-valued metadata fields, resolved independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Doi,
    Url,
    FulltextUrl,
    JournalTitle,
    JournalIsoabbrevTitle,
    BookTitle,
    BookSeriesTitle,
    ConferenceTitle,
    ConferenceSeriesTitle,
    ArticleTitle,
    ChapterTitle,
    ChapterNumber,
    Issn,
    Eissn,
    Isbn,
    Eisbn,
    PublisherName,
    PublisherPlace,
    Volume,
    Issue,
    Pagination,
}

impl Field {
    /// Fields that appear verbatim in [`MetadataRecord::to_map`]. The publisher sub-fields are
    /// folded into `publisher` instead.
    const FLATTENED: [Field; 19] = [
        Field::Doi,
        Field::Url,
        Field::FulltextUrl,
        Field::JournalTitle,
        Field::JournalIsoabbrevTitle,
        Field::BookTitle,
        Field::BookSeriesTitle,
        Field::ConferenceTitle,
        Field::ConferenceSeriesTitle,
        Field::ArticleTitle,
        Field::ChapterTitle,
        Field::ChapterNumber,
        Field::Issn,
        Field::Eissn,
        Field::Isbn,
        Field::Eisbn,
        Field::Volume,
        Field::Issue,
        Field::Pagination,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Doi => "doi",
            Field::Url => "url",
            Field::FulltextUrl => "fulltext_url",
            Field::JournalTitle => "journal_title",
            Field::JournalIsoabbrevTitle => "journal_isoabbrev_title",
            Field::BookTitle => "book_title",
            Field::BookSeriesTitle => "book_series_title",
            Field::ConferenceTitle => "conference_title",
            Field::ConferenceSeriesTitle => "conference_series_title",
            Field::ArticleTitle => "article_title",
            Field::ChapterTitle => "chapter_title",
            Field::ChapterNumber => "chapter_number",
            Field::Issn => "issn",
            Field::Eissn => "eissn",
            Field::Isbn => "isbn",
            Field::Eisbn => "eisbn",
            Field::PublisherName => "publisher_name",
            Field::PublisherPlace => "publisher_place",
            Field::Volume => "volume",
            Field::Issue => "issue",
            Field::Pagination => "pagination",
        }
    }
}

/// The role a person played. Sources that do not say get [`Role::UNSPECIFIED`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Author,
    Editor,
    Other(String),
}

impl Role {
    pub const UNSPECIFIED: &'static str = "n/a";

    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(l) if l.eq_ignore_ascii_case("author") => Role::Author,
            Some(l) if l.eq_ignore_ascii_case("editor") => Role::Editor,
            Some(l) if !l.is_empty() => Role::Other(l.to_string()),
            _ => Role::Other(Self::UNSPECIFIED.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Author => "author",
            Role::Editor => "editor",
            Role::Other(label) => label,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub role: Role,
    /// 1-based position among contributors sharing `role`.
    pub sequence: usize,
}

impl Contributor {
    pub fn to_value(&self) -> Value {
        json!({
            "given_name": self.given_name,
            "surname": self.surname,
            "role": self.role.as_str(),
            "sequence": self.sequence,
        })
    }
}

/// Assign sequence numbers with an independent counter per role, in input order.
pub(crate) fn number_by_role(
    people: impl IntoIterator<Item = (Option<String>, Option<String>, Role)>,
) -> Vec<Contributor> {
    let mut counters: HashMap<Role, usize> = HashMap::new();
    people
        .into_iter()
        .map(|(given_name, surname, role)| {
            let counter = counters.entry(role.clone()).or_insert(0);
            *counter += 1;
            Contributor {
                given_name,
                surname,
                role,
                sequence: *counter,
            }
        })
        .collect()
}

/// A date where only the year is guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PartialDate {
    /// Build from raw numbers as found in a document; out-of-range values give `None`.
    pub fn from_numbers(year: i64, month: Option<i64>, day: Option<i64>) -> Option<Self> {
        Some(PartialDate {
            year: i32::try_from(year).ok()?,
            month: month.map(u32::try_from).transpose().ok()?,
            day: day.map(u32::try_from).transpose().ok()?,
        })
    }

    /// Calendar date with `1` standing in for a missing month or day. `None` if the parts do
    /// not form a real date.
    pub fn to_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }

    pub fn to_value(self) -> Value {
        json!({ "year": self.year, "month": self.month, "day": self.day })
    }
}

/// Publication type predicates, computed once per document by its translator.
///
/// Journal-family and book-family predicates are meant to be exclusive within their family;
/// `conference_proceeding` can co-occur with the book family for some vendors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub journal: bool,
    pub journal_article: bool,
    pub book: bool,
    pub book_series: bool,
    pub book_chapter: bool,
    pub conference_proceeding: bool,
}

impl Classification {
    /// Collapse the predicates into one tag, checking them in priority order.
    pub fn kind(&self) -> DocumentKind {
        if self.journal_article {
            DocumentKind::JournalArticle
        } else if self.journal {
            DocumentKind::Journal
        } else if self.book_chapter {
            DocumentKind::BookChapter
        } else if self.book_series {
            DocumentKind::BookSeries
        } else if self.book {
            DocumentKind::Book
        } else if self.conference_proceeding {
            DocumentKind::ConferenceProceeding
        } else {
            DocumentKind::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    JournalArticle,
    Journal,
    BookChapter,
    BookSeries,
    Book,
    ConferenceProceeding,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum People {
    Authors,
    Editors,
    All,
}

/// Uniform metadata for one parsed document.
///
/// Every field is resolved on first access and cached for the lifetime of the record; a field
/// that cannot be resolved is `None` and does not affect any other field. Records are safe to
/// share between threads.
pub struct MetadataRecord {
    translator: Box<dyn Translator>,
    texts: RwLock<HashMap<Field, Option<String>>>,
    people: RwLock<HashMap<People, Vec<Contributor>>>,
    date_parts: OnceCell<Option<PartialDate>>,
}

impl fmt::Debug for MetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRecord")
            .field("format", &self.format())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

fn memo<K, V>(cache: &RwLock<HashMap<K, V>>, key: K, compute: impl FnOnce() -> V) -> V
where
    K: Eq + Hash,
    V: Clone,
{
    if let Some(hit) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return hit.clone();
    }
    let value = compute();
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key)
        .or_insert(value)
        .clone()
}

impl MetadataRecord {
    pub fn new(translator: Box<dyn Translator>) -> Self {
        MetadataRecord {
            translator,
            texts: RwLock::new(HashMap::new()),
            people: RwLock::new(HashMap::new()),
            date_parts: OnceCell::new(),
        }
    }

    /// Pick a parser from `content_type` and parse `body` with it.
    pub fn parse(content_type: &str, body: &str) -> Result<Self> {
        translator::for_content_type(content_type, body).map(MetadataRecord::new)
    }

    pub fn from_csl_json(body: &str) -> Result<Self> {
        Ok(MetadataRecord::new(Box::new(CslJson::parse(body)?)))
    }

    pub fn from_unixref_xml(body: &str) -> Result<Self> {
        Ok(MetadataRecord::new(Box::new(Unixref::parse(body)?)))
    }

    pub fn format(&self) -> Format {
        self.translator.format()
    }

    /// The raw document this record was parsed from.
    pub fn source(&self) -> &str {
        self.translator.source()
    }

    pub fn classification(&self) -> Classification {
        self.translator.classification()
    }

    pub fn kind(&self) -> DocumentKind {
        self.classification().kind()
    }

    pub fn is_journal(&self) -> bool {
        self.classification().journal
    }

    pub fn is_journal_article(&self) -> bool {
        self.classification().journal_article
    }

    pub fn is_book(&self) -> bool {
        self.classification().book
    }

    pub fn is_book_series(&self) -> bool {
        self.classification().book_series
    }

    pub fn is_book_chapter(&self) -> bool {
        self.classification().book_chapter
    }

    pub fn is_conference_proceeding(&self) -> bool {
        self.classification().conference_proceeding
    }

    pub fn get(&self, field: Field) -> Option<String> {
        memo(&self.texts, field, || self.translator.text(field))
    }

    pub fn doi(&self) -> Option<String> {
        self.get(Field::Doi)
    }

    pub fn url(&self) -> Option<String> {
        self.get(Field::Url)
    }

    pub fn fulltext_url(&self) -> Option<String> {
        self.get(Field::FulltextUrl)
    }

    pub fn journal_title(&self) -> Option<String> {
        self.get(Field::JournalTitle)
    }

    pub fn journal_isoabbrev_title(&self) -> Option<String> {
        self.get(Field::JournalIsoabbrevTitle)
    }

    pub fn book_title(&self) -> Option<String> {
        self.get(Field::BookTitle)
    }

    pub fn book_series_title(&self) -> Option<String> {
        self.get(Field::BookSeriesTitle)
    }

    pub fn conference_title(&self) -> Option<String> {
        self.get(Field::ConferenceTitle)
    }

    pub fn conference_series_title(&self) -> Option<String> {
        self.get(Field::ConferenceSeriesTitle)
    }

    pub fn article_title(&self) -> Option<String> {
        self.get(Field::ArticleTitle)
    }

    pub fn chapter_title(&self) -> Option<String> {
        self.get(Field::ChapterTitle)
    }

    pub fn chapter_number(&self) -> Option<String> {
        self.get(Field::ChapterNumber)
    }

    pub fn issn(&self) -> Option<String> {
        self.get(Field::Issn)
    }

    pub fn eissn(&self) -> Option<String> {
        self.get(Field::Eissn)
    }

    pub fn isbn(&self) -> Option<String> {
        self.get(Field::Isbn)
    }

    pub fn eisbn(&self) -> Option<String> {
        self.get(Field::Eisbn)
    }

    pub fn publisher_name(&self) -> Option<String> {
        self.get(Field::PublisherName)
    }

    pub fn publisher_place(&self) -> Option<String> {
        self.get(Field::PublisherPlace)
    }

    /// `"{name}; {place}"`, or just the name. Without a name there is no publisher, even if a
    /// place is known.
    pub fn publisher(&self) -> Option<String> {
        let name = self.publisher_name()?;
        Some(match self.publisher_place() {
            Some(place) => format!("{name}; {place}"),
            None => name,
        })
    }

    pub fn volume(&self) -> Option<String> {
        self.get(Field::Volume)
    }

    pub fn issue(&self) -> Option<String> {
        self.get(Field::Issue)
    }

    pub fn pagination(&self) -> Option<String> {
        self.get(Field::Pagination)
    }

    pub fn publication_date_parts(&self) -> Option<PartialDate> {
        *self.date_parts.get_or_init(|| self.translator.date_parts())
    }

    pub fn publication_date(&self) -> Option<NaiveDate> {
        self.publication_date_parts().and_then(PartialDate::to_date)
    }

    pub fn contributors(&self) -> Vec<Contributor> {
        memo(&self.people, People::All, || self.translator.contributors())
    }

    pub fn authors(&self) -> Vec<Contributor> {
        memo(&self.people, People::Authors, || self.translator.authors())
    }

    pub fn editors(&self) -> Vec<Contributor> {
        memo(&self.people, People::Editors, || self.translator.editors())
    }

    /// Every field by name, absent ones as `null`.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for field in Field::FLATTENED {
            map.insert(field.name().to_string(), json!(self.get(field)));
        }
        map.insert("publisher".to_string(), json!(self.publisher()));
        map.insert(
            "publication_date".to_string(),
            json!(self.publication_date().map(|d| d.to_string())),
        );
        map.insert(
            "publication_date_parts".to_string(),
            self.publication_date_parts()
                .map_or(Value::Null, PartialDate::to_value),
        );
        map.insert(
            "contributors".to_string(),
            Value::Array(self.contributors().iter().map(Contributor::to_value).collect()),
        );
        map
    }
}
