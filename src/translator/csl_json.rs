//! CSL-JSON (`application/vnd.citationstyles.csl+json`), as served by DOI registrars.
//!
//! Format docs: <https://citeproc-js.readthedocs.io/en/latest/csl-json/markup.html>

use log::debug;
use serde_json::Value;

use super::{Format, Translator, non_blank};
use crate::{
    error::{Error, Result},
    item::{Classification, Contributor, Field, PartialDate, Role, number_by_role},
};

pub struct CslJson {
    source: String,
    json: Value,
    classification: Classification,
}

impl CslJson {
    pub fn parse(body: &str) -> Result<Self> {
        let json: Value =
            serde_json::from_str(body).map_err(|e| Error::malformed(Format::CslJson, e))?;
        if !json.is_object() {
            return Err(Error::malformed(Format::CslJson, "top level is not an object"));
        }
        let classification = classify(&json);
        debug!(
            "CSL-JSON type {:?} classified as {:?}",
            json.get("type"),
            classification.kind()
        );
        Ok(CslJson {
            source: body.to_string(),
            json,
            classification,
        })
    }

    fn scalar(&self, key: &str) -> Option<String> {
        scalar(self.json.get(key))
    }

    /// Every ISSN listed. CSL-JSON does not say which is print and which is electronic.
    pub fn issns(&self) -> Vec<String> {
        self.identifiers("ISSN")
    }

    fn identifiers(&self, key: &str) -> Vec<String> {
        self.json
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().and_then(identifier))
                    .collect()
            })
            .unwrap_or_default()
    }

    // First element only; no print/electronic distinction is possible here.
    fn first_identifier(&self, key: &str) -> Option<String> {
        let first = self.json.get(key)?.as_array()?.first()?.as_str()?;
        identifier(first)
    }

    fn people(&self, key: &str, role: Role) -> Vec<Contributor> {
        let Some(entries) = self.json.get(key).and_then(Value::as_array) else {
            return Vec::new();
        };
        number_by_role(entries.iter().map(|person| {
            (
                scalar(person.get("given")),
                scalar(person.get("family")).or_else(|| scalar(person.get("literal"))),
                role.clone(),
            )
        }))
    }

    fn fulltext_url(&self) -> Option<String> {
        self.json
            .get("link")?
            .as_array()?
            .iter()
            .find(|link| {
                link.get("intended-application").and_then(Value::as_str)
                    == Some("similarity-checking")
            })
            .and_then(|link| scalar(link.get("URL")))
    }

    fn conference_title(&self) -> Option<String> {
        match self.json.get("event")? {
            event @ Value::Object(_) => scalar(event.get("name")),
            other => scalar(Some(other)),
        }
    }
}

fn classify(json: &Value) -> Classification {
    let ty = json
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    let has_container = scalar(json.get("container-title")).is_some();
    let chapter = ty.contains("chapter");
    // "book-chapter" would otherwise also count as a book or book series.
    let bookish = ty.contains("book") && !chapter;
    Classification {
        journal: ty == "journal",
        journal_article: ty.contains("journal") && ty.contains("article"),
        book: bookish && !has_container,
        book_series: bookish && has_container,
        book_chapter: chapter,
        conference_proceeding: ty.contains("proceedings") || ty.contains("conference"),
    }
}

/// Coerce a bare value or the first element of an array to trimmed text.
fn scalar(value: Option<&Value>) -> Option<String> {
    let value = match value? {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match value {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `http://id.crossref.org/isbn/9780387728032` style values carry the identifier in the last
/// path segment.
fn identifier(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with("http") {
        raw.trim_end_matches('/').rsplit('/').next().and_then(non_blank)
    } else {
        non_blank(raw)
    }
}

fn number(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str()?.trim().parse().ok())
}

/// Absent stays absent; a present but non-numeric part is an error (outer `None`).
fn optional_number(value: Option<&Value>) -> Option<Option<i64>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(v) => number(v).map(Some),
    }
}

impl Translator for CslJson {
    fn format(&self) -> Format {
        Format::CslJson
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn classification(&self) -> Classification {
        self.classification
    }

    fn text(&self, field: Field) -> Option<String> {
        let c = &self.classification;
        match field {
            Field::Doi => self.scalar("DOI"),
            Field::Url => self.scalar("URL"),
            Field::FulltextUrl => self.fulltext_url(),
            Field::JournalTitle if c.journal_article => self.scalar("container-title"),
            Field::JournalTitle if c.journal => self.scalar("title"),
            Field::JournalIsoabbrevTitle if c.journal_article => self
                .scalar("container-title-short")
                .or_else(|| self.scalar("short-container-title")),
            Field::JournalIsoabbrevTitle if c.journal => self.scalar("short-title"),
            Field::BookTitle if c.book || c.book_series => self.scalar("title"),
            Field::BookTitle if c.book_chapter || c.conference_proceeding => {
                self.scalar("container-title")
            }
            Field::BookSeriesTitle if c.book_series || c.conference_proceeding => {
                self.scalar("container-title")
            }
            Field::ConferenceTitle => self.conference_title(),
            Field::ArticleTitle
                if c.journal_article || c.book_chapter || c.conference_proceeding =>
            {
                self.scalar("title")
            }
            Field::ChapterTitle if c.book_chapter => self.scalar("title"),
            Field::ChapterNumber if c.book_chapter => self.scalar("chapter-number"),
            Field::Issn => self.first_identifier("ISSN"),
            Field::Isbn => self.first_identifier("ISBN"),
            Field::PublisherName => self.scalar("publisher"),
            Field::PublisherPlace => self.scalar("publisher-location"),
            Field::Volume => self.scalar("volume"),
            Field::Issue => self.scalar("issue"),
            Field::Pagination => self.scalar("page"),
            _ => None,
        }
    }

    fn date_parts(&self) -> Option<PartialDate> {
        let parts = self.json.pointer("/issued/date-parts/0")?.as_array()?;
        let year = number(parts.first()?)?;
        PartialDate::from_numbers(
            year,
            optional_number(parts.get(1))?,
            optional_number(parts.get(2))?,
        )
    }

    /// Authors first, then editors; each list numbered on its own.
    fn contributors(&self) -> Vec<Contributor> {
        let mut all = self.authors();
        all.extend(self.editors());
        all
    }

    fn authors(&self) -> Vec<Contributor> {
        self.people("author", Role::Author)
    }

    fn editors(&self) -> Vec<Contributor> {
        self.people("editor", Role::Editor)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use chrono::NaiveDate;

    use super::*;
    use crate::item::{DocumentKind, MetadataRecord};

    const JOURNAL_ARTICLE: &str = r#"{
        "type": "article-journal",
        "title": "Fear of reinjury, negative affect, and catastrophizing predicting return to sport",
        "container-title": "Rehabilitation Psychology",
        "container-title-short": "Rehab. Psych.",
        "ISSN": ["1939-1544", "0090-5550"],
        "DOI": "10.1037/0090-5550.52.1.74",
        "URL": "http://dx.doi.org/10.1037/0090-5550.52.1.74",
        "publisher": "American Psychological Association (APA)",
        "volume": "52",
        "issue": 1,
        "page": "74-81",
        "issued": { "date-parts": [[2007, 2]] },
        "author": [
            { "given": "Beth ", "family": "Tripp" },
            { "given": "Paul", "family": "Cook" }
        ],
        "editor": [ { "given": "Ed", "family": "Itor" } ],
        "link": [
            { "URL": "http://example.com/xml", "intended-application": "text-mining" },
            { "URL": "http://example.com/check.pdf", "intended-application": "similarity-checking" }
        ]
    }"#;

    const JOURNAL_ARTICLE_ARRAY_CONTAINER: &str = r#"{
        "type": "journal-article",
        "title": ["Critical liberal education"],
        "container-title": ["  Teaching Education  "],
        "ISSN": ["1047-6210"],
        "DOI": "10.1080/10476210903420072"
    }"#;

    const JOURNAL: &str = r#"{
        "type": "journal",
        "title": "Teaching Education",
        "short-title": ["Teaching Ed."],
        "ISSN": ["1047-6210"]
    }"#;

    const BOOK: &str = r#"{
        "type": "book",
        "title": "The Triple Helix, Open Innovation, and the DOI Research Agenda",
        "ISBN": ["http://id.crossref.org/isbn/978-0-387-72803-2"],
        "DOI": "10.1007/978-0-387-72804-9_32",
        "publisher": "Springer Science + Business Media",
        "issued": { "date-parts": [[2007]] }
    }"#;

    const BOOK_SERIES: &str = r#"{
        "type": "book",
        "title": "Organizational Dynamics of Technology-Based Innovation",
        "container-title": ["IFIP International Federation for Information Processing"],
        "ISBN": ["978-0-387-72803-2", "978-0-387-72804-9"],
        "publisher": "Springer",
        "publisher-location": "Boston, MA",
        "editor": [
            { "given": "Tom", "family": "McMaster" },
            { "given": "David", "family": "Wastell" }
        ]
    }"#;

    const CHAPTER: &str = r#"{
        "type": "book-chapter",
        "title": "Rethinking Innovation",
        "container-title": "Organizational Dynamics of Technology-Based Innovation",
        "chapter-number": "3",
        "page": "33-48",
        "author": [ { "family": "Consortium", "literal": "ignored" }, { "literal": "The Working Group" } ]
    }"#;

    const PROCEEDINGS: &str = r#"{
        "type": "paper-conference",
        "title": "Fast Things",
        "container-title": "Proceedings of the Workshop on Fast Things",
        "event": { "name": "FT 2012" },
        "issued": { "date-parts": [["2012", "6", "15"]] }
    }"#;

    fn record(doc: &str) -> MetadataRecord {
        MetadataRecord::from_csl_json(doc).unwrap()
    }

    fn assert_families_exclusive(rec: &MetadataRecord) {
        assert!(!(rec.is_journal() && rec.is_journal_article()));
        let books = [rec.is_book(), rec.is_book_series(), rec.is_book_chapter()];
        assert!(books.iter().filter(|b| **b).count() <= 1);
    }

    #[test]
    fn journal_article_fields() {
        let rec = record(JOURNAL_ARTICLE);
        assert!(rec.is_journal_article());
        assert!(!rec.is_journal());
        assert_eq!(rec.kind(), DocumentKind::JournalArticle);
        assert_eq!(rec.journal_title().as_deref(), Some("Rehabilitation Psychology"));
        assert_eq!(rec.journal_isoabbrev_title().as_deref(), Some("Rehab. Psych."));
        assert_eq!(rec.issn().as_deref(), Some("1939-1544"));
        assert_eq!(rec.eissn(), None);
        assert_eq!(rec.doi().as_deref(), Some("10.1037/0090-5550.52.1.74"));
        assert_eq!(rec.book_title(), None);
        assert_eq!(rec.book_series_title(), None);
        assert_eq!(rec.isbn(), None);
        assert!(rec.article_title().unwrap().starts_with("Fear of reinjury"));
        assert_eq!(rec.volume().as_deref(), Some("52"));
        assert_eq!(rec.issue().as_deref(), Some("1"));
        assert_eq!(rec.pagination().as_deref(), Some("74-81"));
        assert_eq!(rec.publication_date(), NaiveDate::from_ymd_opt(2007, 2, 1));
        assert_eq!(
            rec.fulltext_url().as_deref(),
            Some("http://example.com/check.pdf")
        );
        assert_eq!(
            rec.publisher().as_deref(),
            Some("American Psychological Association (APA)")
        );
        assert_families_exclusive(&rec);
    }

    #[test]
    fn contributors_number_within_each_list() {
        let rec = record(JOURNAL_ARTICLE);
        let people = rec.contributors();
        assert_eq!(people.len(), 3);
        assert_eq!(people[0].given_name.as_deref(), Some("Beth"));
        assert_eq!(people[0].surname.as_deref(), Some("Tripp"));
        assert_eq!((people[1].role.clone(), people[1].sequence), (Role::Author, 2));
        assert_eq!((people[2].role.clone(), people[2].sequence), (Role::Editor, 1));
        assert_eq!(rec.authors().len(), 2);
        assert_eq!(rec.editors().len(), 1);
    }

    /// Delegates to a [`CslJson`] and counts which contributor lists get built.
    struct Counting {
        inner: CslJson,
        authors: Arc<AtomicUsize>,
        editors: Arc<AtomicUsize>,
        combined: Arc<AtomicUsize>,
    }

    impl Translator for Counting {
        fn format(&self) -> Format {
            self.inner.format()
        }

        fn source(&self) -> &str {
            self.inner.source()
        }

        fn classification(&self) -> Classification {
            self.inner.classification()
        }

        fn text(&self, field: Field) -> Option<String> {
            self.inner.text(field)
        }

        fn date_parts(&self) -> Option<PartialDate> {
            self.inner.date_parts()
        }

        fn contributors(&self) -> Vec<Contributor> {
            self.combined.fetch_add(1, Ordering::SeqCst);
            self.inner.contributors()
        }

        fn authors(&self) -> Vec<Contributor> {
            self.authors.fetch_add(1, Ordering::SeqCst);
            self.inner.authors()
        }

        fn editors(&self) -> Vec<Contributor> {
            self.editors.fetch_add(1, Ordering::SeqCst);
            self.inner.editors()
        }
    }

    #[test]
    fn authors_are_built_without_editors() {
        let (authors, editors, combined) = (
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        );
        let rec = MetadataRecord::new(Box::new(Counting {
            inner: CslJson::parse(JOURNAL_ARTICLE).unwrap(),
            authors: Arc::clone(&authors),
            editors: Arc::clone(&editors),
            combined: Arc::clone(&combined),
        }));

        assert_eq!(rec.authors().len(), 2);
        assert_eq!(rec.authors().len(), 2);
        assert_eq!(authors.load(Ordering::SeqCst), 1);
        assert_eq!(editors.load(Ordering::SeqCst), 0);
        assert_eq!(combined.load(Ordering::SeqCst), 0);

        assert_eq!(rec.editors().len(), 1);
        assert_eq!(editors.load(Ordering::SeqCst), 1);
        assert_eq!(combined.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn author_list_ignores_a_broken_editor_list() {
        let parser = CslJson::parse(
            r#"{"type": "book", "author": [{"family": "Solo"}], "editor": "not a list"}"#,
        )
        .unwrap();
        assert_eq!(parser.authors().len(), 1);
        assert!(parser.editors().is_empty());
        assert_eq!(parser.contributors().len(), 1);
    }

    #[test]
    fn container_title_array_is_coerced() {
        let rec = record(JOURNAL_ARTICLE_ARRAY_CONTAINER);
        assert!(rec.is_journal_article());
        assert_eq!(rec.journal_title().as_deref(), Some("Teaching Education"));
        assert_eq!(rec.article_title().as_deref(), Some("Critical liberal education"));
        assert_eq!(rec.issn().as_deref(), Some("1047-6210"));
        assert_eq!(rec.publication_date(), None);
        assert_eq!(rec.publication_date_parts(), None);
    }

    #[test]
    fn journal_record() {
        let rec = record(JOURNAL);
        assert!(rec.is_journal());
        assert!(!rec.is_journal_article());
        assert!(!rec.is_book() && !rec.is_book_series());
        assert_eq!(rec.journal_title().as_deref(), Some("Teaching Education"));
        assert_eq!(rec.journal_isoabbrev_title().as_deref(), Some("Teaching Ed."));
        assert_eq!(rec.article_title(), None);
    }

    #[test]
    fn journal_like_types_that_are_neither() {
        let rec = record(r#"{"type": "journal-issue", "title": "Issue 4"}"#);
        assert!(!rec.is_journal());
        assert!(!rec.is_journal_article());
        assert_eq!(rec.kind(), DocumentKind::Unknown);
        assert_eq!(rec.journal_title(), None);
    }

    #[test]
    fn book_fields() {
        let rec = record(BOOK);
        assert!(rec.is_book());
        assert!(!rec.is_book_series() && !rec.is_journal());
        assert_eq!(
            rec.book_title().as_deref(),
            Some("The Triple Helix, Open Innovation, and the DOI Research Agenda")
        );
        assert_eq!(rec.isbn().as_deref(), Some("978-0-387-72803-2"));
        assert_eq!(rec.eisbn(), None);
        assert_eq!(rec.journal_isoabbrev_title(), None);
        assert_eq!(rec.issn(), None);
        assert_eq!(rec.doi().as_deref(), Some("10.1007/978-0-387-72804-9_32"));
        assert_eq!(
            rec.publisher().as_deref(),
            Some("Springer Science + Business Media")
        );
        assert_eq!(rec.publication_date(), NaiveDate::from_ymd_opt(2007, 1, 1));
        assert_eq!(
            rec.publication_date_parts(),
            Some(PartialDate {
                year: 2007,
                month: None,
                day: None
            })
        );
        assert_families_exclusive(&rec);
    }

    #[test]
    fn book_series_fields() {
        let rec = record(BOOK_SERIES);
        assert!(rec.is_book_series());
        assert!(!rec.is_book());
        assert_eq!(
            rec.book_title().as_deref(),
            Some("Organizational Dynamics of Technology-Based Innovation")
        );
        assert_eq!(
            rec.book_series_title().as_deref(),
            Some("IFIP International Federation for Information Processing")
        );
        // Only the first listed ISBN is reported.
        assert_eq!(rec.isbn().as_deref(), Some("978-0-387-72803-2"));
        assert_eq!(rec.publisher().as_deref(), Some("Springer; Boston, MA"));
        let editors = rec.editors();
        assert_eq!(editors[1].surname.as_deref(), Some("Wastell"));
        assert_eq!(editors[1].sequence, 2);
        assert!(rec.authors().is_empty());
        assert_families_exclusive(&rec);
    }

    #[test]
    fn chapter_fields() {
        let rec = record(CHAPTER);
        assert!(rec.is_book_chapter());
        assert!(!rec.is_book() && !rec.is_book_series());
        assert_eq!(rec.kind(), DocumentKind::BookChapter);
        assert_eq!(
            rec.book_title().as_deref(),
            Some("Organizational Dynamics of Technology-Based Innovation")
        );
        assert_eq!(rec.chapter_title().as_deref(), Some("Rethinking Innovation"));
        assert_eq!(rec.article_title().as_deref(), Some("Rethinking Innovation"));
        assert_eq!(rec.chapter_number().as_deref(), Some("3"));
        assert_eq!(rec.book_series_title(), None);
        let authors = rec.authors();
        assert_eq!(authors[0].surname.as_deref(), Some("Consortium"));
        assert_eq!(authors[1].surname.as_deref(), Some("The Working Group"));
        assert_families_exclusive(&rec);
    }

    #[test]
    fn proceedings_fields() {
        let rec = record(PROCEEDINGS);
        assert!(rec.is_conference_proceeding());
        assert_eq!(rec.kind(), DocumentKind::ConferenceProceeding);
        assert_eq!(rec.article_title().as_deref(), Some("Fast Things"));
        assert_eq!(
            rec.book_title().as_deref(),
            Some("Proceedings of the Workshop on Fast Things")
        );
        assert_eq!(rec.book_series_title(), rec.book_title());
        assert_eq!(rec.conference_title().as_deref(), Some("FT 2012"));
        assert_eq!(rec.publication_date(), NaiveDate::from_ymd_opt(2012, 6, 15));
    }

    #[test]
    fn bad_dates_are_absent_not_errors() {
        for doc in [
            r#"{"issued": {"date-parts": [[null]]}}"#,
            r#"{"issued": {"date-parts": [[2001, "spring"]]}}"#,
            r#"{"issued": {"date-parts": []}}"#,
            r#"{"issued": {}}"#,
        ] {
            let rec = record(doc);
            assert_eq!(rec.publication_date_parts(), None, "{doc}");
            assert_eq!(rec.publication_date(), None, "{doc}");
        }
    }

    #[test]
    fn issns_lists_all_values() {
        let parser = CslJson::parse(JOURNAL_ARTICLE).unwrap();
        assert_eq!(parser.issns(), vec!["1939-1544", "0090-5550"]);
    }

    #[test]
    fn missing_fields_do_not_break_others() {
        let rec = record(r#"{"type": "article-journal", "container-title": 7, "DOI": "10.1/x"}"#);
        assert_eq!(rec.journal_title().as_deref(), Some("7"));
        assert_eq!(rec.doi().as_deref(), Some("10.1/x"));
        assert_eq!(rec.issn(), None);
        assert!(rec.contributors().is_empty());
        let map = rec.to_map();
        assert_eq!(map["doi"], "10.1/x");
        assert!(map["publisher"].is_null());
    }

    #[test]
    fn invalid_json_is_malformed() {
        for doc in ["this is not json", "[1, 2]", "{\"type\": "] {
            assert!(
                matches!(
                    CslJson::parse(doc),
                    Err(Error::MalformedDocument {
                        format: Format::CslJson,
                        ..
                    })
                ),
                "{doc}"
            );
        }
    }

    #[test]
    fn keeps_source_text() {
        let rec = record(BOOK);
        assert_eq!(rec.source(), BOOK);
        assert_eq!(rec.format(), Format::CslJson);
    }
}
