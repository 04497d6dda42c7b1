//! Crossref UnixRef XML (`application/vnd.crossref.unixref+xml`).
//!
//! Records live under `doi_records/doi_record/crossref`, with one of `journal`, `book` or
//! `conference` below that. Most lookups are routed to the metadata node for the record's type
//! because the same element names (`doi_data`, `contributors`, `publication_date`) show up at
//! several depths.

use log::debug;

use super::{Format, Translator, non_blank};
use crate::{
    error::{Error, Result},
    item::{Classification, Contributor, Field, PartialDate, Role, number_by_role},
    xml::{self, Element},
};

const CHAPTER: &str = "book/content_item[@component_type='chapter']";
const FULLTEXT: &str = "collection[@property='crawler-based']/item[@crawler='iParadigms']/resource";

pub struct Unixref {
    source: String,
    root: Element,
    classification: Classification,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Media {
    Print,
    Electronic,
}

impl Media {
    fn of(e: &Element) -> Option<Media> {
        match e.attr("media_type").map(str::trim) {
            None | Some("print") => Some(Media::Print),
            Some("electronic") => Some(Media::Electronic),
            Some(_) => None,
        }
    }
}

impl Unixref {
    pub fn parse(body: &str) -> Result<Self> {
        let root = xml::parse(body).map_err(|e| Error::malformed(Format::UnixrefXml, e))?;
        let classification = classify(crossref(&root));
        debug!("UnixRef record classified as {:?}", classification.kind());
        Ok(Unixref {
            source: body.to_string(),
            root,
            classification,
        })
    }

    fn crossref(&self) -> &Element {
        crossref(&self.root)
    }

    fn find_text(&self, path: &str) -> Option<String> {
        self.crossref().find_text(path)
    }

    /// The metadata node describing the record itself.
    fn item(&self) -> Option<&Element> {
        let c = &self.classification;
        let path = if c.journal_article {
            "journal/journal_article"
        } else if c.journal {
            "journal/journal_metadata"
        } else if c.book_chapter {
            CHAPTER
        } else if c.book {
            "book/book_metadata"
        } else if c.book_series {
            "book/book_series_metadata"
        } else if c.conference_proceeding {
            "conference/conference_paper"
        } else {
            return None;
        };
        self.crossref().find(path)
    }

    /// `doi_data/<leaf>` under the record's own node, or anywhere if that has none.
    fn doi_data(&self, leaf: &str) -> Option<String> {
        self.item()
            .and_then(|item| item.find_text(&format!("doi_data/{leaf}")))
            .or_else(|| self.find_text(&format!("//doi_data/{leaf}")))
    }

    fn identifier(&self, name: &str, media: Media) -> Option<String> {
        self.crossref()
            .select(&format!("//{name}"))
            .into_iter()
            .filter(|e| Media::of(e) == Some(media))
            .find_map(|e| non_blank(&e.text()))
    }

    fn book_title(&self) -> Option<String> {
        let c = &self.classification;
        if c.book_series {
            self.find_text("book/book_series_metadata/titles/title")
        } else if c.conference_proceeding {
            self.crossref()
                .elements()
                .filter(|e| e.name == "conference")
                .flat_map(|e| e.elements())
                .filter(|e| e.name.starts_with("proceedings"))
                .find_map(|e| e.find_text("proceedings_title"))
        } else {
            self.find_text("book/book_metadata/titles/title")
                .or_else(|| self.find_text("book/book_series_metadata/titles/title"))
        }
    }

    fn article_title(&self) -> Option<String> {
        if self.classification.conference_proceeding {
            self.find_text("conference/conference_paper/titles/title")
        } else {
            self.find_text("journal/journal_article/titles/title")
        }
    }

    fn volume(&self) -> Option<String> {
        if self.crossref().exists("journal") {
            self.find_text("journal/journal_issue/journal_volume/volume")
        } else {
            self.find_text("book/*/volume")
        }
    }

    fn pagination(&self) -> Option<String> {
        let pages = self.item()?.find("pages")?;
        let first = pages.find_text("first_page")?;
        let last = pages.find_text("last_page")?;
        Some(format!("{first}-{last}"))
    }

    fn people(&self) -> Vec<&Element> {
        let c = &self.classification;
        let crossref = self.crossref();
        if c.book_chapter {
            // Editors of the containing book, then the chapter's own authors.
            let mut people = crossref.select("book/book_metadata/contributors/person_name");
            if people.is_empty() {
                people = crossref.select("book/book_series_metadata/contributors/person_name");
            }
            people.extend(crossref.select(&format!("{CHAPTER}/contributors/person_name")));
            return people;
        }
        let path = if c.journal_article {
            "journal/journal_article/contributors/person_name"
        } else if c.book {
            "book/book_metadata/contributors/person_name"
        } else if c.book_series {
            "book/book_series_metadata/contributors/person_name"
        } else if c.conference_proceeding {
            "conference/conference_paper/contributors/person_name"
        } else {
            "//contributors/person_name"
        };
        crossref.select(path)
    }

    fn publication_date(&self) -> Option<&Element> {
        self.item()
            .and_then(|item| item.find("publication_date"))
            .or_else(|| self.crossref().find("//publication_date"))
    }
}

/// The `crossref` element, wherever the document puts it; the document root otherwise.
fn crossref(root: &Element) -> &Element {
    if root.name == "crossref" {
        return root;
    }
    root.find("doi_record/crossref")
        .or_else(|| root.find("//crossref"))
        .unwrap_or(root)
}

fn classify(crossref: &Element) -> Classification {
    let journal_article = crossref.exists("journal/journal_article");
    let book_chapter = crossref.exists(CHAPTER);
    Classification {
        journal: crossref.exists("journal") && !journal_article,
        journal_article,
        // A chapter's container is described by book or series metadata too.
        book: crossref.exists("book/book_metadata") && !book_chapter,
        book_series: crossref.exists("book/book_series_metadata") && !book_chapter,
        book_chapter,
        conference_proceeding: crossref
            .select("conference/*")
            .iter()
            .any(|e| e.name.starts_with("proceedings")),
    }
}

fn number(e: &Element) -> Option<i64> {
    e.text().trim().parse().ok()
}

impl Translator for Unixref {
    fn format(&self) -> Format {
        Format::UnixrefXml
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn classification(&self) -> Classification {
        self.classification
    }

    fn text(&self, field: Field) -> Option<String> {
        match field {
            Field::Doi => self.doi_data("doi"),
            Field::Url => self.doi_data("resource"),
            Field::FulltextUrl => self
                .item()
                .and_then(|item| item.find_text(&format!("doi_data/{FULLTEXT}")))
                .or_else(|| self.find_text(&format!("//{FULLTEXT}"))),
            Field::JournalTitle => self.find_text("journal/journal_metadata/full_title"),
            Field::JournalIsoabbrevTitle => self.find_text("journal/journal_metadata/abbrev_title"),
            Field::BookTitle => self.book_title(),
            Field::BookSeriesTitle => self.find_text("book//series_metadata/titles/title"),
            Field::ConferenceTitle => self.find_text("conference//event_metadata/conference_name"),
            Field::ConferenceSeriesTitle => {
                self.find_text("conference//series_metadata/titles/title")
            }
            Field::ArticleTitle => self.article_title(),
            Field::ChapterTitle => self.find_text(&format!("{CHAPTER}/titles/title")),
            Field::ChapterNumber => self.find_text(&format!("{CHAPTER}/component_number")),
            Field::Issn => self.identifier("issn", Media::Print),
            Field::Eissn => self.identifier("issn", Media::Electronic),
            Field::Isbn => self.identifier("isbn", Media::Print),
            Field::Eisbn => self.identifier("isbn", Media::Electronic),
            Field::PublisherName => self.find_text("//publisher/publisher_name"),
            Field::PublisherPlace => self.find_text("//publisher/publisher_place"),
            Field::Volume => self.volume(),
            Field::Issue => self.find_text("journal/journal_issue/issue"),
            Field::Pagination => self.pagination(),
        }
    }

    fn date_parts(&self) -> Option<PartialDate> {
        let date = self.publication_date()?;
        let part = |name: &str| match date.find(name) {
            None => Some(None),
            Some(e) => number(e).map(Some),
        };
        let year = number(date.find("year")?)?;
        PartialDate::from_numbers(year, part("month")?, part("day")?)
    }

    fn contributors(&self) -> Vec<Contributor> {
        number_by_role(self.people().into_iter().map(|person| {
            (
                person.find_text("given_name"),
                person.find_text("surname"),
                Role::from_label(person.attr("contributor_role")),
            )
        }))
    }
}
