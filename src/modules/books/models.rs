use libris_db::{FieldValue, Record, RecordId};
use serde::{Deserialize, Serialize};
use time::{format_description::BorrowedFormatItem, macros::format_description, Date};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// `YYYY-M-D`; zero padding on month and day is optional.
const ISO_DATE_INPUT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month padding:none]-[day padding:none]");

/// Parse a calendar date as accepted in request bodies.
pub fn parse_iso_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), ISO_DATE_INPUT).ok()
}

pub const TITLE_MAX_LENGTH: usize = 255;
pub const AUTHOR_MAX_LENGTH: usize = 255;
pub const ISBN_MAX_LENGTH: usize = 13;
pub const COVER_MAX_LENGTH: usize = 200;
pub const LANGUAGE_MAX_LENGTH: usize = 50;
pub const PAGES_MAX: i64 = 2_147_483_647;

/// A catalogued book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// System-assigned identifier
    pub id: RecordId,
    pub title: String,
    pub author: String,
    /// Publication date, `YYYY-MM-DD`
    #[serde(default, with = "iso_date::option")]
    pub published_date: Option<Date>,
    /// Natural key, unique across the catalogue
    pub isbn: String,
    pub pages: Option<u32>,
    /// Cover image URL
    pub cover: Option<String>,
    pub language: String,
}

impl Record for Book {
    const TABLE: &'static str = "book";

    fn id(&self) -> RecordId {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("isbn", self.isbn.clone())]
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "title" => Some(self.title.as_str().into()),
            "author" => Some(self.author.as_str().into()),
            "published_date" => self.published_date.map(FieldValue::from),
            "isbn" => Some(self.isbn.as_str().into()),
            "cover" => self.cover.as_deref().map(FieldValue::from),
            "language" => Some(self.language.as_str().into()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title)
    }
}
