//! Field validation for book writes.
//!
//! Every error for every field is collected before failing, so a client gets
//! the full picture in one response. String fields are trimmed first.

use libris_db::{RecordId, Repository};
use libris_http::{AppError, FieldErrors};
use serde_json::{Map, Value};
use time::Date;
use url::Url;

use super::models::{
    parse_iso_date, Book, AUTHOR_MAX_LENGTH, COVER_MAX_LENGTH, ISBN_MAX_LENGTH,
    LANGUAGE_MAX_LENGTH, PAGES_MAX, TITLE_MAX_LENGTH,
};

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_BLANK: &str = "This field may not be blank.";
const NOT_A_STRING: &str = "Not a valid string.";
const NOT_AN_INTEGER: &str = "A valid integer is required.";
const NEGATIVE: &str = "Ensure this value is greater than or equal to 0.";
const BAD_DATE: &str = "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";
const BAD_URL: &str = "Enter a valid URL.";
const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];

/// Which write is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    FullUpdate,
    PartialUpdate,
}

impl Mode {
    fn is_partial(self) -> bool {
        self == Mode::PartialUpdate
    }
}

/// Accepted, normalized values. `None` leaves a field untouched; for
/// optional columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<Option<Date>>,
    pub isbn: Option<String>,
    pub pages: Option<Option<u32>>,
    pub cover: Option<Option<String>>,
    pub language: Option<String>,
}

impl BookChanges {
    pub fn apply_to(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(published_date) = self.published_date {
            book.published_date = published_date;
        }
        if let Some(isbn) = self.isbn {
            book.isbn = isbn;
        }
        if let Some(pages) = self.pages {
            book.pages = pages;
        }
        if let Some(cover) = self.cover {
            book.cover = cover;
        }
        if let Some(language) = self.language {
            book.language = language;
        }
    }
}

/// Validate a request body against `mode`.
///
/// `current` is the id of the book being updated; it is excluded from the
/// ISBN uniqueness check.
pub async fn validate(
    payload: &Value,
    mode: Mode,
    store: &dyn Repository<Book>,
    current: Option<RecordId>,
) -> Result<BookChanges, AppError> {
    let Some(object) = payload.as_object() else {
        return Err(AppError::field(
            "non_field_errors",
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                json_kind(payload)
            ),
        ));
    };

    let mut fields = Fields {
        object,
        mode,
        errors: FieldErrors::new(),
    };

    let changes = BookChanges {
        title: fields.required_text("title", TITLE_MAX_LENGTH),
        author: fields.required_text("author", AUTHOR_MAX_LENGTH),
        published_date: fields.optional_date("published_date"),
        isbn: fields.required_text("isbn", ISBN_MAX_LENGTH),
        pages: fields.optional_count("pages"),
        cover: fields.optional_url("cover", COVER_MAX_LENGTH),
        language: fields.required_text("language", LANGUAGE_MAX_LENGTH),
    };

    if let Some(isbn) = &changes.isbn {
        let free = store
            .is_unique("isbn", isbn, current)
            .await
            .map_err(|err| AppError::Internal(err.into()))?;
        if !free {
            fields.reject("isbn", duplicate_isbn());
        }
    }

    if !fields.errors.is_empty() {
        tracing::debug!(?mode, fields = ?fields.errors.keys().collect::<Vec<_>>(), "book rejected");
        return Err(AppError::validation(fields.errors, "Validation failed"));
    }
    Ok(changes)
}

pub(crate) fn duplicate_isbn() -> String {
    "book with this isbn already exists.".to_string()
}

struct Fields<'a> {
    object: &'a Map<String, Value>,
    mode: Mode,
    errors: FieldErrors,
}

impl<'a> Fields<'a> {
    fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Raw value of an optional column. `None` leaves the column untouched,
    /// `Some(None)` clears it.
    fn optional_raw(&self, field: &str) -> Option<Option<&'a Value>> {
        match self.object.get(field) {
            None if self.mode.is_partial() => None,
            None | Some(Value::Null) => Some(None),
            Some(value) => Some(Some(value)),
        }
    }

    fn optional_date(&mut self, field: &str) -> Option<Option<Date>> {
        let Some(value) = self.optional_raw(field)? else {
            return Some(None);
        };
        match value.as_str().and_then(parse_iso_date) {
            Some(day) => Some(Some(day)),
            None => {
                self.reject(field, BAD_DATE);
                None
            }
        }
    }

    fn optional_count(&mut self, field: &str) -> Option<Option<u32>> {
        let Some(value) = self.optional_raw(field)? else {
            return Some(None);
        };
        let Value::Number(number) = value else {
            self.reject(field, NOT_AN_INTEGER);
            return None;
        };

        match number.as_i64() {
            Some(count) if count < 0 => {
                self.reject(field, NEGATIVE);
                None
            }
            Some(count) => match u32::try_from(count) {
                Ok(count) if i64::from(count) <= PAGES_MAX => Some(Some(count)),
                _ => {
                    self.reject(field, too_large());
                    None
                }
            },
            None if number.is_u64() => {
                self.reject(field, too_large());
                None
            }
            None => {
                self.reject(field, NOT_AN_INTEGER);
                None
            }
        }
    }

    fn optional_url(&mut self, field: &str, max_length: usize) -> Option<Option<String>> {
        let Some(value) = self.optional_raw(field)? else {
            return Some(None);
        };
        let Value::String(raw) = value else {
            self.reject(field, NOT_A_STRING);
            return None;
        };

        let url = raw.trim();
        if url.is_empty() {
            return Some(None);
        }

        let mut accepted = true;
        if url.chars().count() > max_length {
            self.reject(field, too_long(max_length));
            accepted = false;
        }
        if !is_valid_url(url) {
            self.reject(field, BAD_URL);
            accepted = false;
        }
        accepted.then(|| Some(url.to_string()))
    }

    fn required_text(&mut self, field: &str, max_length: usize) -> Option<String> {
        match self.object.get(field) {
            None => {
                if !self.mode.is_partial() {
                    self.reject(field, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                self.reject(field, NOT_NULL);
                None
            }
            Some(Value::String(raw)) => {
                let value = raw.trim();
                if value.is_empty() {
                    self.reject(field, NOT_BLANK);
                    None
                } else if value.chars().count() > max_length {
                    self.reject(field, too_long(max_length));
                    None
                } else {
                    Some(value.to_string())
                }
            }
            Some(_) => {
                self.reject(field, NOT_A_STRING);
                None
            }
        }
    }
}

fn is_valid_url(candidate: &str) -> bool {
    Url::parse(candidate).is_ok_and(|url| {
        URL_SCHEMES.contains(&url.scheme()) && url.host_str().is_some_and(|host| !host.is_empty())
    })
}

fn too_large() -> String {
    format!("Ensure this value is less than or equal to {PAGES_MAX}.")
}

fn too_long(max_length: usize) -> String {
    format!("Ensure this field has no more than {max_length} characters.")
}

/// Name of the body's type in the "Expected a dictionary" message; numbers
/// are told apart as `int` and `float`.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
