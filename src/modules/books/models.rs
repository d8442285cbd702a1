use garde::Validate;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

pub const TITLE_MAX_CHARS: usize = 255;
pub const AUTHOR_MAX_CHARS: usize = 255;
pub const GENRE_MAX_CHARS: usize = 100;
pub const EARLIEST_YEAR: i32 = 1;

pub const DEFAULT_SKIP: i64 = 0;
pub const DEFAULT_LIMIT: i64 = 100;

/// A stored catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub genre: String,
    pub description: Option<String>,
}

impl Book {
    /// Merge the fields present in `changes`; absent fields keep their value.
    ///
    /// An explicit `null` clears `description`. For required fields it is
    /// rejected during validation and ignored here.
    pub fn apply(&mut self, changes: UpdateBook) {
        if let Some(Some(title)) = changes.title {
            self.title = title;
        }
        if let Some(Some(author)) = changes.author {
            self.author = author;
        }
        if let Some(Some(year)) = changes.year {
            self.year = year;
        }
        if let Some(Some(genre)) = changes.genre {
            self.genre = genre;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
    }
}

/// JSON representation returned by every successful read or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookView {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub genre: String,
    pub description: Option<String>,
}

impl From<Book> for BookView {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            year: book.year,
            genre: book.genre,
            description: book.description,
        }
    }
}

/// Validation context: the upper bound for `year` moves with the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookRules {
    pub current_year: i32,
}

impl BookRules {
    pub fn for_year(current_year: i32) -> Self {
        Self { current_year }
    }

    pub fn now() -> Self {
        Self::for_year(OffsetDateTime::now_utc().year())
    }
}

impl Default for BookRules {
    fn default() -> Self {
        Self::now()
    }
}

/// Request body for `POST /books`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(context(BookRules))]
pub struct CreateBook {
    #[garde(length(chars, min = 1, max = 255))]
    pub title: String,
    #[garde(length(chars, min = 1, max = 255))]
    pub author: String,
    #[garde(custom(year_in_range))]
    pub year: i32,
    #[garde(length(chars, min = 1, max = 100))]
    pub genre: String,
    #[garde(skip)]
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for `PUT /books/{id}`.
///
/// Outer `None` means the field was absent, `Some(None)` an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[garde(context(BookRules))]
pub struct UpdateBook {
    #[serde(default, deserialize_with = "present")]
    #[garde(custom(title_change))]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[garde(custom(author_change))]
    pub author: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[garde(custom(year_change))]
    pub year: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    #[garde(custom(genre_change))]
    pub genre: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[garde(skip)]
    pub description: Option<Option<String>>,
}

impl UpdateBook {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.year.is_none()
            && self.genre.is_none()
            && self.description.is_none()
    }
}

/// Pagination for `GET /books`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListParams {
    #[serde(default = "ListParams::default_skip")]
    #[garde(range(min = 0))]
    pub skip: i64,
    #[serde(default = "ListParams::default_limit")]
    #[garde(range(min = 1))]
    pub limit: i64,
}

impl ListParams {
    fn default_skip() -> i64 {
        DEFAULT_SKIP
    }

    fn default_limit() -> i64 {
        DEFAULT_LIMIT
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            skip: DEFAULT_SKIP,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Only runs when the key is in the payload, so a present `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn year_in_range(value: &i32, rules: &BookRules) -> garde::Result {
    if *value < EARLIEST_YEAR {
        return Err(garde::Error::new(format!("lower than {}", EARLIEST_YEAR)));
    }
    if *value > rules.current_year {
        return Err(garde::Error::new(format!(
            "greater than {}",
            rules.current_year
        )));
    }
    Ok(())
}

fn text_in_range(value: &str, max: usize) -> garde::Result {
    let chars = value.chars().count();
    if chars < 1 {
        return Err(garde::Error::new("length is lower than 1"));
    }
    if chars > max {
        return Err(garde::Error::new(format!("length is greater than {}", max)));
    }
    Ok(())
}

fn required_change<T>(
    value: &Option<Option<T>>,
    check: impl FnOnce(&T) -> garde::Result,
) -> garde::Result {
    match value {
        None => Ok(()),
        Some(None) => Err(garde::Error::new("must not be null")),
        Some(Some(inner)) => check(inner),
    }
}

fn title_change(value: &Option<Option<String>>, _rules: &BookRules) -> garde::Result {
    required_change(value, |title| text_in_range(title, TITLE_MAX_CHARS))
}

fn author_change(value: &Option<Option<String>>, _rules: &BookRules) -> garde::Result {
    required_change(value, |author| text_in_range(author, AUTHOR_MAX_CHARS))
}

fn genre_change(value: &Option<Option<String>>, _rules: &BookRules) -> garde::Result {
    required_change(value, |genre| text_in_range(genre, GENRE_MAX_CHARS))
}

fn year_change(value: &Option<Option<i32>>, rules: &BookRules) -> garde::Result {
    required_change(value, |year| year_in_range(year, rules))
}
