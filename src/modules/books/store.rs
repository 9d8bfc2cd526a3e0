//! PostgreSQL-backed book repository.

use async_trait::async_trait;
use libris_db::{
    postgres::{push_conditions, write_error},
    Condition, Record, RecordId, Repository, Slice, StoreError, StoreResult, Window,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::Date;

use super::models::Book;

const COLUMNS: &str = "id, title, author, published_date, isbn, pages, cover, language";

/// Creates the `book` table when it does not exist yet.
const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS book (
        id BIGSERIAL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        author VARCHAR(255) NOT NULL,
        published_date DATE NULL,
        isbn VARCHAR(13) NOT NULL,
        pages INTEGER NULL CHECK (pages >= 0),
        cover VARCHAR(200) NULL,
        language VARCHAR(50) NOT NULL,
        CONSTRAINT book_isbn_key UNIQUE (isbn)
    )
"#;

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: i64,
    title: String,
    author: String,
    published_date: Option<Date>,
    isbn: String,
    pages: Option<i32>,
    cover: Option<String>,
    language: String,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: row.id,
            title: row.title,
            author: row.author,
            published_date: row.published_date,
            isbn: row.isbn,
            pages: row.pages.and_then(|pages| u32::try_from(pages).ok()),
            cover: row.cover,
            language: row.language,
        }
    }
}

/// `pages` is validated to fit a PostgreSQL `INTEGER` before it gets here.
fn pages_column(book: &Book) -> Option<i32> {
    book.pages.and_then(|pages| i32::try_from(pages).ok())
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct PgBookStore {
    pool: PgPool,
}

impl PgBookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `book` table if it is missing.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        tracing::debug!(table = Book::TABLE, "schema ready");
        Ok(())
    }
}

#[async_trait]
impl Repository<Book> for PgBookStore {
    async fn insert(&self, book: Book) -> StoreResult<Book> {
        let sql = format!(
            "INSERT INTO book (title, author, published_date, isbn, pages, cover, language) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
        );
        let row: BookRow = sqlx::query_as(&sql)
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.published_date)
            .bind(&book.isbn)
            .bind(pages_column(&book))
            .bind(&book.cover)
            .bind(&book.language)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| write_error(err, &book))?;

        tracing::debug!(table = Book::TABLE, id = row.id, "record inserted");
        Ok(row.into())
    }

    async fn get(&self, id: RecordId) -> StoreResult<Option<Book>> {
        let sql = format!("SELECT {COLUMNS} FROM book WHERE id = $1");
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Book::from))
    }

    async fn replace(&self, book: Book) -> StoreResult<Book> {
        let sql = format!(
            "UPDATE book SET title = $1, author = $2, published_date = $3, isbn = $4, \
             pages = $5, cover = $6, language = $7 WHERE id = $8 RETURNING {COLUMNS}"
        );
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.published_date)
            .bind(&book.isbn)
            .bind(pages_column(&book))
            .bind(&book.cover)
            .bind(&book.language)
            .bind(book.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| write_error(err, &book))?;

        let row = row.ok_or(StoreError::NotFound {
            table: Book::TABLE,
            id: book.id,
        })?;
        tracing::debug!(table = Book::TABLE, id = row.id, "record replaced");
        Ok(row.into())
    }

    async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM book WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                table: Book::TABLE,
                id,
            });
        }

        tracing::debug!(table = Book::TABLE, id, "record deleted");
        Ok(())
    }

    async fn query(&self, conditions: &[Condition], window: Window) -> StoreResult<Slice<Book>> {
        // Count and page from one snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM book");
        push_conditions(&mut count, conditions);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM book"));
        push_conditions(&mut select, conditions);
        select
            .push(" ORDER BY id LIMIT ")
            .push_bind(to_sql_int(window.limit))
            .push(" OFFSET ")
            .push_bind(to_sql_int(window.offset));
        let rows: Vec<BookRow> = select.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;

        Ok(Slice {
            total: usize::try_from(total).unwrap_or_default(),
            rows: rows.into_iter().map(Book::from).collect(),
        })
    }

    async fn count(&self) -> StoreResult<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(total).unwrap_or_default())
    }

    async fn is_unique(
        &self,
        field: &'static str,
        value: &str,
        exclude: Option<RecordId>,
    ) -> StoreResult<bool> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT NOT EXISTS (SELECT 1 FROM book WHERE ");
        builder.push(field).push(" = ").push_bind(value.to_string());
        if let Some(id) = exclude {
            builder.push(" AND id <> ").push_bind(id);
        }
        builder.push(")");

        let free: bool = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(free)
    }
}
