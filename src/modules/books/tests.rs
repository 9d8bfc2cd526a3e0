use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use libris_db::{
    Condition, MemoryTable, RecordId, Repository, Slice, StoreResult, Window,
};
use libris_kernel::settings::Settings;
use serde_json::{json, Value};
use time::{macros::date, Date, Duration};
use tower::ServiceExt;

use super::models::Book;

const URL: &str = "/api/v1/books/";
const TODAY: Date = date!(2024 - 06 - 15);

struct TestApp {
    router: Router,
    store: Arc<MemoryTable<Book>>,
}

impl TestApp {
    async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    async fn first_id(&self) -> i64 {
        self.stored_books().await[0].id
    }

    async fn stored_books(&self) -> Vec<Book> {
        self.store
            .query(&[], libris_db::Window::new(0, usize::MAX))
            .await
            .unwrap()
            .rows
    }

    async fn stored(&self, id: i64) -> Book {
        self.store.get(id).await.unwrap().unwrap()
    }
}

/// Fifteen books: titles `Book 0..14`, alternating authors, one per day
/// counting back from `TODAY`.
async fn seeded_app() -> TestApp {
    let store = Arc::new(MemoryTable::<Book>::new());
    for count in 0..15_i64 {
        store
            .insert(Book {
                title: format!("Book {count}"),
                author: format!("Author {}", count % 2),
                published_date: Some(TODAY - Duration::days(count)),
                isbn: format!("9783161484{count}"),
                language: "English".to_string(),
                ..Book::default()
            })
            .await
            .unwrap();
    }

    let settings = Settings::default();
    let registry = crate::build_registry(&settings, store.clone()).unwrap();
    TestApp {
        router: libris_http::build_router(&registry, &settings),
        store,
    }
}

fn valid_data() -> Value {
    json!({
        "title": "Book",
        "author": "Author",
        "published_date": TODAY.to_string(),
        "isbn": "9783161484999",
        "language": "English"
    })
}

fn invalid_data() -> Value {
    let mut data = valid_data();
    data["isbn"] = json!("9783161484999-");
    data
}

/// Path and query of an absolute pagination link.
fn relative(link: &Value) -> String {
    let url = url::Url::parse(link.as_str().unwrap()).unwrap();
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

#[tokio::test]
async fn test_list_books() {
    let app = seeded_app().await;
    let (status, body) = app.get(URL).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 15);
    assert_eq!(body["results"].as_array().unwrap().len(), 10);
    assert_eq!(body["results"][0]["title"], "Book 0");
}

#[tokio::test]
async fn test_list_books_pagination() {
    let app = seeded_app().await;
    let (_, body) = app.get(&format!("{URL}?limit=10&offset=0")).await;
    assert_eq!(body["count"], 15);
    assert_eq!(body["results"].as_array().unwrap().len(), 10);
    assert!(body["next"].is_string());
    assert!(body["previous"].is_null());
}

#[tokio::test]
async fn test_list_books_pagination_next() {
    let app = seeded_app().await;
    let (_, first) = app.get(URL).await;
    let (status, body) = app.get(&relative(&first["next"])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 15);
    assert_eq!(body["results"].as_array().unwrap().len(), 5);
    assert_eq!(body["results"][0]["title"], "Book 10");
    assert!(body["next"].is_null());
    assert!(body["previous"].is_string());
}

#[tokio::test]
async fn test_pages_cover_every_record_once() {
    let app = seeded_app().await;
    let mut uri = format!("{URL}?limit=4");
    let mut titles = Vec::new();
    let mut pages = 0;
    loop {
        let (_, body) = app.get(&uri).await;
        pages += 1;
        assert_eq!(body["previous"].is_null(), pages == 1);
        for book in body["results"].as_array().unwrap() {
            titles.push(book["title"].as_str().unwrap().to_string());
        }
        if body["next"].is_null() {
            break;
        }
        uri = relative(&body["next"]);
    }

    assert_eq!(pages, 4);
    let expected: Vec<_> = (0..15).map(|n| format!("Book {n}")).collect();
    assert_eq!(titles, expected);
}

#[tokio::test]
async fn test_offset_past_end_is_empty_with_previous() {
    let app = seeded_app().await;
    let (status, body) = app.get(&format!("{URL}?offset=40")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 15);
    assert!(body["results"].as_array().unwrap().is_empty());
    assert!(body["next"].is_null());
    assert!(body["previous"].is_string());
}

#[tokio::test]
async fn test_limit_is_capped_at_page_size() {
    let app = seeded_app().await;
    let (_, body) = app.get(&format!("{URL}?limit=100")).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_links_use_host_header_and_keep_filters() {
    let app = seeded_app().await;
    let request = Request::builder()
        .uri(format!("{URL}?language=English&limit=5"))
        .header("host", "books.test")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(
        body["next"],
        "http://books.test/api/v1/books/?language=English&limit=5&offset=5"
    );
}

#[tokio::test]
async fn test_filter_books_by_author_exact() {
    let app = seeded_app().await;
    let (status, body) = app.get(&format!("{URL}?author=Author%200")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 8);
    assert_eq!(body["results"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_filter_values_are_trimmed() {
    let app = seeded_app().await;
    let (status, body) = app.get(&format!("{URL}?author=%20Author%200%20")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 8);
}

#[tokio::test]
async fn test_filter_books_by_author_in() {
    let app = seeded_app().await;
    let (status, body) = app
        .get(&format!("{URL}?author__in=Author%200,Author%201"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 15);
    assert_eq!(body["results"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_filter_books_by_author_icontains() {
    let app = seeded_app().await;
    let (status, body) = app.get(&format!("{URL}?author__icontains=author")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 15);
}

#[tokio::test]
async fn test_filter_books_by_published_date() {
    let app = seeded_app().await;

    let (_, exact) = app.get(&format!("{URL}?published_date={TODAY}")).await;
    assert_eq!(exact["count"], 1);

    let (_, gte) = app.get(&format!("{URL}?published_date__gte={TODAY}")).await;
    assert_eq!(gte["count"], 1);

    let (_, lte) = app.get(&format!("{URL}?published_date__lte={TODAY}")).await;
    assert_eq!(lte["count"], 15);
    assert_eq!(lte["results"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_filter_dates_accept_unpadded_and_us_forms() {
    let app = seeded_app().await;
    for value in ["2024-6-5", "06/05/2024", "6/5/2024"] {
        let (status, body) = app
            .get(&format!("{URL}?published_date__lte={value}"))
            .await;
        assert_eq!(status, StatusCode::OK, "{value}");
        assert_eq!(body["count"], 5, "{value}");
    }
}

#[tokio::test]
async fn test_filter_books_by_invalid_date() {
    let app = seeded_app().await;
    let (status, body) = app.get(&format!("{URL}?published_date=soon")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"]["published_date"][0],
        "Enter a valid date."
    );
}

#[tokio::test]
async fn test_filter_books_by_language() {
    let app = seeded_app().await;
    for query in ["language=English", "language__in=English", "language__icontains=english"] {
        let (status, body) = app.get(&format!("{URL}?{query}")).await;
        assert_eq!(status, StatusCode::OK, "{query}");
        assert_eq!(body["count"], 15, "{query}");
    }

    let (_, none) = app.get(&format!("{URL}?language=French")).await;
    assert_eq!(none["count"], 0);
}

#[tokio::test]
async fn test_filters_combine_and_unknown_params_are_ignored() {
    let app = seeded_app().await;
    let (_, body) = app
        .get(&format!(
            "{URL}?author=Author%201&language=English&title=ignored"
        ))
        .await;
    assert_eq!(body["count"], 7);
    assert!(body["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|book| book["author"] == "Author 1" && book["language"] == "English"));
}

#[tokio::test]
async fn test_create_book_valid() {
    let app = seeded_app().await;
    let (status, body) = app.request(Method::POST, URL, Some(valid_data())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 16);
    assert_eq!(app.store.count().await.unwrap(), 16);
}

#[tokio::test]
async fn test_create_then_retrieve_round_trips() {
    let app = seeded_app().await;
    let data = json!({
        "title": "The Catcher in the Rye",
        "author": "J.D. Salinger",
        "published_date": "1951-07-16",
        "isbn": "9780316769488",
        "pages": 277,
        "cover": "https://covers.example.com/catcher.jpg",
        "language": "English"
    });
    let (_, created) = app.request(Method::POST, URL, Some(data.clone())).await;

    let (status, fetched) = app.get(&format!("{URL}{}/", created["id"])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
    for (field, value) in data.as_object().unwrap() {
        assert_eq!(&fetched[field], value, "{field}");
    }
}

#[tokio::test]
async fn test_create_book_invalid() {
    let app = seeded_app().await;
    let (status, body) = app.request(Method::POST, URL, Some(invalid_data())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(
        body["error"]["details"]["isbn"][0],
        "Ensure this field has no more than 13 characters."
    );
    assert_eq!(app.store.count().await.unwrap(), 15);
}

#[tokio::test]
async fn test_create_book_with_unpadded_date() {
    let app = seeded_app().await;
    let mut data = valid_data();
    data["published_date"] = json!("2024-6-5");

    let (status, body) = app.request(Method::POST, URL, Some(data)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["published_date"], "2024-06-05");
}

#[tokio::test]
async fn test_create_book_duplicate_isbn() {
    let app = seeded_app().await;
    let (first, _) = app.request(Method::POST, URL, Some(valid_data())).await;
    assert_eq!(first, StatusCode::CREATED);

    let (second, body) = app.request(Method::POST, URL, Some(valid_data())).await;
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"]["isbn"][0],
        "book with this isbn already exists."
    );
    assert_eq!(app.store.count().await.unwrap(), 16);
}

#[tokio::test]
async fn test_create_book_malformed_json() {
    let app = seeded_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri(URL)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"title\": "))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.count().await.unwrap(), 15);
}

#[tokio::test]
async fn test_retrieve_book() {
    let app = seeded_app().await;
    let book = app.stored(app.first_id().await).await;
    let (status, body) = app.get(&format!("{URL}{}/", book.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], book.title);
}

#[tokio::test]
async fn test_retrieve_book_not_found() {
    let app = seeded_app().await;
    let (status, body) = app.get(&format!("{URL}999/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = app.get(&format!("{URL}not-a-number/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_book_valid() {
    let app = seeded_app().await;
    let id = app.first_id().await;
    let data = valid_data();
    let (status, body) = app
        .request(Method::PUT, &format!("{URL}{id}/"), Some(data.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(app.stored(id).await.title, data["title"].as_str().unwrap());
}

#[tokio::test]
async fn test_update_book_keeps_own_isbn() {
    let app = seeded_app().await;
    let book = app.stored(app.first_id().await).await;
    let mut data = valid_data();
    data["isbn"] = json!(book.isbn);

    let (status, _) = app
        .request(Method::PUT, &format!("{URL}{}/", book.id), Some(data))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_book_invalid() {
    let app = seeded_app().await;
    let id = app.first_id().await;
    let data = invalid_data();
    let (status, _) = app
        .request(Method::PUT, &format!("{URL}{id}/"), Some(data.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_ne!(app.stored(id).await.title, data["title"].as_str().unwrap());
}

#[tokio::test]
async fn test_update_book_not_found() {
    let app = seeded_app().await;
    let (status, _) = app
        .request(Method::PUT, &format!("{URL}999/"), Some(valid_data()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_partial_update_book_valid() {
    let app = seeded_app().await;
    let before = app.stored(app.first_id().await).await;
    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("{URL}{}/", before.id),
            Some(json!({"title": "Updated Book"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Updated Book");

    let after = app.stored(before.id).await;
    assert_eq!(after.title, "Updated Book");
    assert_eq!(
        Book {
            title: before.title.clone(),
            ..after
        },
        before
    );
}

#[tokio::test]
async fn test_partial_update_book_invalid() {
    let app = seeded_app().await;
    let book = app.stored(app.first_id().await).await;
    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("{URL}{}/", book.id),
            Some(json!({"isbn": "9783161484999-"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["isbn"].is_array());
    assert_eq!(app.stored(book.id).await.isbn, book.isbn);
}

#[tokio::test]
async fn test_partial_update_to_taken_isbn() {
    let app = seeded_app().await;
    let books = app.stored_books().await;
    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("{URL}{}/", books[0].id),
            Some(json!({"isbn": books[1].isbn})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_book() {
    let app = seeded_app().await;
    let id = app.first_id().await;
    let (status, body) = app.request(Method::DELETE, &format!("{URL}{id}/"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
    assert_eq!(app.store.count().await.unwrap(), 14);

    let (status, _) = app.get(&format!("{URL}{id}/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_book_not_found() {
    let app = seeded_app().await;
    let (status, _) = app.request(Method::DELETE, &format!("{URL}999/"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.count().await.unwrap(), 15);
}

#[tokio::test]
async fn test_module_health() {
    let app = seeded_app().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/books/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Store whose uniqueness pre-check always passes, so a duplicate only
/// surfaces when the write reaches the table constraint.
struct RacingStore(Arc<MemoryTable<Book>>);

#[async_trait]
impl Repository<Book> for RacingStore {
    async fn insert(&self, record: Book) -> StoreResult<Book> {
        self.0.insert(record).await
    }

    async fn get(&self, id: RecordId) -> StoreResult<Option<Book>> {
        self.0.get(id).await
    }

    async fn replace(&self, record: Book) -> StoreResult<Book> {
        self.0.replace(record).await
    }

    async fn delete(&self, id: RecordId) -> StoreResult<()> {
        self.0.delete(id).await
    }

    async fn query(&self, conditions: &[Condition], window: Window) -> StoreResult<Slice<Book>> {
        self.0.query(conditions, window).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.0.count().await
    }

    async fn is_unique(
        &self,
        _field: &'static str,
        _value: &str,
        _exclude: Option<RecordId>,
    ) -> StoreResult<bool> {
        Ok(true)
    }
}

async fn racing_app() -> TestApp {
    let store = Arc::new(MemoryTable::<Book>::new());
    for count in 0..2_i64 {
        store
            .insert(Book {
                title: format!("Book {count}"),
                author: "Author".to_string(),
                isbn: format!("978316148410{count}"),
                language: "English".to_string(),
                ..Book::default()
            })
            .await
            .unwrap();
    }

    let settings = Settings::default();
    let racing = Arc::new(RacingStore(store.clone()));
    let registry = crate::build_registry(&settings, racing).unwrap();
    TestApp {
        router: libris_http::build_router(&registry, &settings),
        store,
    }
}

#[tokio::test]
async fn test_isbn_lost_race_reports_field_error() {
    let app = racing_app().await;
    let mut data = valid_data();
    data["isbn"] = json!("9783161484100");

    let (status, body) = app.request(Method::POST, URL, Some(data.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(
        body["error"]["details"]["isbn"],
        json!(["book with this isbn already exists."])
    );

    let (status, body) = app
        .request(Method::PUT, &format!("{URL}2/"), Some(data))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"]["isbn"],
        json!(["book with this isbn already exists."])
    );

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("{URL}2/"),
            Some(json!({"isbn": "9783161484100"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"]["isbn"],
        json!(["book with this isbn already exists."])
    );

    assert_eq!(app.store.count().await.unwrap(), 2);
    assert_eq!(app.stored(2).await.isbn, "9783161484101");
}
