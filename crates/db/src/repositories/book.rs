use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use libdesk_core::domain::book::{validate_price, validate_restock_quantity, Book, Isbn, SearchField};
use libdesk_core::errors::DomainError;

use super::{parse_price, BookRepository, RepositoryError};
use crate::DbPool;

const BOOK_COLUMNS: &str = "isbn, title, author, price, stock";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookRecord {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub price: String,
    pub stock: i64,
}

impl TryFrom<BookRecord> for Book {
    type Error = RepositoryError;

    fn try_from(value: BookRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            price: parse_price("book price", &value.price)?,
            isbn: Isbn(value.isbn),
            title: value.title,
            author: value.author,
            stock: value.stock,
        })
    }
}

impl From<Book> for BookRecord {
    fn from(value: Book) -> Self {
        Self {
            isbn: value.isbn.0,
            title: value.title,
            author: value.author,
            price: value.price.to_string(),
            stock: value.stock,
        }
    }
}

pub struct SqlBookRepository {
    pool: DbPool,
}

impl SqlBookRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a catalog entry. Used by seeding and tests.
    pub async fn upsert(&self, book: Book) -> Result<(), RepositoryError> {
        let record = BookRecord::from(book);
        sqlx::query(
            "INSERT INTO books (isbn, title, author, price, stock) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(isbn) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                price = excluded.price,
                stock = excluded.stock",
        )
        .bind(&record.isbn)
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.price)
        .bind(record.stock)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BookRepository for SqlBookRepository {
    async fn list_books(&self) -> Result<Vec<Book>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(book_from_row).collect()
    }

    async fn search(&self, query: &str, by: SearchField) -> Result<Vec<Book>, RepositoryError> {
        // Column names come from a closed enum, never from user input.
        let column = by.as_str();
        let pattern = format!("%{}%", escape_like(query));

        let rows = sqlx::query(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE {column} LIKE ? ESCAPE '\\'"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(book_from_row).collect()
    }

    async fn find(&self, isbn: &Isbn) -> Result<Option<Book>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE isbn = ?"))
            .bind(isbn.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(book_from_row).transpose()
    }

    async fn restock(&self, isbn: &Isbn, qty: i64) -> Result<i64, RepositoryError> {
        validate_restock_quantity(isbn, qty)?;

        // SQLite turns an overflowing integer sum into REAL, so the guard keeps
        // the addition inside i64 before anything is written.
        let new_stock: Option<i64> = sqlx::query_scalar(
            "UPDATE books SET stock = stock + ? WHERE isbn = ? AND stock <= ? RETURNING stock",
        )
        .bind(qty)
        .bind(isbn.as_str())
        .bind(i64::MAX - qty)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(new_stock) = new_stock {
            return Ok(new_stock);
        }

        let current: Option<i64> = sqlx::query_scalar("SELECT stock FROM books WHERE isbn = ?")
            .bind(isbn.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match current {
            None => Err(DomainError::BookNotFound(isbn.clone()).into()),
            Some(stock) => {
                Err(DomainError::StockOverflow { isbn: isbn.clone(), stock, qty }.into())
            }
        }
    }

    async fn update_price(&self, isbn: &Isbn, price: Decimal) -> Result<Decimal, RepositoryError> {
        validate_price(isbn, price)?;

        let stored: Option<String> =
            sqlx::query_scalar("UPDATE books SET price = ? WHERE isbn = ? RETURNING price")
                .bind(price.to_string())
                .bind(isbn.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let stored = stored.ok_or_else(|| DomainError::BookNotFound(isbn.clone()))?;
        parse_price("book price", &stored)
    }

    async fn low_stock(&self, threshold: i64) -> Result<Vec<Book>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE stock <= ? ORDER BY stock ASC, isbn ASC"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(book_from_row).collect()
    }
}

/// Escapes LIKE wildcards so user input only ever matches literally.
pub(crate) fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn book_record_from_row(row: &SqliteRow) -> Result<BookRecord, RepositoryError> {
    Ok(BookRecord {
        isbn: row.try_get("isbn")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
    })
}

pub(crate) fn book_from_row(row: &SqliteRow) -> Result<Book, RepositoryError> {
    Book::try_from(book_record_from_row(row)?)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use libdesk_core::domain::book::{Book, Isbn, SearchField};
    use libdesk_core::errors::DomainError;

    use super::{escape_like, SqlBookRepository};
    use crate::repositories::{BookRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, SqlBookRepository) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlBookRepository::new(pool.clone());
        (pool, repo)
    }

    fn book(isbn: &str, title: &str, author: &str, price: Decimal, stock: i64) -> Book {
        Book {
            isbn: Isbn::from(isbn),
            title: title.to_string(),
            author: author.to_string(),
            price,
            stock,
        }
    }

    async fn seed_catalog(repo: &SqlBookRepository) {
        for entry in [
            book("111", "Clean Code", "Robert Martin", Decimal::new(2000, 1), 10),
            book("222", "Refactoring", "Martin Fowler", Decimal::new(4799, 2), 2),
            book("333", "100% Rust", "Jane Doe", Decimal::new(1500, 2), 6),
            book("444", "snake_case Style", "John Roe", Decimal::new(999, 2), 0),
        ] {
            repo.upsert(entry).await.expect("seed book");
        }
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn search_matches_substrings_case_insensitively() {
        let (_pool, repo) = setup().await;
        seed_catalog(&repo).await;

        let by_title = repo.search("code", SearchField::Title).await.expect("search title");
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].isbn, Isbn::from("111"));

        let mut by_author = repo.search("MARTIN", SearchField::Author).await.expect("search author");
        by_author.sort_by(|a, b| a.isbn.cmp(&b.isbn));
        let isbns: Vec<&str> = by_author.iter().map(|b| b.isbn.as_str()).collect();
        assert_eq!(isbns, vec!["111", "222"]);

        let none = repo.search("Dostoevsky", SearchField::Author).await.expect("search none");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn repeated_search_returns_the_same_books() {
        let (_pool, repo) = setup().await;
        seed_catalog(&repo).await;

        let first = repo.search("martin", SearchField::Author).await.expect("first search");
        let second = repo.search("martin", SearchField::Author).await.expect("second search");
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);

        let stocks: Vec<i64> = repo.list_books().await.expect("list").iter().map(|b| b.stock).collect();
        assert_eq!(stocks.iter().sum::<i64>(), 18, "searching must not touch stock");
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let (_pool, repo) = setup().await;
        seed_catalog(&repo).await;

        let percent = repo.search("0%", SearchField::Title).await.expect("percent");
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].isbn, Isbn::from("333"));

        let underscore = repo.search("e_c", SearchField::Title).await.expect("underscore");
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].isbn, Isbn::from("444"));

        let bare = repo.search("_", SearchField::Author).await.expect("bare underscore");
        assert!(bare.is_empty(), "`_` must not match any single character");
    }

    #[tokio::test]
    async fn restock_increments_and_reports_new_stock() {
        let (_pool, repo) = setup().await;
        seed_catalog(&repo).await;

        let new_stock = repo.restock(&Isbn::from("222"), 5).await.expect("restock");
        assert_eq!(new_stock, 7);

        let stored = repo.find(&Isbn::from("222")).await.expect("find").expect("book exists");
        assert_eq!(stored.stock, 7);
    }

    #[tokio::test]
    async fn restock_rejects_unknown_book_and_bad_quantity() {
        let (_pool, repo) = setup().await;
        seed_catalog(&repo).await;

        let missing = repo.restock(&Isbn::from("999"), 1).await;
        assert!(matches!(missing, Err(RepositoryError::Domain(DomainError::BookNotFound(_)))));

        let negative = repo.restock(&Isbn::from("111"), -20).await;
        assert!(matches!(
            negative,
            Err(RepositoryError::Domain(DomainError::InvalidQuantity { qty: -20, .. }))
        ));

        let stored = repo.find(&Isbn::from("111")).await.expect("find").expect("book exists");
        assert_eq!(stored.stock, 10, "rejected restock must leave stock unchanged");
    }

    #[tokio::test]
    async fn restock_overflow_is_refused_and_catalog_stays_readable() {
        let (pool, repo) = setup().await;
        seed_catalog(&repo).await;

        let overflow = repo.restock(&Isbn::from("111"), i64::MAX).await;
        assert!(matches!(
            overflow,
            Err(RepositoryError::Domain(DomainError::StockOverflow { stock: 10, qty: i64::MAX, .. }))
        ));

        let stored_type: String =
            sqlx::query_scalar("SELECT typeof(stock) FROM books WHERE isbn = '111'")
                .fetch_one(&pool)
                .await
                .expect("typeof");
        assert_eq!(stored_type, "integer");

        let books = repo.list_books().await.expect("catalog still decodes");
        let clean_code = books.iter().find(|b| b.isbn.as_str() == "111").expect("111 listed");
        assert_eq!(clean_code.stock, 10);

        let to_limit = repo.restock(&Isbn::from("444"), i64::MAX).await.expect("exactly at limit");
        assert_eq!(to_limit, i64::MAX);
    }

    #[tokio::test]
    async fn update_price_overwrites_and_validates() {
        let (_pool, repo) = setup().await;
        seed_catalog(&repo).await;

        let new_price =
            repo.update_price(&Isbn::from("111"), Decimal::new(2500, 2)).await.expect("update");
        assert_eq!(new_price, Decimal::new(25, 0));

        let stored = repo.find(&Isbn::from("111")).await.expect("find").expect("book exists");
        assert_eq!(stored.price, Decimal::new(25, 0));

        let negative = repo.update_price(&Isbn::from("111"), Decimal::new(-1, 0)).await;
        assert!(matches!(negative, Err(RepositoryError::Domain(DomainError::InvalidPrice { .. }))));

        let missing = repo.update_price(&Isbn::from("999"), Decimal::ONE).await;
        assert!(matches!(missing, Err(RepositoryError::Domain(DomainError::BookNotFound(_)))));
    }

    #[tokio::test]
    async fn low_stock_orders_by_stock_ascending() {
        let (_pool, repo) = setup().await;
        for (isbn, stock) in [("a", 2), ("b", 6), ("c", 5), ("d", 0)] {
            repo.upsert(book(isbn, isbn, "author", Decimal::ONE, stock)).await.expect("seed");
        }

        let low = repo.low_stock(5).await.expect("low stock");
        let stocks: Vec<i64> = low.iter().map(|b| b.stock).collect();
        assert_eq!(stocks, vec![0, 2, 5]);

        let again = repo.low_stock(5).await.expect("low stock again");
        assert_eq!(again, low, "reads must be idempotent");
    }
}
