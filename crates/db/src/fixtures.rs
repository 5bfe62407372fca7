use serde::Serialize;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_BOOK_ISBNS: &[&str] = &[
    "9780132350884",
    "9780201616224",
    "9780134757599",
    "9781593278281",
    "9780596007126",
    "9780262033848",
    "9781492052593",
    "9780321125217",
];

const SEED_CUSTOMER_IDS: &[i64] = &[1, 2, 3];

/// Demo catalog and customers for local runs and smoke checks.
pub struct LibrarySeed;

impl LibrarySeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/library_seed.sql");

    /// Loads the seed inside one transaction. Existing rows are left alone, so
    /// reseeding never resets stock that orders already consumed.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult { books: SEED_BOOK_ISBNS.len(), customers: SEED_CUSTOMER_IDS.len() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for isbn in SEED_BOOK_ISBNS {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = ?1)")
                    .bind(*isbn)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("book {isbn}"), exists == 1));
        }

        for id in SEED_CUSTOMER_IDS {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE id = ?1)")
                    .bind(*id)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("customer {id}"), exists == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub books: usize,
    pub customers: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
