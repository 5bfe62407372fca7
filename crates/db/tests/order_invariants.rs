use libdesk_core::domain::book::{Book, Isbn};
use libdesk_core::domain::customer::CustomerId;
use libdesk_core::domain::order::{NewOrder, OrderLine};
use libdesk_core::errors::DomainError;
use libdesk_db::repositories::{
    BookRepository, OrderRepository, RepositoryError, SqlBookRepository, SqlOrderRepository,
};
use libdesk_db::{connect_with_settings, migrations, DbPool};
use rust_decimal::Decimal;
use tempfile::TempDir;

type InvariantTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn file_backed_pool(dir: &TempDir, max_connections: u32) -> InvariantTestResult<DbPool> {
    let path = dir.path().join("library.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = connect_with_settings(&url, max_connections, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    sqlx::query("INSERT INTO customers (id, name, email) VALUES (1, 'Ada', 'ada@example.com')")
        .execute(&pool)
        .await
        .map_err(|error| format!("seed customer: {error}"))?;
    Ok(pool)
}

async fn add_book(pool: &DbPool, isbn: &str, price: Decimal, stock: i64) -> InvariantTestResult {
    SqlBookRepository::new(pool.clone())
        .upsert(Book {
            isbn: Isbn::from(isbn),
            title: format!("Book {isbn}"),
            author: "Author".to_string(),
            price,
            stock,
        })
        .await
        .map_err(|error| format!("seed book {isbn}: {error}"))
}

fn single_line(isbn: &str, qty: i64) -> NewOrder {
    NewOrder { customer_id: CustomerId(1), items: vec![OrderLine { isbn: Isbn::from(isbn), qty }] }
}

async fn stock_of(pool: &DbPool, isbn: &str) -> InvariantTestResult<i64> {
    SqlBookRepository::new(pool.clone())
        .find(&Isbn::from(isbn))
        .await
        .map_err(|error| format!("find {isbn}: {error}"))?
        .map(|book| book.stock)
        .ok_or_else(|| format!("book {isbn} should exist"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() -> InvariantTestResult {
    let dir = TempDir::new().map_err(|error| error.to_string())?;
    let pool = file_backed_pool(&dir, 4).await?;
    add_book(&pool, "555", Decimal::new(10, 0), 5).await?;

    let first = SqlOrderRepository::new(pool.clone());
    let second = SqlOrderRepository::new(pool.clone());
    let order = single_line("555", 3);

    let (left, right) = tokio::join!(first.create_order(&order), second.create_order(&order));

    let successes = [&left, &right].iter().filter(|result| result.is_ok()).count();
    require_eq!(successes, 1);

    let rejected = [left, right].into_iter().find_map(Result::err);
    require!(
        matches!(
            rejected,
            Some(RepositoryError::Domain(DomainError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            }))
        ),
        "losing order should see insufficient stock, got {rejected:?}"
    );

    require_eq!(stock_of(&pool, "555").await?, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_single_copy_orders_drain_stock_exactly() -> InvariantTestResult {
    let dir = TempDir::new().map_err(|error| error.to_string())?;
    let pool = file_backed_pool(&dir, 5).await?;
    add_book(&pool, "777", Decimal::new(5, 0), 6).await?;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let repo = SqlOrderRepository::new(pool.clone());
        handles.push(tokio::spawn(async move { repo.create_order(&single_line("777", 1)).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.map_err(|error| format!("join: {error}"))? {
            Ok(_) => successes += 1,
            Err(RepositoryError::Domain(DomainError::InsufficientStock { .. })) => {}
            Err(other) => return Err(format!("unexpected failure: {other}")),
        }
    }

    require_eq!(successes, 6);
    require_eq!(stock_of(&pool, "777").await?, 0);
    Ok(())
}

#[tokio::test]
async fn order_then_price_change_keeps_historical_price() -> InvariantTestResult {
    let dir = TempDir::new().map_err(|error| error.to_string())?;
    let pool = file_backed_pool(&dir, 1).await?;
    add_book(&pool, "111", Decimal::new(200, 1), 10).await?;

    let orders = SqlOrderRepository::new(pool.clone());
    let books = SqlBookRepository::new(pool.clone());

    let order_id = orders
        .create_order(&single_line("111", 4))
        .await
        .map_err(|error| format!("create order: {error}"))?;
    require_eq!(stock_of(&pool, "111").await?, 6);

    books
        .update_price(&Isbn::from("111"), Decimal::new(250, 1))
        .await
        .map_err(|error| format!("update price: {error}"))?;

    let detail =
        orders.order_status(order_id).await.map_err(|error| format!("order status: {error}"))?;
    require_eq!(detail.items.len(), 1);
    require_eq!(detail.items[0].price_at_order, Decimal::new(20, 0));
    Ok(())
}

#[tokio::test]
async fn inventory_summary_lists_low_stock_ascending() -> InvariantTestResult {
    let dir = TempDir::new().map_err(|error| error.to_string())?;
    let pool = file_backed_pool(&dir, 1).await?;
    for (isbn, stock) in [("a1", 2), ("b2", 6), ("c3", 5), ("d4", 0)] {
        add_book(&pool, isbn, Decimal::ONE, stock).await?;
    }

    let low = SqlBookRepository::new(pool.clone())
        .low_stock(5)
        .await
        .map_err(|error| format!("low stock: {error}"))?;
    let stocks: Vec<i64> = low.iter().map(|book| book.stock).collect();
    require_eq!(stocks, vec![0, 2, 5]);
    Ok(())
}
