use libdesk_db::repositories::{BookRepository, SqlBookRepository};
use libdesk_db::{connect_from_config, migrations};
use serde_json::json;

use crate::commands::{
    prepare, CommandResult, StepFailure, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION,
};

pub fn run(threshold: Option<i64>) -> CommandResult {
    let (config, runtime) = match prepare("inventory") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let threshold = threshold.unwrap_or(config.inventory.low_stock_threshold);
    if threshold < 0 {
        return CommandResult::failure(
            "inventory",
            "invalid_argument",
            format!("threshold must not be negative, got {threshold}"),
            EXIT_CONFIG,
        );
    }

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let books: Result<_, StepFailure> = SqlBookRepository::new(pool.clone())
            .low_stock(threshold)
            .await
            .map_err(|error| ("inventory_query", error.to_string(), EXIT_DATABASE));

        pool.close().await;
        books
    });

    match result {
        Ok(low_stock) => CommandResult::success_with_data(
            "inventory",
            format!("{} book(s) at or below stock {threshold}", low_stock.len()),
            json!({ "threshold": threshold, "low_stock": low_stock }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("inventory", error_class, message, exit_code)
        }
    }
}
