use crate::commands::{current_thread_runtime, CommandResult};
use soof_core::config::{AppConfig, LoadOptions};
use soof_db::{connect_with_config, migrations};
use tracing::{info, warn};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => {
            info!(
                event_name = "cli.migrate.applied",
                database_url = %config.database.url,
                "thread store migrations applied"
            );
            CommandResult::success(
                "migrate",
                format!("applied pending thread store migrations to `{}`", config.database.url),
            )
        }
        Err((error_class, message, exit_code)) => {
            warn!(event_name = "cli.migrate.failed", error_class, error = %message, "migration run failed");
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
