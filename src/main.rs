use std::process::ExitCode;

use clap::Parser;
use slog::{error, o, Drain, Logger};

use clusterctl::cli::{parse_parameters, Cli, Commands};
use clusterctl::net::pool_instance;
use clusterctl::verbs;

fn build_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = build_logger();

    match run(cli, &logger).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(logger, "command failed"; "error" => %e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, logger: &Logger) -> Result<(), clusterctl::OpError> {
    match cli.command {
        Commands::CreateDb {
            db,
            shard_count,
            communal_storage_location,
            communal_storage_params,
            depot_size,
            force_removal_at_creation,
            skip_package_install,
            skip_startup_polling,
            startup_timeout,
        } => {
            let mut options = verbs::create_db::CreateDbOptions::new();
            options.db = db.to_options()?;
            options.shard_count = shard_count;
            options.communal_storage_location = communal_storage_location;
            options.communal_storage_parameters = parse_parameters(&communal_storage_params)?;
            options.depot_size = depot_size;
            options.force_removal_at_creation = force_removal_at_creation;
            options.skip_package_install = skip_package_install;
            options.skip_startup_polling = skip_startup_polling;
            options.timeout_node_startup_secs = startup_timeout;

            let pool = pool_instance(logger, &options.db.tls_bundle());
            verbs::create_db::create_db(pool, logger, &mut options).await?;
        }
        Commands::DropDb { db, force_delete } => {
            let mut options = verbs::drop_db::DropDbOptions::new();
            options.db = db.to_options()?;
            options.force_delete = force_delete;

            let pool = pool_instance(logger, &options.db.tls_bundle());
            verbs::drop_db::drop_db(pool, logger, &options).await?;
        }
        Commands::StartDb {
            db,
            startup_timeout,
        } => {
            let mut options = verbs::start_db::StartDbOptions::new();
            options.db = db.to_options()?;
            options.timeout_node_startup_secs = startup_timeout;

            let pool = pool_instance(logger, &options.db.tls_bundle());
            verbs::start_db::start_db(pool, logger, &options).await?;
        }
        Commands::StopDb { db, drain_seconds } => {
            let mut options = verbs::stop_db::StopDbOptions::new();
            options.db = db.to_options()?;
            options.drain_seconds = drain_seconds;

            let pool = pool_instance(logger, &options.db.tls_bundle());
            verbs::stop_db::stop_db(pool, logger, &options).await?;
        }
        Commands::ReviveDb {
            db,
            communal_storage_location,
            communal_storage_params,
            load_catalog_timeout,
            force_removal,
        } => {
            let mut options = verbs::revive_db::ReviveDbOptions::new();
            options.db = db.to_options()?;
            options.communal_storage_location = communal_storage_location;
            options.communal_storage_parameters = parse_parameters(&communal_storage_params)?;
            options.load_catalog_timeout_secs = load_catalog_timeout;
            options.force_removal = force_removal;

            let pool = pool_instance(logger, &options.db.tls_bundle());
            verbs::revive_db::revive_db(pool, logger, &mut options).await?;
        }
        Commands::Replicate {
            db,
            target_db,
            target_hosts,
            target_username,
            target_password,
            tls_config,
            sandbox,
        } => {
            let mut options = verbs::replicate::ReplicateOptions::new();
            options.db = db.to_options()?;
            options.target_db = target_db;
            options.target_hosts = target_hosts;
            options.target_username = target_username;
            options.target_password = target_password;
            options.tls_config = tls_config;
            options.sandbox = sandbox;

            let pool = pool_instance(logger, &options.db.tls_bundle());
            verbs::replicate::replicate(pool, logger, &options).await?;
        }
        Commands::Scrutinize { db, log_age_hours } => {
            let mut options = verbs::scrutinize::ScrutinizeOptions::new();
            options.db = db.to_options()?;
            options.log_age_max_hours = log_age_hours;

            let pool = pool_instance(logger, &options.db.tls_bundle());
            verbs::scrutinize::scrutinize(pool, logger, &mut options).await?;
        }
    }
    Ok(())
}
