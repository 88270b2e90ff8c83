use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs, DatabaseConfig};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use student_records::model::{OrderKey, StudentQuery, StudentStatus};
use student_records::{StudentRecords, StudentRecordsConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const MODULE_NAME: &str = "student_records";
const MEMORY_DSN: &str = "sqlite::memory:";

/// Expand a sqlite DSN into an absolute-path DSN using a base directory.
/// - Keeps in-memory DSNs as "sqlite::memory:".
/// - Normalizes backslashes into forward slashes (important on Windows).
fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path, create_dirs: bool) -> Result<String> {
    if dsn.eq_ignore_ascii_case(MEMORY_DSN) || dsn.eq_ignore_ascii_case("sqlite://:memory:") {
        return Ok(MEMORY_DSN.to_string());
    }
    let db_path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("DSN must start with sqlite:// (got: {dsn})"))?;

    let (path_str, query) = match db_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (db_path, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        return Err(anyhow!("Empty SQLite path in DSN"));
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }

    if create_dirs {
        if let Some(dir) = p.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create database directory {}", dir.display()))?;
        }
    }

    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

/// Student records server: lifecycle, CSV import/export and retention purge
#[derive(Parser)]
#[command(name = "records-server")]
#[command(about = "Student records server: lifecycle, CSV import/export and retention purge")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override (kept in the effective configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use an in-memory database
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and the retention purge scheduler
    Run,
    /// Check configuration
    Check,
    /// Import students from a CSV file and print the reconciliation report
    Import {
        /// CSV file to import
        file: PathBuf,
    },
    /// List active students as one JSON page
    List {
        #[command(flatten)]
        filter: QueryArgs,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u64,
        /// Page size, at most 500
        #[arg(long, default_value_t = StudentQuery::DEFAULT_PAGE_SIZE)]
        limit: u64,
    },
    /// Print active students as CSV
    Export {
        #[command(flatten)]
        filter: QueryArgs,
    },
    /// Run one retention purge cycle now
    Purge,
    /// List soft-deleted students with the days left before purge
    Deleted {
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Soft-delete every active student
    DeleteAll {
        #[arg(long)]
        confirm: String,
    },
    /// Permanently delete every student
    PurgeAll {
        #[arg(long)]
        confirm: String,
    },
    /// Restore every soft-deleted student
    RestoreAll {
        #[arg(long)]
        confirm: String,
    },
}

/// Filters shared by `list` and `export`
#[derive(Args, Default)]
struct QueryArgs {
    #[arg(long)]
    faculty: Option<String>,
    #[arg(long)]
    group: Option<String>,
    /// active, graduated, expelled or academic_leave
    #[arg(long)]
    status: Option<StudentStatus>,
    /// Case-insensitive match on full name or email
    #[arg(long)]
    search: Option<String>,
    /// Comma-separated fields; prefix with '-' for descending, e.g. "faculty,-created_at"
    #[arg(long)]
    sort: Option<String>,
}

impl QueryArgs {
    fn into_query(self) -> Result<StudentQuery> {
        let order = match self.sort.as_deref() {
            Some(spec) => OrderKey::parse_list(spec).map_err(|e| anyhow!("--sort: {e}"))?,
            None => Vec::new(),
        };
        Ok(StudentQuery {
            faculty: self.faculty,
            group: self.group,
            status: self.status,
            search: self.search,
            order,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
        mock: cli.mock,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, &config.home_dir());
    tracing::debug!(home_dir = %config.server.home_dir, "records-server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Check = command {
        return check_config(&config);
    }

    let module = open_module(&config, &args).await?;
    let client = module.client();

    match command {
        Commands::Run => run_server(module).await,
        Commands::Check => Ok(()),
        Commands::Import { file } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("cannot read import file {}", file.display()))?;
            print_json(&client.import_csv(&data).await?)
        }
        Commands::List {
            filter,
            page,
            limit,
        } => {
            let query = filter.into_query()?.page(page, limit);
            print_json(&client.find_students(query).await?)
        }
        Commands::Export { filter } => {
            print!("{}", client.export_csv(filter.into_query()?).await?);
            Ok(())
        }
        Commands::Purge => print_json(&client.purge_expired().await?),
        Commands::Deleted { limit } => {
            let students = client.list_deleted(limit).await?;
            let expiring = client.count_expiring().await?;
            print_json(&serde_json::json!({ "expiring": expiring, "students": students }))
        }
        Commands::DeleteAll { confirm } => {
            let n = client.delete_all_active(&confirm).await?;
            print_json(&serde_json::json!({ "soft_deleted": n }))
        }
        Commands::PurgeAll { confirm } => {
            let n = client.permanently_delete_all(&confirm).await?;
            print_json(&serde_json::json!({ "purged": n }))
        }
        Commands::RestoreAll { confirm } => {
            let n = client.restore_all(&confirm).await?;
            print_json(&serde_json::json!({ "restored": n }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_dsn(db_config: &DatabaseConfig, base_dir: &Path, mock: bool) -> Result<String> {
    if mock {
        return Ok(MEMORY_DSN.to_string());
    }
    let raw = db_config.url.trim();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }
    if !raw.starts_with("sqlite:") {
        return Err(anyhow!("Unsupported database URL '{raw}': only sqlite is supported"));
    }
    absolutize_sqlite_dsn(raw, base_dir, true)
}

async fn connect_db(config: &AppConfig, args: &CliArgs) -> Result<DatabaseConnection> {
    let db_config = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("No database configuration found"))?;
    let dsn = resolve_dsn(db_config, &config.home_dir(), args.mock)?;

    // every in-memory connection is its own database
    let max_conns = if dsn == MEMORY_DSN {
        1
    } else {
        db_config.max_conns.unwrap_or(10)
    };
    let busy_timeout = db_config
        .busy_timeout_ms
        .map(|ms| Duration::from_millis(u64::from(ms)));

    let mut opts = ConnectOptions::new(dsn.clone());
    opts.max_connections(max_conns)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false)
        .map_sqlx_sqlite_opts(move |o| {
            let o = o.create_if_missing(true);
            match busy_timeout {
                Some(t) => o.busy_timeout(t),
                None => o,
            }
        });

    tracing::info!(dsn = %dsn, "connecting to database");
    Database::connect(opts)
        .await
        .with_context(|| format!("cannot connect to {dsn}"))
}

async fn open_module(config: &AppConfig, args: &CliArgs) -> Result<StudentRecords> {
    let module_config: StudentRecordsConfig = config.module_config(MODULE_NAME)?;
    let db = connect_db(config, args).await?;
    StudentRecords::migrate(&db).await?;
    StudentRecords::build(db, module_config)
}

async fn run_server(module: StudentRecords) -> Result<()> {
    module.start()?;
    tracing::info!("records-server running; waiting for shutdown signal");

    runtime::wait_for_shutdown().await?;

    let reason = module.stop().await;
    tracing::info!(?reason, "records-server stopped");
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    let module_config: StudentRecordsConfig = config.module_config(MODULE_NAME)?;
    module_config
        .validate()
        .context("invalid student_records configuration")?;
    if let Some(db_config) = &config.database {
        resolve_dsn(db_config, &config.home_dir(), false)?;
    }

    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_dsn_is_kept() {
        let base = Path::new("/srv/records");
        assert_eq!(absolutize_sqlite_dsn("sqlite::memory:", base, false).unwrap(), MEMORY_DSN);
        assert_eq!(absolutize_sqlite_dsn("sqlite://:memory:", base, false).unwrap(), MEMORY_DSN);
    }

    #[test]
    fn relative_sqlite_path_is_joined_onto_home() {
        let tmp = tempfile::tempdir().unwrap();
        let dsn = absolutize_sqlite_dsn("sqlite://database/records.db?mode=rwc", tmp.path(), true)
            .unwrap();

        let expected = tmp.path().join("database/records.db");
        assert_eq!(
            dsn,
            format!("sqlite://{}?mode=rwc", expected.to_string_lossy().replace('\\', "/"))
        );
        assert!(tmp.path().join("database").is_dir());
    }

    #[test]
    fn non_sqlite_urls_are_rejected() {
        let cfg = DatabaseConfig {
            url: "postgres://localhost/records".into(),
            max_conns: None,
            busy_timeout_ms: None,
        };
        assert!(resolve_dsn(&cfg, Path::new("/tmp"), false).is_err());
        assert_eq!(resolve_dsn(&cfg, Path::new("/tmp"), true).unwrap(), MEMORY_DSN);
    }

    #[test]
    fn query_args_build_a_student_query() {
        let args = QueryArgs {
            faculty: Some("Physics".into()),
            status: Some(StudentStatus::Graduated),
            sort: Some("full_name,-created_at".into()),
            ..Default::default()
        };
        let query = args.into_query().unwrap().page(2, 25);

        assert_eq!(query.faculty.as_deref(), Some("Physics"));
        assert_eq!(query.status, Some(StudentStatus::Graduated));
        assert_eq!(query.order.len(), 2);
        assert_eq!((query.skip, query.take), (25, Some(25)));
    }

    #[test]
    fn unknown_sort_field_is_an_error() {
        let args = QueryArgs {
            sort: Some("shoe_size".into()),
            ..Default::default()
        };
        assert!(args.into_query().is_err());
    }

    #[test]
    fn empty_sqlite_path_is_rejected() {
        assert!(absolutize_sqlite_dsn("sqlite://", Path::new("/tmp"), false).is_err());
    }
}
