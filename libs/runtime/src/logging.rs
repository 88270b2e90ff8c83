use crate::config::{LoggingConfig, Section};
use parking_lot::Mutex;
use std::{
    io::{IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{filter::Targets, fmt};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

const DEFAULT_SECTION: &str = "default";

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s).map_or(LevelFilter::OFF, LevelFilter::from_level)
}

/// target == prefix, or target starts with "prefix::"
fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// -------- rotating file sink --------

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct RotWriterHandle(Option<SharedRotate>);

impl Write for RotWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(w) => w.lock().write(buf),
            // no sink for this target; drop the record
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(w) => w.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Routes file records by target prefix, falling back to the default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<SharedRotate>,
    by_prefix: Vec<(String, SharedRotate)>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<SharedRotate> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| matches_target_prefix(target, prefix))
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RotWriterHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RotWriterHandle(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RotWriterHandle(self.resolve_for(meta.target()))
    }
}

/// Relative paths are joined with `base_dir` (the server home directory).
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn open_rotating_file(log_path: &Path, section: &Section) -> std::io::Result<SharedRotate> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let max_bytes = section.max_size_mb.unwrap_or(100) * 1024 * 1024;
    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(FileLimit::MaxFiles(section.max_backups.unwrap_or(3))),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(Arc::new(Mutex::new(rot)))
}

fn open_section_file(name: &str, section: &Section, base_dir: &Path) -> Option<SharedRotate> {
    if section.file.trim().is_empty() {
        return None;
    }
    let log_path = resolve_log_path(&section.file, base_dir);
    match open_rotating_file(&log_path, section) {
        Ok(w) => Some(w),
        Err(e) => {
            // the subscriber is not installed yet
            eprintln!(
                "Failed to open log file for '{name}': {} ({e})",
                log_path.display()
            );
            None
        }
    }
}

// -------- filters --------

fn prefix_sections(cfg: &LoggingConfig) -> impl Iterator<Item = (&String, &Section)> {
    cfg.iter().filter(|(k, _)| k.as_str() != DEFAULT_SECTION)
}

fn build_console_targets(cfg: &LoggingConfig) -> Targets {
    let default = cfg
        .get(DEFAULT_SECTION)
        .map_or(LevelFilter::INFO, |s| level_filter(&s.console_level));

    prefix_sections(cfg).fold(Targets::new().with_default(default), |t, (name, s)| {
        t.with_target(name.clone(), level_filter(&s.console_level))
    })
}

fn build_file_targets(cfg: &LoggingConfig, router: &FileRouter) -> Targets {
    let default = match (cfg.get(DEFAULT_SECTION), router.default.is_some()) {
        (Some(s), true) => level_filter(&s.file_level),
        _ => LevelFilter::OFF,
    };

    prefix_sections(cfg)
        .filter(|(_, s)| !s.file.trim().is_empty())
        .fold(Targets::new().with_default(default), |t, (name, s)| {
            t.with_target(name.clone(), level_filter(&s.file_level))
        })
}

fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    FileRouter {
        default: cfg
            .get(DEFAULT_SECTION)
            .and_then(|s| open_section_file(DEFAULT_SECTION, s, base_dir)),
        by_prefix: prefix_sections(cfg)
            .filter_map(|(name, s)| open_section_file(name, s, base_dir).map(|w| (name.clone(), w)))
            .collect(),
    }
}

// -------- public init --------

/// Install the global subscriber: a human-readable stderr layer and, when
/// any section names a file, a JSON layer writing to rotating files.
///
/// Relative file paths are resolved against `base_dir`. Calling this twice
/// is harmless; the second install is ignored.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, prelude::*, Registry};

    // Bridge `log` → `tracing` before installing the subscriber
    let _ = tracing_log::LogTracer::init();

    // stdout carries command output (CSV, JSON reports)
    let ansi = std::io::stderr().is_terminal();
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(build_console_targets(cfg));

    let router = build_file_router(cfg, base_dir);
    if router.is_empty() {
        let _ = Registry::default().with(console_layer).try_init();
        return;
    }

    let file_targets = build_file_targets(cfg, &router);
    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(router)
        .with_filter(file_targets);

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn level_parsing_is_lenient() {
        assert_eq!(parse_tracing_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_tracing_level(" warn "), Some(Level::WARN));
        assert_eq!(parse_tracing_level("off"), None);
        assert_eq!(parse_tracing_level("bogus"), Some(Level::INFO));
    }

    #[test]
    fn prefix_matching_respects_module_boundaries() {
        assert!(matches_target_prefix("student_records", "student_records"));
        assert!(matches_target_prefix(
            "student_records::domain::purge",
            "student_records"
        ));
        assert!(!matches_target_prefix("student_records_extra", "student_records"));
        assert!(!matches_target_prefix("sea_orm", "student_records"));
    }

    #[test]
    fn console_targets_use_default_and_per_prefix_levels() {
        let mut cfg = default_logging_config();
        cfg.insert("sqlx".into(), section("off", "", ""));
        cfg.insert("student_records".into(), section("debug", "", ""));

        let targets = build_console_targets(&cfg);

        assert!(targets.would_enable("student_records::domain", &Level::DEBUG));
        assert!(!targets.would_enable("sqlx::query", &Level::ERROR));
        assert!(targets.would_enable("records_server", &Level::INFO));
        assert!(!targets.would_enable("records_server", &Level::DEBUG));
    }

    #[test]
    fn router_sends_prefixed_targets_to_their_own_file() {
        let tmp = tempdir().unwrap();
        let mut cfg = default_logging_config();
        cfg.insert(
            "student_records".into(),
            section("info", "logs/students.log", "debug"),
        );

        let router = build_file_router(&cfg, tmp.path());

        assert!(router.default.is_some());
        assert_eq!(router.by_prefix.len(), 1);
        let routed = router.resolve_for("student_records::domain").unwrap();
        assert!(Arc::ptr_eq(&routed, &router.by_prefix[0].1));
        let fallback = router.resolve_for("records_server").unwrap();
        assert!(Arc::ptr_eq(&fallback, router.default.as_ref().unwrap()));
        assert!(tmp.path().join("logs").is_dir());
    }

    #[test]
    fn empty_file_disables_the_file_sink() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert(DEFAULT_SECTION.into(), section("info", "", "debug"));

        let router = build_file_router(&cfg, tmp.path());

        assert!(router.is_empty());
        let targets = build_file_targets(&cfg, &router);
        assert!(!targets.would_enable("records_server", &Level::ERROR));
    }

    #[test]
    fn relative_log_paths_resolve_under_home_dir() {
        let tmp = tempdir().unwrap();
        let resolved = resolve_log_path("logs/records.log", tmp.path());
        assert!(resolved.starts_with(tmp.path()));
        assert!(resolved.ends_with("logs/records.log"));

        let absolute = tmp.path().join("elsewhere.log");
        let kept = resolve_log_path(&absolute.to_string_lossy(), Path::new("/ignored"));
        assert_eq!(kept, absolute);
    }
}
