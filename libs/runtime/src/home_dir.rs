use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Resolve the application home directory.
///
/// - `None` → `<platform home>/<default_subdir>`
/// - `~` or `~/x` → expanded against the platform home
/// - relative paths → joined onto the current directory
///
/// With `create`, the directory is created if missing.
pub fn resolve_home_dir(
    configured: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf> {
    let path = match configured {
        None => platform_home()?.join(default_subdir),
        Some(raw) => expand(&raw)?,
    };

    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("cannot read current directory")?
            .join(path)
    };

    if create {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("cannot create home dir {}", path.display()))?;
    }
    Ok(path)
}

fn expand(raw: &str) -> Result<PathBuf> {
    if raw == "~" {
        return platform_home();
    }
    if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        return Ok(platform_home()?.join(rest));
    }
    if raw.starts_with('~') {
        bail!("unsupported home_dir form '{raw}' (only '~' and '~/...' are expanded)");
    }
    Ok(Path::new(raw).to_path_buf())
}

/// `%APPDATA%` on Windows, `$HOME` elsewhere.
fn platform_home() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = dirs::config_dir();
    #[cfg(not(target_os = "windows"))]
    let home = dirs::home_dir();
    home.context("cannot determine the user's home directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_absolute_path_is_created() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("nested/home");

        let resolved = resolve_home_dir(Some(target.to_string_lossy().into()), ".records", true).unwrap();

        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }

    #[test]
    fn tilde_is_expanded() {
        let resolved = resolve_home_dir(Some("~/.records_test".into()), ".records", false).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with(".records_test"));
    }

    #[test]
    fn user_specific_tilde_is_rejected() {
        assert!(resolve_home_dir(Some("~alice/x".into()), ".records", false).is_err());
    }

    #[test]
    fn relative_path_is_made_absolute() {
        let resolved = resolve_home_dir(Some("data/home".into()), ".records", false).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("data/home"));
    }
}
