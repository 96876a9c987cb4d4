use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Result, VaultError};

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".partial-{}", std::process::id()));
    path.with_file_name(name)
}

pub async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| VaultError::io(parent, e))?;
    }
    Ok(())
}

/// Write through a staging sibling and rename it over `path`, so readers never see a
/// partially written file.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    ensure_parent(path).await?;
    let staging = staging_path(path);
    fs::write(&staging, contents)
        .await
        .map_err(|e| VaultError::io(&staging, e))?;
    if let Err(e) = fs::rename(&staging, path).await {
        let _ = fs::remove_file(&staging).await;
        return Err(VaultError::io(path, e));
    }
    Ok(())
}

/// Move `src` to `dst`. Falls back to copy-then-rename when a plain rename is not
/// possible (e.g. across filesystems); `dst` is only ever visible complete.
pub async fn relocate(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent(dst).await?;
    if fs::rename(src, dst).await.is_ok() {
        return Ok(());
    }
    copy_then_replace(src, dst).await
}

async fn copy_then_replace(src: &Path, dst: &Path) -> Result<()> {
    let staging = staging_path(dst);
    fs::copy(src, &staging)
        .await
        .map_err(|e| VaultError::io(src, e))?;
    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(VaultError::io(dst, e));
    }
    settle_source_removal(src, dst, fs::remove_file(src).await).await
}

/// A document must end up at exactly one path: if the source cannot be removed,
/// the fresh copy is withdrawn and the move fails.
async fn settle_source_removal(
    src: &Path,
    dst: &Path,
    removed: std::io::Result<()>,
) -> Result<()> {
    match removed {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(dst).await;
            Err(VaultError::io(src, e))
        }
    }
}

pub async fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent(dst).await?;
    fs::copy(src, dst)
        .await
        .map(|_| ())
        .map_err(|e| VaultError::io(src, e))
}

/// `note.md` + `.backup` -> `note.md.backup`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/note.md");
        write_atomic(&path, "hello").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("a/b")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_relocate() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("note.md");
        let dst = dir.path().join("folder/note.md");
        std::fs::write(&src, "content").unwrap();

        relocate(&src, &dst).await.unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "content");
    }

    #[tokio::test]
    async fn test_copy_fallback_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("note.md");
        let dst = dir.path().join("note-moved.md");
        std::fs::write(&src, "content").unwrap();

        copy_then_replace(&src, &dst).await.unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "content");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_source_removal_withdraws_copy() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("note.md");
        let dst = dir.path().join("folder/note.md");
        std::fs::write(&src, "content").unwrap();
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, "content").unwrap();

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let result = settle_source_removal(&src, &dst, Err(denied)).await;

        assert!(matches!(result, Err(VaultError::Io { .. })));
        assert!(src.exists());
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn test_relocate_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = relocate(&dir.path().join("missing.md"), &dir.path().join("x/missing.md")).await;
        assert!(matches!(result, Err(VaultError::Io { .. })));
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix(Path::new("dir/note.md"), ".backup"),
            PathBuf::from("dir/note.md.backup")
        );
    }
}
