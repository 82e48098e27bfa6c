//! Archive tree materialization: root preparation and atomic writes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

/// Create the archive root and prove it is writable.
pub(crate) async fn prepare_root(root: &Path) -> PipelineResult<()> {
    fs::create_dir_all(root)
        .await
        .map_err(|source| PipelineError::io("archive.create_root", root, source))?;
    let probe = root.join(format!(".sitevault-probe-{}", Uuid::new_v4().simple()));
    fs::write(&probe, b"")
        .await
        .map_err(|source| PipelineError::io("archive.probe_root", &probe, source))?;
    fs::remove_file(&probe)
        .await
        .map_err(|source| PipelineError::io("archive.probe_cleanup", &probe, source))
}

/// Write `bytes` to `root/relative` through a sibling temp file and a rename.
///
/// Readers never observe a partially written file.
pub(crate) async fn write_atomic(
    root: &Path,
    relative: &Path,
    bytes: &[u8],
) -> PipelineResult<PathBuf> {
    let target = root.join(relative);
    let parent = target.parent().unwrap_or(root).to_path_buf();
    fs::create_dir_all(&parent)
        .await
        .map_err(|source| PipelineError::io("archive.create_dir", &parent, source))?;

    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
    if let Err(source) = fs::write(&temp, bytes).await {
        let _ = fs::remove_file(&temp).await;
        return Err(PipelineError::io("archive.write_temp", &temp, source));
    }
    if let Err(source) = fs::rename(&temp, &target).await {
        let _ = fs::remove_file(&temp).await;
        return Err(PipelineError::io("archive.rename", &target, source));
    }
    Ok(target)
}

/// Copy an archive file to another archive-relative path.
pub(crate) async fn copy_within(root: &Path, from: &Path, to: &Path) -> PipelineResult<()> {
    let source_path = root.join(from);
    let bytes = fs::read(&source_path)
        .await
        .map_err(|source| PipelineError::io("archive.read_alias_source", &source_path, source))?;
    write_atomic(root, to, &bytes).await.map(|_| ())
}

/// Serialize `value` as pretty JSON at `root/name`.
pub(crate) async fn write_json<T: Serialize + ?Sized>(
    root: &Path,
    name: &str,
    value: &T,
) -> PipelineResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|source| PipelineError::json("report.serialize", root.join(name), source))?;
    write_atomic(root, Path::new(name), &bytes).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_temp() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let written = write_atomic(root.path(), Path::new("css/a/site.css"), b"a{}").await?;
        assert_eq!(std::fs::read(&written)?, b"a{}");

        let leftovers: Vec<_> = std::fs::read_dir(root.path().join("css/a"))?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn overwrite_replaces_contents() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write_atomic(root.path(), Path::new("x.js"), b"var a;").await?;
        write_atomic(root.path(), Path::new("x.js"), b"let b;").await?;
        assert_eq!(std::fs::read(root.path().join("x.js"))?, b"let b;");
        Ok(())
    }

    #[tokio::test]
    async fn root_under_a_file_cannot_be_prepared() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file")?;
        let err = prepare_root(&blocker.join("site"))
            .await
            .expect_err("parent is a file");
        assert!(err.cause().contains("archive.create_root"));
        Ok(())
    }

    #[tokio::test]
    async fn copies_stay_inside_the_root() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write_atomic(root.path(), Path::new("assets/images/a.png"), b"png").await?;
        copy_within(
            root.path(),
            Path::new("assets/images/a.png"),
            Path::new("img/copy.png"),
        )
        .await?;
        assert_eq!(std::fs::read(root.path().join("img/copy.png"))?, b"png");
        Ok(())
    }
}
