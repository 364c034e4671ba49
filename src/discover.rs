//! Local file source for the CLI: walks a directory and yields a lazy stream of
//! [`FileRecord`]s, reading each file only when the stream is polled for it.

use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info};

use crate::contract::FileRecord;

/// Relative paths of every regular file below `root`, sorted.
///
/// Directories whose name is listed in `exclude` are skipped entirely.
pub fn walk(root: &Path, exclude: &[String]) -> io::Result<Vec<PathBuf>> {
    fn visit_dir(
        dir: &Path,
        root: &Path,
        exclude: &[String],
        results: &mut Vec<PathBuf>,
    ) -> io::Result<()> {
        for entry_res in std::fs::read_dir(dir)? {
            let entry = entry_res?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                let name = entry.file_name();
                if exclude.iter().any(|ex| name.to_str() == Some(ex.as_str())) {
                    debug!(path = %path.display(), "Skipping excluded directory");
                    continue;
                }
                visit_dir(&path, root, exclude, results)?;
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(root) {
                    results.push(relative.to_path_buf());
                }
            }
        }
        Ok(())
    }

    let mut results = Vec::new();
    visit_dir(root, root, exclude, &mut results)?;
    results.sort();
    info!(root = %root.display(), count = results.len(), "Discovered local files");
    Ok(results)
}

/// Stream of buffered file records below `root`.
///
/// A listing failure surfaces as the single item of the stream; a read failure ends
/// the stream at that file.
pub fn file_stream(
    root: PathBuf,
    exclude: Vec<String>,
) -> impl Stream<Item = io::Result<FileRecord>> {
    match walk(&root, &exclude) {
        Ok(paths) => stream::iter(paths)
            .then(move |relative| {
                let absolute = root.join(&relative);
                async move {
                    let bytes = tokio::fs::read(&absolute).await?;
                    Ok::<_, io::Error>(FileRecord::buffered(relative, bytes))
                }
            })
            .left_stream(),
        Err(e) => stream::once(async move { Err::<FileRecord, io::Error>(e) }).right_stream(),
    }
}
