use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// JSON run reports laid out as `<root>/<run_id>/<job>.json`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn report_relative_path(&self, run_id: Uuid, job: &str) -> PathBuf {
        let job = job.trim();
        let job = if job.is_empty() { "report" } else { job };
        PathBuf::from(run_id.to_string()).join(format!("{job}.json"))
    }

    /// Serialize `value` and write it via temp file + rename so a reader
    /// never sees a half-written report.
    pub async fn write_json<T: Serialize>(
        &self,
        run_id: Uuid,
        job: &str,
        value: &T,
    ) -> anyhow::Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing {job} report"))?;
        let absolute_path = self.root.join(self.report_relative_path(run_id, job));
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating report directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp report file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp report file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp report file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp report {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }
        Ok(absolute_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reports_land_under_run_directory_without_temp_leftovers() {
        let dir = tempdir().expect("tempdir");
        let store = ReportStore::new(dir.path());
        let run_id = Uuid::new_v4();

        let path = store
            .write_json(run_id, "merge-duplicates", &json!({"merged": 2}))
            .await
            .expect("write");

        assert_eq!(path, dir.path().join(run_id.to_string()).join("merge-duplicates.json"));
        let text = std::fs::read_to_string(&path).expect("read back");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["merged"], 2);

        let leftovers = std::fs::read_dir(path.parent().expect("parent"))
            .expect("list")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn rewriting_a_report_replaces_it() {
        let dir = tempdir().expect("tempdir");
        let store = ReportStore::new(dir.path());
        let run_id = Uuid::new_v4();
        store.write_json(run_id, "verify", &json!({"v": 1})).await.expect("first");
        let path = store.write_json(run_id, "verify", &json!({"v": 2})).await.expect("second");
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json");
        assert_eq!(value["v"], 2);
    }
}
