//! Where onboarding profiles and selected keywords come from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use seoflow_common::{Profile, string_list};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::orchestrator::subject_key;

/// Source of the onboarding data a run starts from.
///
/// `Ok(None)` means the subject has no record; errors are reserved for
/// records that exist but cannot be read.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn load_profile(&self, subject_id: &str) -> Result<Option<Profile>>;

    async fn load_selected_keywords(&self, subject_id: &str) -> Result<Option<Vec<String>>>;
}

/// Reads `<root>/<subject>/profile.json` and `<root>/<subject>/keywords_selected.json`,
/// with `<subject>` encoded by [`subject_key`].
///
/// When `keywords_selected.json` is absent, the profile's own
/// `keywords_selected` and `custom_keywords` lists are used instead.
#[derive(Debug, Clone)]
pub struct FileProfileSource {
    root: PathBuf,
}

impl FileProfileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subject_dir(&self, subject_id: &str) -> PathBuf {
        self.root.join(subject_key(subject_id))
    }

    pub async fn save_profile(&self, subject_id: &str, profile: &Profile) -> Result<()> {
        self.write_json(subject_id, "profile.json", profile).await
    }

    pub async fn save_selected_keywords(&self, subject_id: &str, keywords: &[String]) -> Result<()> {
        self.write_json(subject_id, "keywords_selected.json", &keywords)
            .await
    }

    async fn write_json<T: serde::Serialize + ?Sized>(
        &self,
        subject_id: &str,
        name: &str,
        value: &T,
    ) -> Result<()> {
        let dir = self.subject_dir(subject_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create profile dir {}", dir.display()))?;
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(value).context("Failed to serialize profile data")?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn read_json(&self, subject_id: &str, name: &str) -> Result<Option<serde_json::Value>> {
        let path = self.subject_dir(subject_id).join(name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }
}

#[async_trait]
impl ProfileSource for FileProfileSource {
    async fn load_profile(&self, subject_id: &str) -> Result<Option<Profile>> {
        match self.read_json(subject_id, "profile.json").await? {
            Some(serde_json::Value::Object(map)) => Ok(Some(map.into_iter().collect())),
            Some(_) => anyhow::bail!("profile.json for {} is not a JSON object", subject_id),
            None => Ok(None),
        }
    }

    async fn load_selected_keywords(&self, subject_id: &str) -> Result<Option<Vec<String>>> {
        if let Some(value) = self.read_json(subject_id, "keywords_selected.json").await? {
            let keywords = string_list(&value).with_context(|| {
                format!("keywords_selected.json for {} is not a list of strings", subject_id)
            })?;
            return Ok(Some(keywords));
        }

        let Some(profile) = self.load_profile(subject_id).await? else {
            return Ok(None);
        };
        let mut keywords: Vec<String> = Vec::new();
        for field in ["keywords_selected", "custom_keywords"] {
            for kw in profile.get(field).and_then(string_list).unwrap_or_default() {
                if !keywords.contains(&kw) {
                    keywords.push(kw);
                }
            }
        }
        Ok((!keywords.is_empty()).then_some(keywords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn profile() -> Profile {
        let mut p = Profile::new();
        p.insert("business_name".into(), json!("Acme Plumbing"));
        p.insert("website_url".into(), json!("https://acme.example"));
        p
    }

    #[tokio::test]
    async fn test_missing_subject_is_none() {
        let dir = TempDir::new().unwrap();
        let source = FileProfileSource::new(dir.path());
        assert!(source.load_profile("nobody").await.unwrap().is_none());
        assert!(source.load_selected_keywords("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_saved_profile_and_keywords_load_back() {
        let dir = TempDir::new().unwrap();
        let source = FileProfileSource::new(dir.path());
        source.save_profile("u1", &profile()).await.unwrap();
        source
            .save_selected_keywords("u1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(source.load_profile("u1").await.unwrap(), Some(profile()));
        assert_eq!(
            source.load_selected_keywords("u1").await.unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_keywords_fall_back_to_profile_lists() {
        let dir = TempDir::new().unwrap();
        let source = FileProfileSource::new(dir.path());
        let mut p = profile();
        p.insert("keywords_selected".into(), json!(["a", "b"]));
        p.insert("custom_keywords".into(), json!(["b", "c"]));
        source.save_profile("u1", &p).await.unwrap();

        assert_eq!(
            source.load_selected_keywords("u1").await.unwrap(),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[tokio::test]
    async fn test_malformed_profile_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = FileProfileSource::new(dir.path());
        std::fs::create_dir_all(dir.path().join("u1")).unwrap();
        std::fs::write(dir.path().join("u1/profile.json"), "[1, 2]").unwrap();
        assert!(source.load_profile("u1").await.is_err());
    }

    #[tokio::test]
    async fn test_subject_cannot_escape_the_profile_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("profiles");
        std::fs::create_dir_all(dir.path().join("other")).unwrap();
        std::fs::write(
            dir.path().join("other/profile.json"),
            json!({"business_name": "Someone Else"}).to_string(),
        )
        .unwrap();

        let source = FileProfileSource::new(&root);
        assert!(source.load_profile("../other").await.unwrap().is_none());
        assert!(source.subject_dir("../other").starts_with(&root));
        assert_eq!(source.subject_dir("..").parent(), Some(root.as_path()));

        source.save_profile("../other", &profile()).await.unwrap();
        assert_eq!(source.load_profile("../other").await.unwrap(), Some(profile()));
        let untouched = std::fs::read_to_string(dir.path().join("other/profile.json")).unwrap();
        assert!(untouched.contains("Someone Else"));
    }
}
