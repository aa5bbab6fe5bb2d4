//! Recipe batch files: one JSON list of recipes per index title.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use recipeforge_shared::{Recipe, RecipeForgeError, Result};

/// File extension for recipe batches.
const BATCH_EXTENSION: &str = "json";

/// Read/write access to persisted recipe batches.
#[async_trait]
pub trait BatchFiles: Send + Sync {
    /// Names of every persisted batch.
    async fn list(&self) -> Result<Vec<String>>;

    /// Recipes in the named batch; empty if the batch does not exist.
    async fn read(&self, name: &str) -> Result<Vec<Recipe>>;

    /// Replace the named batch.
    async fn write(&self, name: &str, recipes: &[Recipe]) -> Result<()>;
}

/// File-system safe batch name for an index title.
pub fn batch_file_name(index_title: &str) -> String {
    let slug = index_title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// [`BatchFiles`] backed by a directory of `<slug>.json` files.
#[derive(Debug, Clone)]
pub struct JsonBatchFiles {
    dir: PathBuf,
}

impl JsonBatchFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{BATCH_EXTENSION}", batch_file_name(name)))
    }
}

#[async_trait]
impl BatchFiles for JsonBatchFiles {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = ?self.dir, "recipe directory does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(RecipeForgeError::io(&self.dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RecipeForgeError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BATCH_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, name: &str) -> Result<Vec<Recipe>> {
        let path = self.path_for(name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RecipeForgeError::io(&path, e)),
        };

        serde_json::from_str(&content).map_err(|e| {
            RecipeForgeError::Storage(format!("failed to parse {}: {e}", path.display()))
        })
    }

    async fn write(&self, name: &str, recipes: &[Recipe]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RecipeForgeError::io(&self.dir, e))?;

        let path = self.path_for(name);
        let json = serde_json::to_string_pretty(recipes)
            .map_err(|e| RecipeForgeError::Storage(format!("failed to serialize batch: {e}")))?;

        // Write beside the target and rename so readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RecipeForgeError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RecipeForgeError::io(&path, e))?;

        debug!(path = ?path, count = recipes.len(), "recipe batch written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rf-{label}-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn batch_file_name_slugifies() {
        assert_eq!(batch_file_name("Chicken Tikka Masala"), "chicken-tikka-masala");
        assert_eq!(batch_file_name("  mac & cheese!! "), "mac-cheese");
        assert_eq!(batch_file_name("???"), "untitled");
        assert_eq!(batch_file_name("mac-cheese"), "mac-cheese");
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let files = JsonBatchFiles::new(temp_dir("missing"));
        assert!(files.list().await.unwrap().is_empty());
        assert!(files.read("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_then_list_and_read() {
        let dir = temp_dir("batches");
        let files = JsonBatchFiles::new(&dir);
        let recipe = Recipe {
            id: "r1".into(),
            title: "Pho".into(),
            index_title: Some("Beef Pho".into()),
            ..Default::default()
        };

        files.write("Beef Pho", &[recipe.clone()]).await.unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        assert_eq!(files.list().await.unwrap(), vec!["beef-pho".to_string()]);
        let loaded = files.read("beef pho").await.unwrap();
        assert_eq!(loaded, vec![recipe]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn corrupt_batch_is_a_storage_error() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.json"), "{not json").unwrap();

        let files = JsonBatchFiles::new(&dir);
        let err = files.read("bad").await.unwrap_err();
        assert!(matches!(err, RecipeForgeError::Storage(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
