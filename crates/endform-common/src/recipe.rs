//! Recipe documents and their file-backed store.
//!
//! One JSON file per (side, name) pair, named `<side>_<sanitized>.json`.
//! An embedded program must pass [`Program::validate`] before it is saved.

use crate::error::{HmiError, HmiResult};
use crate::program::{check_name, Program, Side};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tube and tooling parameters for a recipe.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeParameters {
    /// Tube inner diameter.
    #[serde(rename = "tubeID")]
    pub tube_id: f64,
    /// Tube outer diameter.
    #[serde(rename = "tubeOD")]
    pub tube_od: f64,
    /// Finished size after forming.
    pub final_size: f64,
    /// Whether `final_size` is an ID or OD dimension.
    pub size_type: String,
    /// Tube length.
    pub tube_length: f64,
    /// ID finger radius.
    pub id_finger_radius: f64,
    /// Forming depth.
    pub depth: f64,
    /// Recipe speed (%).
    pub recipe_speed: f64,
    /// Delay between steps (ms).
    pub step_delay: f64,
}

/// A persisted recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Tube parameters.
    #[serde(default)]
    pub parameters: RecipeParameters,
    /// Embedded program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<Program>,
}

/// Lowercase `name` and replace everything outside `[a-z0-9_-]` with `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Filename for a recipe.
#[must_use]
pub fn recipe_file_name(side: Side, name: &str) -> String {
    format!("{side}_{}.json", sanitize_name(name))
}

/// Directory-backed recipe store.
#[derive(Debug, Clone)]
pub struct RecipeStore {
    dir: PathBuf,
}

impl RecipeStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, side: Side, name: &str) -> PathBuf {
        self.dir.join(recipe_file_name(side, name))
    }

    /// Save (or overwrite) a recipe.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad name, an embedded program for
    /// the other side, or an embedded program that fails validation; a
    /// storage error if the file cannot be written.
    pub fn save(&self, side: Side, recipe: &Recipe) -> HmiResult<PathBuf> {
        check_name(&recipe.name).map_err(HmiError::Validation)?;

        if let Some(program) = &recipe.program {
            if program.side != side {
                return Err(HmiError::Validation(format!(
                    "program targets the {} side, recipe is saved for the {side} side",
                    program.side
                )));
            }
            let report = program.validate();
            if !report.valid {
                return Err(HmiError::Validation(report.errors.join("; ")));
            }
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            HmiError::Storage(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let path = self.path_for(side, &recipe.name);
        let json =
            serde_json::to_string_pretty(recipe).map_err(|e| HmiError::Storage(e.to_string()))?;
        fs::write(&path, json)
            .map_err(|e| HmiError::Storage(format!("cannot write {}: {e}", path.display())))?;

        info!(path = %path.display(), recipe = %recipe.name, %side, "Recipe saved");
        Ok(path)
    }

    /// Load a recipe by side and name.
    ///
    /// # Errors
    ///
    /// Returns [`HmiError::NotFound`] if no such recipe is stored, or a
    /// storage error if the file is unreadable or corrupt.
    pub fn load(&self, side: Side, name: &str) -> HmiResult<Recipe> {
        let path = self.path_for(side, name);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HmiError::NotFound(format!("recipe {name} ({side})")),
            _ => HmiError::Storage(format!("cannot read recipe {}: {e}", path.display())),
        })?;
        serde_json::from_str(&content)
            .map_err(|e| HmiError::Storage(format!("corrupt recipe {}: {e}", path.display())))
    }

    /// Names of all recipes saved for `side`, sorted.
    ///
    /// Unreadable files are skipped with a warning. A missing directory is
    /// an empty list.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the directory exists but cannot be listed.
    pub fn list(&self, side: Side) -> HmiResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{side}_");
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            HmiError::Storage(format!("cannot list {}: {e}", self.dir.display()))
        })?;

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.starts_with(&prefix)
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            match fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<Recipe>(&c).ok())
            {
                Some(recipe) => names.push(recipe.name),
                None => warn!(path = %path.display(), "Skipping unreadable recipe file"),
            }
        }
        names.sort();
        debug!(%side, count = names.len(), "Listed recipes");
        Ok(names)
    }

    /// Delete a recipe.
    ///
    /// # Errors
    ///
    /// Returns [`HmiError::NotFound`] if no such recipe is stored, or a
    /// storage error if the file cannot be removed.
    pub fn delete(&self, side: Side, name: &str) -> HmiResult<()> {
        let path = self.path_for(side, name);
        fs::remove_file(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => HmiError::NotFound(format!("recipe {name} ({side})")),
                _ => HmiError::Storage(format!("cannot delete {}: {e}", path.display())),
            })?;
        info!(path = %path.display(), "Recipe deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Positions, Step, STEP_COUNT};

    fn recipe(name: &str, side: Side) -> Recipe {
        let program = (1..=STEP_COUNT).fold(Program::new(name, side), |p, n| {
            p.with_step(Step::new(n, Positions::new(1.0, 2.0), 8))
        });
        Recipe {
            name: name.to_string(),
            description: "3/8 flare".to_string(),
            parameters: RecipeParameters {
                tube_id: 7.9,
                tube_od: 9.5,
                final_size: 12.0,
                size_type: "OD".to_string(),
                tube_length: 300.0,
                id_finger_radius: 1.5,
                depth: 8.0,
                recipe_speed: 80.0,
                step_delay: 250.0,
            },
            program: Some(program),
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Flare 3/8\""), "flare_3_8_");
        assert_eq!(recipe_file_name(Side::Right, "Bead-A_1"), "right_bead-a_1.json");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipeStore::new(dir.path().join("recipes"));
        let r = recipe("Flare 3/8", Side::Left);

        let path = store.save(Side::Left, &r).unwrap();
        assert!(path.ends_with("left_flare_3_8.json"));

        let back = store.load(Side::Left, "Flare 3/8").unwrap();
        assert_eq!(back, r);
        assert!(back.parameters.tube_od > 9.0);
    }

    #[test]
    fn test_parameters_use_panel_field_names() {
        let json = serde_json::to_value(recipe("Flare", Side::Left).parameters).unwrap();
        assert!(json.get("tubeID").is_some());
        assert!(json.get("tubeOD").is_some());
        assert!(json.get("idFingerRadius").is_some());
    }

    #[test]
    fn test_list_is_per_side() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipeStore::new(dir.path());
        store.save(Side::Left, &recipe("Zeta", Side::Left)).unwrap();
        store.save(Side::Left, &recipe("Alpha", Side::Left)).unwrap();
        store.save(Side::Right, &recipe("Right One", Side::Right)).unwrap();

        assert_eq!(store.list(Side::Left).unwrap(), vec!["Alpha", "Zeta"]);
        assert_eq!(store.list(Side::Right).unwrap(), vec!["Right One"]);
    }

    #[test]
    fn test_save_rejects_incomplete_program() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipeStore::new(dir.path());
        let mut r = recipe("Partial", Side::Left);
        if let Some(p) = r.program.as_mut() {
            p.steps.remove(&10);
        }
        let err = store.save(Side::Left, &r).unwrap_err();
        assert!(matches!(err, HmiError::Validation(msg) if msg.contains("step 10 is missing")));
    }

    #[test]
    fn test_save_rejects_wrong_side_program() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipeStore::new(dir.path());
        let err = store
            .save(Side::Right, &recipe("Lefty", Side::Left))
            .unwrap_err();
        assert!(matches!(err, HmiError::Validation(_)));
    }

    #[test]
    fn test_delete_and_missing_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipeStore::new(dir.path());
        store.save(Side::Left, &recipe("Gone", Side::Left)).unwrap();
        store.delete(Side::Left, "Gone").unwrap();
        assert!(matches!(
            store.load(Side::Left, "Gone"),
            Err(HmiError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(Side::Left, "Gone"),
            Err(HmiError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipeStore::new(dir.path());
        fs::write(dir.path().join("left_broken.json"), "{ not json").unwrap();
        assert!(matches!(
            store.load(Side::Left, "Broken"),
            Err(HmiError::Storage(msg)) if msg.contains("corrupt recipe")
        ));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let store = RecipeStore::new("/nonexistent/endform/recipes");
        assert!(store.list(Side::Left).unwrap().is_empty());
    }
}
