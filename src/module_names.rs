use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;
use uuid::Uuid;

use crate::error::ModuleNameError;

const MODULE_NAMES_FILE_NAME: &str = "module-names.tsv";

const BUILT_IN_NAMES: [(Uuid, &str); 5] = [
    (
        Uuid::from_u128(0x7d0a7103_7699_494e_b638_deadbeef0000),
        "Blade LED",
    ),
    (
        Uuid::from_u128(0x7d0a309f_7699_494e_b638_deadbeef0000),
        "Mixer Service",
    ),
    (
        Uuid::from_u128(0x7d0a00b1_7699_494e_b638_deadbeef0000),
        "I2C On/Off LED Button",
    ),
    (
        Uuid::from_u128(0x7d0a00b2_7699_494e_b638_deadbeef0000),
        "Raw On/Off LED Button",
    ),
    (
        Uuid::from_u128(0xadaf0001_4369_7263_7569_74507974686e),
        "Adafruit Information Service",
    ),
];

/// Service UUID to display-name lookup used when classifying modules.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ModuleNameTable {
    names: HashMap<Uuid, String>,
}

impl ModuleNameTable {
    /// Returns the table of well-known saber service names.
    #[must_use]
    pub fn built_in() -> Self {
        Self {
            names: BUILT_IN_NAMES
                .iter()
                .map(|(uuid, name)| (*uuid, (*name).to_string()))
                .collect(),
        }
    }

    /// Adds or replaces one entry.
    #[must_use]
    pub fn with_name(mut self, uuid: Uuid, name: impl Into<String>) -> Self {
        self.names.insert(uuid, name.into());
        self
    }

    /// Loads the built-in table merged with an overrides file.
    ///
    /// Uses the per-user config directory when `path` is `None`. A missing file
    /// leaves the built-in table untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ModuleNameError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_names_path);
        Self::load_from_path(&path)
    }

    pub(crate) fn load_from_path(path: &Path) -> Result<Self, ModuleNameError> {
        let mut table = Self::built_in();
        if !path.exists() {
            debug!(path = %path.display(), "no module-name overrides file");
            return Ok(table);
        }

        let raw = fs::read_to_string(path).map_err(|source| ModuleNameError::Io { source })?;
        let overrides = parse_entries(&raw)?;
        debug!(
            path = %path.display(),
            override_count = overrides.len(),
            "loaded module-name overrides"
        );
        table.names.extend(overrides);
        Ok(table)
    }

    /// Returns the display name registered for a service UUID.
    #[must_use]
    pub fn name_for(&self, uuid: &Uuid) -> Option<&str> {
        self.names.get(uuid).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ModuleNameTable {
    fn default() -> Self {
        Self::built_in()
    }
}

fn parse_entries(contents: &str) -> Result<HashMap<Uuid, String>, ModuleNameError> {
    let mut entries = HashMap::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split('\t');
        let (Some(raw_uuid), Some(name), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ModuleNameError::InvalidRecord {
                record: line.to_string(),
            });
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(ModuleNameError::InvalidRecord {
                record: line.to_string(),
            });
        }

        let uuid =
            Uuid::parse_str(raw_uuid.trim()).map_err(|source| ModuleNameError::InvalidUuid {
                record: line.to_string(),
                source,
            })?;
        entries.insert(uuid, name.to_string());
    }

    Ok(entries)
}

fn default_names_path() -> PathBuf {
    let Some(project_dirs) = ProjectDirs::from("com.github", "proegssilb", "saber-builder") else {
        return std::env::temp_dir()
            .join("saber-builder")
            .join(MODULE_NAMES_FILE_NAME);
    };

    project_dirs.config_dir().join(MODULE_NAMES_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn unique_temp_path(file_name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("saber-builder-{file_name}-{suffix}.tsv"))
    }

    fn remove_if_exists(path: &Path) {
        if path.exists() {
            fs::remove_file(path).expect("temporary fixture file should be removable");
        }
    }

    #[test]
    fn built_in_table_names_blade_led() {
        let table = ModuleNameTable::built_in();
        let uuid = Uuid::parse_str("7d0a7103-7699-494e-b638-deadbeef0000")
            .expect("fixture uuid should parse");

        assert_eq!(Some("Blade LED"), table.name_for(&uuid));
        assert_eq!(5, table.len());
    }

    #[test]
    fn missing_file_keeps_built_in_names() {
        let path = unique_temp_path("module-names-missing");
        remove_if_exists(&path);

        let table = ModuleNameTable::load_from_path(&path).expect("missing file should load");

        assert_eq!(ModuleNameTable::built_in(), table);
    }

    #[test]
    fn overrides_extend_and_replace_entries() {
        let path = unique_temp_path("module-names-overrides");
        fs::write(
            &path,
            "# saber overrides\n\
             7d0a7103-7699-494e-b638-deadbeef0000\tMain Blade\n\
             7d0a4242-7699-494e-b638-deadbeef0000\tSound Board\n",
        )
        .expect("override fixture should write");

        let table = ModuleNameTable::load_from_path(&path).expect("override file should load");
        remove_if_exists(&path);

        let blade = Uuid::from_u128(0x7d0a7103_7699_494e_b638_deadbeef0000);
        let sound = Uuid::from_u128(0x7d0a4242_7699_494e_b638_deadbeef0000);
        assert_eq!(Some("Main Blade"), table.name_for(&blade));
        assert_eq!(Some("Sound Board"), table.name_for(&sound));
        assert_eq!(6, table.len());
    }

    #[test]
    fn overrides_reject_malformed_records() {
        let path = unique_temp_path("module-names-invalid");
        fs::write(&path, "not-a-record\n").expect("invalid fixture should write");

        let loaded = ModuleNameTable::load_from_path(&path);
        remove_if_exists(&path);

        assert_matches!(loaded, Err(ModuleNameError::InvalidRecord { .. }));
    }

    #[test]
    fn overrides_reject_invalid_uuid() {
        let path = unique_temp_path("module-names-bad-uuid");
        fs::write(&path, "7d0a-nope\tBroken\n").expect("invalid fixture should write");

        let loaded = ModuleNameTable::load_from_path(&path);
        remove_if_exists(&path);

        assert_matches!(loaded, Err(ModuleNameError::InvalidUuid { .. }));
    }
}
