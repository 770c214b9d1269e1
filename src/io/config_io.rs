use std::fs;
use std::path::Path;

use crate::io::project_io::ProjectError;
use crate::model::config::Config;

/// Keys `tt config` may set, as `section.key`
pub const KNOWN_KEYS: &[&str] = &[
    "list.auto_sort",
    "list.max_tier",
    "drag.mode_sensitivity_px",
    "drag.tier_step_px",
];

/// Read the config, returning both the parsed config and the raw
/// toml_edit document for format-preserving edits.
pub fn read_config(project_dir: &Path) -> Result<(Config, toml_edit::DocumentMut), ProjectError> {
    let path = project_dir.join("config.toml");
    let text = fs::read_to_string(&path).map_err(|source| ProjectError::ReadError {
        path: path.clone(),
        source,
    })?;
    let config: Config = toml::from_str(&text)?;
    let doc: toml_edit::DocumentMut = text.parse()?;
    Ok((config, doc))
}

/// Write the document back, preserving comments and layout.
pub fn write_config(project_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), ProjectError> {
    let path = project_dir.join("config.toml");
    fs::write(&path, doc.to_string()).map_err(|source| ProjectError::ReadError { path, source })
}

/// Set `section.key` to `raw`, typed by the key. Returns the config the
/// edited document now describes.
pub fn set_key(doc: &mut toml_edit::DocumentMut, key: &str, raw: &str) -> Result<Config, ProjectError> {
    let Some((section, field)) = key.split_once('.').filter(|_| KNOWN_KEYS.contains(&key)) else {
        return Err(ProjectError::UnknownKey(key.to_string()));
    };
    let invalid = || ProjectError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    };
    let value = match key {
        "list.auto_sort" => toml_edit::value(raw.parse::<bool>().map_err(|_| invalid())?),
        "list.max_tier" => toml_edit::value(raw.parse::<u32>().map_err(|_| invalid())? as i64),
        _ => {
            let px = raw.parse::<f64>().map_err(|_| invalid())?;
            if !(px.is_finite() && px > 0.0) {
                return Err(invalid());
            }
            toml_edit::value(px)
        }
    };

    if !doc.contains_key(section) {
        doc[section] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc[section][field] = value;
    Ok(toml::from_str(&doc.to_string())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SAMPLE: &str = "# mine\n[list]\nauto_sort = true # keep\nmax_tier = 2\n";

    #[test]
    fn test_round_trip_preserves_text() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), SAMPLE).unwrap();
        let (config, doc) = read_config(tmp.path()).unwrap();
        assert!(config.list.auto_sort);
        write_config(tmp.path(), &doc).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("config.toml")).unwrap(), SAMPLE);
    }

    #[test]
    fn test_set_key_keeps_comments_and_types_values() {
        let mut doc: toml_edit::DocumentMut = SAMPLE.parse().unwrap();
        let config = set_key(&mut doc, "list.max_tier", "4").unwrap();
        assert_eq!(config.list.max_tier, 4);
        let config = set_key(&mut doc, "drag.tier_step_px", "32").unwrap();
        assert_eq!(config.drag.tier_step_px, 32.0);
        let text = doc.to_string();
        assert!(text.starts_with("# mine\n"));
        assert!(text.contains("max_tier = 4"));
        assert!(text.contains("[drag]"));
    }

    #[test]
    fn test_set_key_rejects_bad_input() {
        let mut doc: toml_edit::DocumentMut = SAMPLE.parse().unwrap();
        assert!(matches!(
            set_key(&mut doc, "list.colour", "red").unwrap_err(),
            ProjectError::UnknownKey(_)
        ));
        assert!(matches!(
            set_key(&mut doc, "list.auto_sort", "maybe").unwrap_err(),
            ProjectError::InvalidValue { .. }
        ));
        assert!(matches!(
            set_key(&mut doc, "drag.tier_step_px", "-3").unwrap_err(),
            ProjectError::InvalidValue { .. }
        ));
    }
}
