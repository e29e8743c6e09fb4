use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage and uploads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the collection files.
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Upload root. Attachment references never resolve outside it.
    #[serde(default = "d_uploads_dir")]
    pub dir: PathBuf,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: d_uploads_dir(),
        }
    }
}

fn d_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn d_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_relative_to_cwd() {
        assert_eq!(StorageConfig::default().data_dir, PathBuf::from("./data"));
        assert_eq!(UploadsConfig::default().dir, PathBuf::from("./uploads"));
    }

    #[test]
    fn dir_overrides_parse() {
        let cfg: UploadsConfig = toml::from_str(r#"dir = "/srv/uploads""#).unwrap();
        assert_eq!(cfg.dir, PathBuf::from("/srv/uploads"));
    }
}
