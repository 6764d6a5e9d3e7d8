//! Persistent configuration

mod settings;

pub use settings::{PermissionSettings, Settings, LOCAL_SETTINGS_FILE, PROJECT_DIR};
