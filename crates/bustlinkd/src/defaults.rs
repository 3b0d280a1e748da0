use camino::{Utf8Path, Utf8PathBuf};
use dirs::home_dir;

pub const DEFAULT_BUSTLINK_HOME: &str = ".bustlink";

pub fn default_node_dir() -> Utf8PathBuf {
    if let Some(home) = home_dir() {
        if let Some(home) = Utf8Path::from_path(&home) {
            return home.join(DEFAULT_BUSTLINK_HOME);
        }
    }

    Utf8PathBuf::default()
}
