//! Where nback keeps its score database and its config file.

use directories::ProjectDirs;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

const APP_NAME: &str = "nback";
const DB_FILE: &str = "scores.db";
const CONFIG_FILE: &str = "config.json";

pub struct AppDirs;

impl AppDirs {
    /// Score database under the XDG state dir, `~/.local/state` without one,
    /// or the platform data dir when there is no home either.
    pub fn db_path() -> Option<PathBuf> {
        state_dir(env::var_os("XDG_STATE_HOME"), env::var_os("HOME"))
            .or_else(|| project_dirs().map(|dirs| dirs.data_local_dir().to_path_buf()))
            .map(|dir| dir.join(DB_FILE))
    }

    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

fn state_dir(xdg_state: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = match xdg_state.filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(home?).join(".local").join("state"),
    };
    Some(base.join(APP_NAME))
}
