// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with.

use std::path::{Path, PathBuf};

/// Name of environment snapshot file.
pub const SNAPSHOT_FILE_NAME: &str = "environment.yml";

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/toolbelt/config.toml` as
/// the default absolute path for the configuration file. Does not check if
/// the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("toolbelt").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine path of environment snapshot file inside output directory.
pub fn snapshot_file(output_dir: impl AsRef<Path>) -> PathBuf {
    output_dir.as_ref().join(SNAPSHOT_FILE_NAME)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn default_config_file_follows_xdg() -> anyhow::Result<()> {
        assert_eq!(
            default_config_file()?,
            PathBuf::from("/home/blah/.config/toolbelt/config.toml")
        );

        Ok(())
    }

    #[test]
    fn snapshot_file_lives_in_output_dir() {
        assert_eq!(
            snapshot_file("/tmp/envs"),
            PathBuf::from("/tmp/envs/environment.yml")
        );
    }
}
