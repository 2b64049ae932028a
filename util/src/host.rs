//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable holding the root directory of the magnet software.
pub const SW_ROOT_ENV_VAR: &str = "MAGNET_SW_ROOT";

/// Get the root directory of the magnet software, which contains the `params` and `sessions`
/// directories.
pub fn get_magnet_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
