//! Host platform (linux for example) utility functions

use std::{env, path::PathBuf};

use uname;

/// Environment variable pointing at the root of the rover software checkout.
pub const SW_ROOT_ENV_VAR: &str = "ROVER_SW_ROOT";

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Get the root directory of the software, which holds the `params` and `sessions` directories.
pub fn get_rover_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
