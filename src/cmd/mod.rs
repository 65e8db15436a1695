//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `init`     | `Init`           |
//! | `process`  | `Process`        |
//! | `config`   | `Config`         |

pub mod config;
pub mod init;
pub mod process;
pub mod serve;

pub use config::{cmd_config, resolve_config};
pub use init::cmd_init;
pub use process::cmd_process;
pub use serve::{ServeOverrides, cmd_serve};
