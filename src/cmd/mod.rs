//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `repo`   | `RepoName`       |
//! | `config` | `Config`         |

pub mod config;
pub mod repo;
pub mod serve;

pub use config::cmd_config;
pub use repo::cmd_repo_name;
pub use serve::cmd_serve;
