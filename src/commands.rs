//! One dispatcher module per CLI subcommand; each reuses the
//! object-store and clone-pipeline machinery in `crate::object`,
//! `crate::pktline`, `crate::refs`, `crate::fetch`, `crate::sideband`,
//! `crate::pack`, `crate::delta`, and `crate::checkout`.

pub mod cat_file;
pub mod clone;
pub mod commit_tree;
pub mod hash_object;
pub mod init;
pub mod ls_tree;
pub mod write_tree;
