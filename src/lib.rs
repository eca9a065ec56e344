//! CropManage agent library crate
//!
//! Shared by the `cropmanage` assistant and the `chat-fix` pull request bot.

pub mod agent;
pub mod announce;
pub mod api;
pub mod config;
pub mod intent;
pub mod keyring;
pub mod logging;
pub mod patchbot;
pub mod util;
