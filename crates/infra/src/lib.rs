pub mod config;
pub mod locks;
pub mod logging;
pub mod repositories;
pub mod supplement;
