pub mod check_path;
pub mod config;
pub mod doc;
pub mod init;
pub mod migrate;
