pub mod addenda;
pub mod config;
pub mod doctype;
pub mod document;
pub mod error;
pub mod frontmatter;
pub mod fs;
pub mod io;
pub mod migration;
pub mod paths;
pub mod pattern;
pub mod protection;
pub mod store;
pub mod templates;
pub mod version;

pub use error::{PlanningError, Result};
