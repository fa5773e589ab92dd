pub mod config;
pub mod contributors;
pub mod github;
pub mod index;
pub mod loader;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod route;
pub mod runtime;
pub mod session;
