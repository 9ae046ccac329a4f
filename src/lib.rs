pub mod cli;
pub mod data;
pub mod error;
pub mod experiment;
pub mod io;
mod macros;
pub mod model;
pub mod prelude;
pub mod report;
pub mod service;
