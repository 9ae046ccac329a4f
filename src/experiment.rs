pub mod evaluation;
pub mod runner;
pub mod split;
