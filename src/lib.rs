pub mod analyzer;
pub mod classify;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod schema;
pub mod store;
pub mod util;
pub mod value;
pub mod workbook;
