//! Command handlers. Each returns the text to print.

pub mod history;
pub mod run;
