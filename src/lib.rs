pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod llm;
pub mod output;
pub mod session;
pub mod synth;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
