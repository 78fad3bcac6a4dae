//! ketchup: catch up with unanswered chat questions.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod search;
