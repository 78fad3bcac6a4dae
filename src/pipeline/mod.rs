//! Query pipeline.
//!
//! Every enabled query flows through:
//! 1. `SearchClient::search()`: fetch candidate messages
//! 2. `rules::extract_candidate()`: author exclusion, field extraction
//! 3. `rules::filter_candidate()`: done marker, substring, filter regex
//! 4. `report::render()`: grouped overview
//!
//! Nothing is persisted between runs.

pub mod extract;
pub mod processor;
pub mod report;
pub mod rules;
pub mod types;
