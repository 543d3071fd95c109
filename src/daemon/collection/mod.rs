//! Producers of evidence. [collector::DataCollectionModule] drives a
//! [filesystem::FilesystemTracker] and a [terminal::TerminalTracker] once per tick and forwards
//! what they found.

pub mod collector;
pub mod filesystem;
pub mod prompt;
pub mod snapshot;
pub mod terminal;
