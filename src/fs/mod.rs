//! Small filesystem helpers shared by the persisted logs and the report writer.

pub mod operations;
