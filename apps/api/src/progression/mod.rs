// Sequential learning progression: prerequisite gating, completion tracking,
// per-learner topic views and catalog ingestion.

pub mod assembler;
pub mod handlers;
pub mod ingest;
pub mod resolver;
pub mod tracker;
