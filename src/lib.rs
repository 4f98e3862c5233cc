pub mod config;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod report;
pub mod storage;
pub mod url;
pub mod worker;
