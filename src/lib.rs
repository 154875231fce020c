pub mod config;
pub mod experiment;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod outcome;
pub mod pricing;
pub mod quality;
pub mod record;
pub mod report;
pub mod scenario;
pub mod seed;
pub mod storage;
pub mod traders;
pub mod trial;
