// Scrape-fleet orchestrator core.
//
// Coordinates a pool of scraping workers, each bound to one
// rate-limited portal credential. The orchestrator decides how many
// workers of which role to run, launches each one as a child process
// under a pseudo-terminal, and supervises output/input/timeouts. The
// workers themselves drive a tiered work-queue selector against the
// shared document store and write classified results back.

pub mod config;
pub mod controller;
pub mod distributor;
pub mod errors;
pub mod models;
pub mod selector;
pub mod storage;
pub mod supervisor;
pub mod worker;

pub use config::*;
