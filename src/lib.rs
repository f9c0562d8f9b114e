//! Nightshift - repeated agent task scheduler
//!
//! Schedules repeated invocations of an external agent process against a
//! shared output directory. Each task carries a goal, input materials, and an
//! output directory; the scheduler primes the task once, then loops: build a
//! prompt from the prior run's artifacts, invoke the agent, diff the output
//! directory, persist the outcome. Task records survive process restarts in a
//! single JSON store file.

pub mod agent;
pub mod artifacts;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ops;
pub mod prompts;
pub mod runner;
pub mod snapshot;
pub mod store;
pub mod tasklog;
