// Media Dispatch Hub - Server Core
//
// Central hub that hands publish jobs to a fleet of remote automation agents
// over a webhook protocol, and records what was published so the same
// (client, media, platform) triple is never dispatched twice.
//
// Infrastructure (event bus, job queue, registries) lives in kernel/;
// persisted entities and their operations live in domains/*.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
