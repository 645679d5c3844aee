/// rivers_service: river gauge telemetry ingestion service.
///
/// # Module structure
///
/// ```text
/// rivers_service
/// ├── model       — shared data types (StationReading, StationId, units, DecodeError)
/// ├── config      — service configuration loader (rivers.toml + RIVERS_* env)
/// ├── logging     — tracing subscriber setup for the binaries
/// ├── groups      — registry of the 28 upstream station groups
/// ├── stations    — GeoJSON station catalog with station/sensor/region filters
/// ├── ingest
/// │   ├── transport — HTTP with backoff + jitter, retry budget, circuit breaker
/// │   ├── client    — upstream URL construction + typed get_* operations
/// │   ├── latest    — GeoJSON latest feed → per-sensor readings
/// │   ├── series    — single-station CSV → time series
/// │   ├── group     — multi-station CSV matrix → pivoted readings
/// │   └── fixtures (test only) — representative upstream payloads
/// ├── store
/// │   ├── file    — append-only JSON array file
/// │   └── sqlite  — relational store (rusqlite)
/// ├── repo        — deduplicating repository with per-station locks
/// ├── poller      — polling loop (fetch → decode → store on a threadpool)
/// └── endpoint    — HTTP facade over the cached station catalog
/// ```

/// Public modules
pub mod config;
pub mod endpoint;
pub mod groups;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod poller;
pub mod repo;
pub mod stations;
pub mod store;
