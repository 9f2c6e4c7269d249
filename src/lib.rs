//! # memories-sync
//!
//! Sync and ordered-image-cache engine for a collection of travel memories.
//!
//! Records live in a local JSON store and reconcile with a remote document
//! and blob store through [`remote::RemotePort`]. Each record's photo
//! gallery is fetched through a disk cache and always reassembled in
//! gallery order.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod remote;
pub mod storage;
pub mod telemetry;
