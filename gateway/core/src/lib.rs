#![allow(clippy::new_without_default)]

//! Gateway container around the bus connectors: configuration, the property
//! cache, the storage backend and the worker threads that consume the
//! connector event queues.

pub mod cache;
pub mod config;
pub mod container;
pub mod service;
pub mod storage;
