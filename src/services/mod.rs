//! Upload orchestration services, leaves first: chunk planning, object
//! storage, record persistence, and the orchestrator that ties them together.

pub mod chunk_planner;
pub mod object_storage;
pub mod upload_service;
pub mod upload_store;
