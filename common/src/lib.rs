//! Detritus common – types shared between the capture server and the
//! replay tool.

pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod store;
pub mod timestamp;
