//! Flattening and A/B analysis of training-session records.
//!
//! Session documents are loaded by [`source`], flattened into tables by
//! [`extract`], compared per group by [`compare`] and tested by [`stats`].
//! [`export`] writes the tables and [`report`] renders the text report.

pub mod compare;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod models;
pub mod report;
pub mod source;
pub mod stats;
