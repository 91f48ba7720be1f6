//! # Repository Layer
//!
//! Row-level SQL for each table. Every function here takes
//! `&mut SqliteConnection` so the CALLER owns the transaction: an engine
//! opens one unit of work, threads it through every repository call it
//! makes, and commits exactly once. Nothing in this layer begins, commits,
//! or rolls back.

pub mod bill;
pub mod item;
pub mod ledger;
pub mod returns;
