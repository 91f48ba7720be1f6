//! # Engines
//!
//! The transactional operations of Bazaar POS, one module per component:
//!
//! - [`inventory`] - batch create/merge, field patches, stock adjustment
//! - [`billing`] - sale create/edit, soft delete, payment settlement
//! - [`returns`] - return proration and exchanges
//! - [`ledger`] - annotated movement history (item and group views)
//! - [`visibility`] - batch archive reconciliation
//!
//! Every public operation here is one request-scoped transaction: it
//! validates before writing, threads a single unit of work through the
//! repository layer, and commits exactly once. Stock mutation, ledger
//! append, and visibility reconciliation always land in the same commit.

pub mod billing;
pub mod inventory;
pub mod ledger;
pub mod returns;
pub mod visibility;

#[cfg(test)]
pub(crate) mod testutil {
    use crate::pool::{Database, DbConfig};

    /// Fresh in-memory database with migrations applied.
    pub async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.expect("in-memory db")
    }
}
