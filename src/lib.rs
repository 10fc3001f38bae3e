//! Sporacle bet list dashboard library
//!
//! Two SQLite files back everything here:
//!
//! 1. **Reference snapshot** (`database.db`): competitions, matches and odds,
//!    published upstream and replaced wholesale. Opened read-only.
//! 2. **Local store** (`local.database.db`): the user's named bet lists,
//!    each a list of odd keys into the snapshot.
//!
//! The query layer joins the two into the program (upcoming matches with
//! their odds side by side), the on-going lists and the resolved lists.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod pivot;
pub mod query;
pub mod reference;
pub mod selection;
pub mod session;
pub mod snapshot;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use config::Config;
pub use db::LocalStore;
pub use error::{Error, Result, ValidationWarning};
pub use query::{QueryLayer, Source, Table};
pub use reference::ReferenceStore;
pub use selection::{Selection, Summary};
pub use session::{EditMode, Session};
pub use snapshot::SnapshotFetcher;
pub use types::{BetList, BetListDetail, OddDetail, OddLabel, ProgramRow, ResolvedBetList, UpsertOutcome, WinLoseCount};
