// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote grievance table access behind the [`GrmStore`] trait.

pub mod memory;
pub mod sql;
pub mod traits;

pub use memory::InMemoryGrmStore;
pub use sql::SqlGrmStore;
pub use traits::{GrmStore, TableLayout};
