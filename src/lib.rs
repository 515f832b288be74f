//! eCR Viewer Persistence Layer
//!
//! This crate provides a dialect- and schema-polymorphic storage layer for
//! electronic case report (eICR) metadata. It supports PostgreSQL and
//! SQL Server backends against two table layouts, a compact `core` layout
//! and a denormalized `extended` layout, behind one uniform API.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`dialect`] - Backend selection, per-dialect configuration, pooled
//!   connections, and a dialect-neutral row/value model
//! - [`schema`] - The `core` and `extended` table layouts and their DDL
//! - [`db`] - The [`Database`] factory, environment resolution, and the
//!   process-wide handle cache
//! - [`migrate`] - The idempotent, logged migration runner
//! - [`model`] - Entity structs, insert shapes, and patches
//! - [`repository`] - CRUD repositories and transactional bundle saves
//! - [`search`] - The paged, filtered listing query and its count twin
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! use ecr_persistence::{Database, Dialect, SchemaKind};
//! use ecr_persistence::migrate::MigrationRunner;
//!
//! # async fn demo() -> ecr_persistence::StoreResult<()> {
//! // Open a handle from explicit identifiers (or use Database::from_env).
//! let db = Database::open(Dialect::Postgres, SchemaKind::Core, None)?;
//!
//! // Bring the layout up to date.
//! let applied = MigrationRunner::new(&db).up().await?;
//! for name in applied {
//!     println!("applied {name}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Listing records
//!
//! ```no_run
//! use ecr_persistence::model::DateRangePeriod;
//! use ecr_persistence::search::list_ecr_data;
//! use chrono::{TimeZone, Utc};
//!
//! # async fn demo(db: &ecr_persistence::Database) -> ecr_persistence::StoreResult<()> {
//! let range = DateRangePeriod::new(
//!     Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
//! )?;
//! let page = list_ecr_data(db, 0, 25, "date_created", "DESC", &range, None, None).await?;
//! for row in page {
//!     println!("{} {}", row.patient_last_name, row.date_created);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod db;
pub mod dialect;
pub mod error;
pub mod migrate;
pub mod model;
pub mod repository;
pub mod schema;
pub mod search;

// Re-export commonly used types at crate root
pub use db::{Database, close_all, db_for};
pub use dialect::{Dialect, DialectOverrides, SqlRow, SqlValue};
pub use error::{StoreError, StoreResult};
pub use migrate::MigrationRunner;
pub use repository::{ConditionBundle, core::CoreRepository, extended::ExtendedRepository};
pub use schema::{NAMESPACE, SchemaKind};
pub use search::{EcrDisplay, get_total_ecr_count, list_ecr_data};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
