//! Test support for extraction runs.
//!
//! Everything here runs in memory or under a scratch directory, so engine
//! behavior can be exercised without a network:
//!
//! - **Fake transport**: [`FakeTransport`] serves scripted responses per URL
//!   and counts attempts
//! - **Stores**: [`MemoryStore`] and the fault-injecting [`FlakyStore`]
//! - **Fixtures**: record builders and archive helpers
//!
//! # Quick Start
//!
//! ```
//! use ironsift::testing::*;
//! use ironsift::{ArchivePartition, EngineConfig, RecordLayout, Scheduler, TargetSet};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = std::env::temp_dir().join("ironsift-doc-quickstart");
//! # std::fs::remove_dir_all(&dir).ok();
//! let transport = Arc::new(FakeTransport::new());
//! transport.serve("https://bulk.test/2014.xml", sample_blob());
//!
//! let config = EngineConfig {
//!     layout: RecordLayout::simple("rec", "id", "txt"),
//!     output_dir: dir.clone(),
//!     ..EngineConfig::default()
//! };
//! let scheduler = Scheduler::with_parts(config, transport, Arc::new(MemoryStore::new()))?;
//! let summary = scheduler.run(
//!     &TargetSet::new([123, 999]),
//!     &[ArchivePartition::new("2014", "https://bulk.test/2014.xml")],
//! )?;
//! assert_eq!(summary.found, 2);
//! # std::fs::remove_dir_all(dir).ok();
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod stores;
pub mod transport;

pub use fixtures::*;
pub use stores::*;
pub use transport::*;
