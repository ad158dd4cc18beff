//! In-process hierarchical store of monitor elements for data-quality
//! monitoring.
//!
//! A [`DqmStore`] holds scalars (int, real, string) and 1-D/2-D/3-D
//! histograms and profiles in a slash-separated directory namespace with a
//! current-working-directory model. Producers book and fill elements during
//! event processing; a pluggable engine runs named quality tests over them
//! and aggregates per-element verdicts into a folder status; the archive
//! layer serializes the whole tree to a checksummed binary file and reads it
//! back with overwrite, prepend, and collation semantics.
//!
//! The store is single-threaded by contract: one producer both books and
//! fills. It is an explicit-lifetime object: construct one at program init
//! and pass it by reference to every collaborator.
//!
//! ```no_run
//! use dqstore::{DqmStore, StoreConfig};
//!
//! # fn main() -> dqstore::DqmResult<()> {
//! let mut store = DqmStore::new(StoreConfig::default())?;
//! store.set_current_folder("Tracker/Digis")?;
//! store.book_1d("adc", "ADC spectrum", 100, 0.0, 400.0)?;
//! store.get_mut("Tracker/Digis/adc").unwrap().fill(&[120.0], 1.0);
//!
//! store.create_qtest("ContentsXRange", "adc_window")?;
//! store.use_qtest("Tracker/Digis", "adc_window")?;
//! store.reset();
//! store.run_qtests();
//!
//! dqstore::archive::save(
//!     &store,
//!     std::path::Path::new("tracker.dqm"),
//!     &dqstore::archive::SaveOptions::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod compare;
pub mod element;
pub mod engine;
pub mod error;
pub mod hist;
pub mod index;
pub mod occupancy;
pub mod path;
pub mod range_checks;
pub mod stats;
pub mod store;

pub use archive::{ArchiveNode, OpenOptions, SaveOptions, open, patch_version, release_version, save};
pub use compare::{Comp2RefChi2, Comp2RefEqualH, Comp2RefKolmogorov};
pub use element::{BadChannel, Kind, MeValue, MonitorElement, QReport, Status};
pub use engine::{
    AlgoResult, Criterion, ERROR_PROB_THRESHOLD, QAlgorithm, QTestEngine, TestContext,
    WARNING_PROB_THRESHOLD,
};
pub use error::{DqmError, DqmResult};
pub use hist::{Axis, Histogram};
pub use index::DirectoryIndex;
pub use occupancy::{
    AllContentWithinFixedRange, AllContentWithinFloatingRange, Csc01, FixedFlatOccupancy1d,
    MostProbableLandau, OccupancyVerdict,
};
pub use path::GlobPattern;
pub use range_checks::{
    ContentsWithinExpected, ContentsXRange, ContentsYRange, DeadChannel, MeanWithinExpected,
    NoisyChannel,
};
pub use store::{COLLATE_DIR, DqmStore, REFERENCE_DIR, StoreConfig};
