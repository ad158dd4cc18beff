//! The store façade: configuration, navigation, booking, tagging, lookup,
//! removal, the cycle-reset machinery, and the quality-test run loop.
//!
//! One [`DqmStore`] instance owns every monitor element, the directory set,
//! and the quality-test engine. It is an explicit-lifetime object: construct
//! it at program init and pass it by reference; there is no global
//! instance, and it is single-threaded by contract.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compare::{Comp2RefChi2, Comp2RefEqualH, Comp2RefKolmogorov};
use crate::element::{Kind, MonitorElement, QReport, Status};
use crate::engine::{Criterion, QTestEngine, TestContext};
use crate::error::{DqmError, DqmResult};
use crate::hist::{Axis, Histogram};
use crate::index::DirectoryIndex;
use crate::occupancy::{
    AllContentWithinFixedRange, AllContentWithinFloatingRange, Csc01, FixedFlatOccupancy1d,
    MostProbableLandau,
};
use crate::path::{
    GlobPattern, clean_trailing_slashes, is_subdirectory, join_path, validate_path,
};
use crate::range_checks::{
    ContentsWithinExpected, ContentsXRange, ContentsYRange, DeadChannel, MeanWithinExpected,
    NoisyChannel,
};

/// Reserved prefix mirroring reference histograms.
pub const REFERENCE_DIR: &str = "Reference";
/// Reserved prefix whose elements always collate on re-booking.
pub const COLLATE_DIR: &str = "Collate";

/// Store configuration.
///
/// All fields have defaults; load selectively from a TOML file or override
/// via environment variables.
///
/// # Environment Variable Overrides
///
/// | Variable                      | Field                | Default |
/// |-------------------------------|----------------------|---------|
/// | `DQSTORE_VERBOSE`             | `verbose`            | `0`     |
/// | `DQSTORE_COLLATE_HISTOGRAMS`  | `collate_histograms` | `true`  |
/// | `DQSTORE_REFERENCE_FILE`      | `reference_file`     | `""`    |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Diagnostic chattiness; 0 keeps booking and extraction quiet.
    pub verbose: u32,
    /// Merge re-booked histograms into the existing element instead of
    /// failing with `Duplicate`.
    pub collate_histograms: bool,
    /// Archive loaded under `Reference/` at store construction, when
    /// non-empty.
    pub reference_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            collate_histograms: true,
            reference_file: String::new(),
        }
    }
}

impl StoreConfig {
    /// Load from a TOML file, falling back to defaults (with a warning) on
    /// read or parse failure.
    #[must_use]
    pub fn load_or_default(path: &std::path::Path) -> Self {
        std::fs::read_to_string(path).map_or_else(
            |_| Self::default(),
            |contents| match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse store config, using defaults");
                    Self::default()
                }
            },
        )
    }

    /// Apply environment-variable overrides. Invalid values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("DQSTORE_VERBOSE")
            && let Ok(v) = val.parse::<u32>()
        {
            self.verbose = v;
        }
        if let Ok(val) = std::env::var("DQSTORE_COLLATE_HISTOGRAMS")
            && let Ok(v) = val.parse::<bool>()
        {
            self.collate_histograms = v;
        }
        if let Ok(val) = std::env::var("DQSTORE_REFERENCE_FILE") {
            self.reference_file = val;
        }
        self
    }
}

/// The monitor-element store.
pub struct DqmStore {
    config: StoreConfig,
    pwd: String,
    index: DirectoryIndex,
    removed: Vec<String>,
    post_reset: bool,
    engine: QTestEngine,
}

impl DqmStore {
    /// Build a store: register the algorithm catalog and, when configured,
    /// load the reference archive under `Reference/`.
    pub fn new(config: StoreConfig) -> DqmResult<Self> {
        let mut engine = QTestEngine::new();
        engine.register(Comp2RefChi2::ALGO_NAME, || Box::new(Comp2RefChi2::default()));
        engine.register(Comp2RefKolmogorov::ALGO_NAME, || {
            Box::new(Comp2RefKolmogorov)
        });
        engine.register(Comp2RefEqualH::ALGO_NAME, || Box::new(Comp2RefEqualH));
        engine.register(ContentsXRange::ALGO_NAME, || {
            Box::new(ContentsXRange::default())
        });
        engine.register(ContentsYRange::ALGO_NAME, || {
            Box::new(ContentsYRange::default())
        });
        engine.register(MeanWithinExpected::ALGO_NAME, || {
            Box::new(MeanWithinExpected::default())
        });
        engine.register(DeadChannel::ALGO_NAME, || Box::new(DeadChannel::default()));
        engine.register(NoisyChannel::ALGO_NAME, || {
            Box::new(NoisyChannel::default())
        });
        engine.register(ContentsWithinExpected::ALGO_NAME, || {
            Box::new(ContentsWithinExpected::default())
        });
        engine.register(MostProbableLandau::ALGO_NAME, || {
            Box::new(MostProbableLandau::default())
        });
        engine.register(AllContentWithinFixedRange::ALGO_NAME, || {
            Box::new(AllContentWithinFixedRange::default())
        });
        engine.register(AllContentWithinFloatingRange::ALGO_NAME, || {
            Box::new(AllContentWithinFloatingRange::default())
        });
        engine.register(Csc01::ALGO_NAME, || Box::new(Csc01::default()));
        engine.register(FixedFlatOccupancy1d::ALGO_NAME, || {
            Box::new(FixedFlatOccupancy1d::default())
        });

        if !config.collate_histograms {
            info!("histogram collation disabled");
        }

        let mut store = Self {
            config,
            pwd: String::new(),
            index: DirectoryIndex::new(),
            removed: Vec::new(),
            post_reset: false,
            engine,
        };
        store.reset();

        if !store.config.reference_file.is_empty() {
            let reference = store.config.reference_file.clone();
            info!(file = %reference, "loading reference archive");
            crate::archive::open(
                &mut store,
                std::path::Path::new(&reference),
                &crate::archive::OpenOptions {
                    prepend: Some(REFERENCE_DIR.to_owned()),
                    ..Default::default()
                },
            )?;
        }
        Ok(store)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn index(&self) -> &DirectoryIndex {
        &self.index
    }

    pub(crate) fn ensure_directory(&mut self, path: &str) -> DqmResult<()> {
        self.index.make_directory(path)
    }

    // ─── Navigation ─────────────────────────────────────────────────────

    /// Current directory ("" at the root).
    #[must_use]
    pub fn pwd(&self) -> &str {
        &self.pwd
    }

    /// Go to the root directory.
    pub fn cd_root(&mut self) {
        self.pwd.clear();
    }

    /// Change into an existing directory (full path).
    pub fn cd(&mut self, path: &str) -> DqmResult<()> {
        let clean = clean_trailing_slashes(path);
        if !self.index.dir_exists(clean) {
            return Err(DqmError::NoSuchDirectory {
                path: clean.to_owned(),
            });
        }
        self.set_current_folder(clean)
    }

    /// Set the current directory, creating it (and every ancestor) first.
    pub fn set_current_folder(&mut self, path: &str) -> DqmResult<()> {
        let clean = clean_trailing_slashes(path);
        validate_path(clean)?;
        self.index.make_directory(clean)?;
        self.pwd = clean.to_owned();
        Ok(())
    }

    /// Drop the last path segment, or go to the root.
    pub fn go_up(&mut self) {
        match self.pwd.rfind('/') {
            Some(pos) => self.pwd.truncate(pos),
            None => self.pwd.clear(),
        }
    }

    /// True when `path` is a known directory.
    #[must_use]
    pub fn dir_exists(&self, path: &str) -> bool {
        self.index.dir_exists(clean_trailing_slashes(path))
    }

    // ─── Booking ────────────────────────────────────────────────────────

    fn initialise(&mut self, full: &str) {
        let refpath = join_path(REFERENCE_DIR, full);
        let reference = self.index.contains(&refpath).then_some(refpath);
        let specs = self.engine.matching_specs(full);
        if let Some(me) = self.index.get_mut(full) {
            me.set_reference(reference);
            for (qtname, algorithm) in specs {
                me.attach_report(QReport::pending(&qtname, &algorithm));
            }
        }
    }

    fn book_scalar(
        &mut self,
        dir: &str,
        name: &str,
        context: &'static str,
        make: impl FnOnce(&str, &str) -> MonitorElement,
    ) -> DqmResult<&mut MonitorElement> {
        let dir = clean_trailing_slashes(dir).to_owned();
        let full = join_path(&dir, name);
        validate_path(&full)?;

        if self.index.contains(&full) {
            // Re-booking a scalar under collation reuses the element as is.
            if self.config.collate_histograms || is_subdirectory(COLLATE_DIR, &full) {
                return Ok(self.index.get_mut(&full).expect("checked above"));
            }
            return Err(DqmError::Duplicate {
                context,
                path: full,
            });
        }
        if self.index.dir_exists(&full) {
            return Err(DqmError::Duplicate {
                context,
                path: full,
            });
        }

        self.index.make_directory(&dir)?;
        self.index.insert(make(&dir, name));
        self.initialise(&full);
        Ok(self.index.get_mut(&full).expect("just inserted"))
    }

    /// Book a histogram element into an explicit directory. Re-booking an
    /// existing path merges via `add` when collation applies (globally or
    /// through the `Collate/` prefix) and the shape matches.
    pub fn book_histogram_in(
        &mut self,
        dir: &str,
        name: &str,
        kind: Kind,
        hist: Histogram,
    ) -> DqmResult<&mut MonitorElement> {
        debug_assert!(kind.is_histogram());
        let dir = clean_trailing_slashes(dir).to_owned();
        let full = join_path(&dir, name);
        validate_path(&full)?;

        if self.index.contains(&full) {
            let collate = self.config.collate_histograms || is_subdirectory(COLLATE_DIR, &full);
            let existing = self.index.get_mut(&full).expect("checked above");
            if !collate
                || existing.kind() != kind
                || !existing
                    .histogram_mut()
                    .is_some_and(|target| target.add(&hist))
            {
                return Err(DqmError::Duplicate {
                    context: "book",
                    path: full,
                });
            }
            existing.mark_updated();
            return Ok(self.index.get_mut(&full).expect("checked above"));
        }

        if self.index.dir_exists(&full) {
            return Err(DqmError::Duplicate {
                context: "book",
                path: full,
            });
        }

        if self.config.verbose > 0 {
            debug!(path = %full, ?kind, "booking monitor element");
        }
        self.index.make_directory(&dir)?;
        self.index
            .insert(MonitorElement::new_histogram(&dir, name, kind, hist));
        self.initialise(&full);
        Ok(self.index.get_mut(&full).expect("just inserted"))
    }

    /// Book an INT element into an explicit directory.
    pub fn book_int_in(&mut self, dir: &str, name: &str) -> DqmResult<&mut MonitorElement> {
        self.book_scalar(dir, name, "bookInt", MonitorElement::new_int)
    }

    /// Book a REAL element into an explicit directory.
    pub fn book_real_in(&mut self, dir: &str, name: &str) -> DqmResult<&mut MonitorElement> {
        self.book_scalar(dir, name, "bookReal", MonitorElement::new_real)
    }

    /// Book a STRING element into an explicit directory.
    pub fn book_string_in(
        &mut self,
        dir: &str,
        name: &str,
        value: &str,
    ) -> DqmResult<&mut MonitorElement> {
        self.book_scalar(dir, name, "bookString", |d, n| {
            MonitorElement::new_string(d, n, value)
        })
    }

    /// Book an INT element in the current directory.
    pub fn book_int(&mut self, name: &str) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        self.book_int_in(&dir, name)
    }

    /// Book a REAL element in the current directory.
    pub fn book_real(&mut self, name: &str) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        self.book_real_in(&dir, name)
    }

    /// Book a STRING element in the current directory.
    pub fn book_string(&mut self, name: &str, value: &str) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        self.book_string_in(&dir, name, value)
    }

    fn book_1d_kind(
        &mut self,
        name: &str,
        title: &str,
        kind: Kind,
        nch: usize,
        low: f64,
        high: f64,
    ) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        let hist = Histogram::new_1d(name, title, Axis::new(nch, low, high));
        self.book_histogram_in(&dir, name, kind, hist)
    }

    /// Book a 1-D f32-precision histogram in the current directory.
    pub fn book_1d(
        &mut self,
        name: &str,
        title: &str,
        nch: usize,
        low: f64,
        high: f64,
    ) -> DqmResult<&mut MonitorElement> {
        self.book_1d_kind(name, title, Kind::H1F, nch, low, high)
    }

    /// Book a 1-D i16-precision histogram in the current directory.
    pub fn book_1s(
        &mut self,
        name: &str,
        title: &str,
        nch: usize,
        low: f64,
        high: f64,
    ) -> DqmResult<&mut MonitorElement> {
        self.book_1d_kind(name, title, Kind::H1S, nch, low, high)
    }

    /// Book a 1-D f64-precision histogram in the current directory.
    pub fn book_1dd(
        &mut self,
        name: &str,
        title: &str,
        nch: usize,
        low: f64,
        high: f64,
    ) -> DqmResult<&mut MonitorElement> {
        self.book_1d_kind(name, title, Kind::H1D, nch, low, high)
    }

    #[allow(clippy::too_many_arguments)]
    fn book_2d_kind(
        &mut self,
        name: &str,
        title: &str,
        kind: Kind,
        nchx: usize,
        lowx: f64,
        highx: f64,
        nchy: usize,
        lowy: f64,
        highy: f64,
    ) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        let hist = Histogram::new_2d(
            name,
            title,
            Axis::new(nchx, lowx, highx),
            Axis::new(nchy, lowy, highy),
        );
        self.book_histogram_in(&dir, name, kind, hist)
    }

    /// Book a 2-D f32-precision histogram in the current directory.
    #[allow(clippy::too_many_arguments)]
    pub fn book_2d(
        &mut self,
        name: &str,
        title: &str,
        nchx: usize,
        lowx: f64,
        highx: f64,
        nchy: usize,
        lowy: f64,
        highy: f64,
    ) -> DqmResult<&mut MonitorElement> {
        self.book_2d_kind(name, title, Kind::H2F, nchx, lowx, highx, nchy, lowy, highy)
    }

    /// Book a 2-D i16-precision histogram in the current directory.
    #[allow(clippy::too_many_arguments)]
    pub fn book_2s(
        &mut self,
        name: &str,
        title: &str,
        nchx: usize,
        lowx: f64,
        highx: f64,
        nchy: usize,
        lowy: f64,
        highy: f64,
    ) -> DqmResult<&mut MonitorElement> {
        self.book_2d_kind(name, title, Kind::H2S, nchx, lowx, highx, nchy, lowy, highy)
    }

    /// Book a 3-D histogram in the current directory.
    #[allow(clippy::too_many_arguments)]
    pub fn book_3d(
        &mut self,
        name: &str,
        title: &str,
        nchx: usize,
        lowx: f64,
        highx: f64,
        nchy: usize,
        lowy: f64,
        highy: f64,
        nchz: usize,
        lowz: f64,
        highz: f64,
    ) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        let hist = Histogram::new_3d(
            name,
            title,
            Axis::new(nchx, lowx, highx),
            Axis::new(nchy, lowy, highy),
            Axis::new(nchz, lowz, highz),
        );
        self.book_histogram_in(&dir, name, Kind::H3F, hist)
    }

    /// Book a 1-D profile in the current directory.
    pub fn book_profile(
        &mut self,
        name: &str,
        title: &str,
        nch: usize,
        low: f64,
        high: f64,
    ) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        let hist = Histogram::new_profile(name, title, Axis::new(nch, low, high));
        self.book_histogram_in(&dir, name, Kind::Profile, hist)
    }

    /// Book a 2-D profile in the current directory.
    #[allow(clippy::too_many_arguments)]
    pub fn book_profile_2d(
        &mut self,
        name: &str,
        title: &str,
        nchx: usize,
        lowx: f64,
        highx: f64,
        nchy: usize,
        lowy: f64,
        highy: f64,
    ) -> DqmResult<&mut MonitorElement> {
        let dir = self.pwd.clone();
        let hist = Histogram::new_profile_2d(
            name,
            title,
            Axis::new(nchx, lowx, highx),
            Axis::new(nchy, lowy, highy),
        );
        self.book_histogram_in(&dir, name, Kind::Profile2d, hist)
    }

    // ─── Tagging ────────────────────────────────────────────────────────

    /// Tag the element at `path` (full path) with a non-zero tag.
    pub fn tag_path(&mut self, path: &str, tag: u32) -> DqmResult<()> {
        if tag == 0 {
            return Err(DqmError::InvalidTag {
                path: path.to_owned(),
                tag,
                detail: "tag must be non-zero",
            });
        }
        let me = self
            .index
            .get_mut(path)
            .ok_or_else(|| DqmError::InvalidTag {
                path: path.to_owned(),
                tag,
                detail: "no such monitor element",
            })?;
        me.add_tag(tag);
        Ok(())
    }

    /// Tag the direct children of `path`.
    pub fn tag_contents(&mut self, path: &str, tag: u32) -> DqmResult<()> {
        let clean = clean_trailing_slashes(path).to_owned();
        let targets: Vec<String> = self
            .index
            .children_of(&clean)
            .map(MonitorElement::fullname)
            .collect();
        for full in targets {
            self.tag_path(&full, tag)?;
        }
        Ok(())
    }

    /// Tag `path` and every descendant element.
    pub fn tag_all_contents(&mut self, path: &str, tag: u32) -> DqmResult<()> {
        let clean = clean_trailing_slashes(path).to_owned();
        let targets: Vec<String> = self
            .index
            .subtree_of(&clean)
            .map(MonitorElement::fullname)
            .collect();
        for full in targets {
            self.tag_path(&full, tag)?;
        }
        Ok(())
    }

    // ─── Getters and listings ───────────────────────────────────────────

    /// Element at a full path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&MonitorElement> {
        self.index.get(path)
    }

    /// Mutable element at a full path.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut MonitorElement> {
        self.index.get_mut(path)
    }

    /// Every element carrying `tag`, in path order.
    #[must_use]
    pub fn get_by_tag(&self, tag: u32) -> Vec<&MonitorElement> {
        self.index
            .iter()
            .filter(|(_, me)| me.tags().binary_search(&tag).is_ok())
            .map(|(_, me)| me)
            .collect()
    }

    /// Direct children of `path`.
    #[must_use]
    pub fn get_contents<'a>(&'a self, path: &'a str) -> Vec<&'a MonitorElement> {
        let clean = clean_trailing_slashes(path);
        self.index.children_of(clean).collect()
    }

    /// Direct children of `path` carrying `tag`.
    #[must_use]
    pub fn get_contents_tagged<'a>(&'a self, path: &'a str, tag: u32) -> Vec<&'a MonitorElement> {
        let clean = clean_trailing_slashes(path);
        self.index
            .children_of(clean)
            .filter(|me| me.tags().binary_search(&tag).is_ok())
            .collect()
    }

    /// `path` and every descendant element.
    #[must_use]
    pub fn get_all_contents<'a>(&'a self, path: &'a str) -> Vec<&'a MonitorElement> {
        let clean = clean_trailing_slashes(path);
        self.index.subtree_of(clean).collect()
    }

    /// Elements whose full path matches a wildcard pattern.
    pub fn get_matching_contents(&self, pattern: &str) -> DqmResult<Vec<&MonitorElement>> {
        let glob = GlobPattern::compile(pattern)?;
        Ok(self
            .index
            .iter()
            .filter(|(full, _)| glob.matches(full))
            .map(|(_, me)| me)
            .collect())
    }

    /// Immediate subdirectories of the current directory.
    #[must_use]
    pub fn get_subdirs(&self) -> Vec<String> {
        self.index.subdirs_of(&self.pwd)
    }

    /// Names of the elements in the current directory.
    #[must_use]
    pub fn get_mes(&self) -> Vec<String> {
        self.index
            .children_of(&self.pwd)
            .map(|me| me.name().to_owned())
            .collect()
    }

    /// True when any element lives below `path`.
    #[must_use]
    pub fn contains_any_monitorable(&self, path: &str) -> bool {
        self.index.contains_any_monitorable(path)
    }

    /// Per-directory content listing: `<dir>:name1,name2` for every
    /// directory with at least one element, or `<dir>:` when contents are
    /// suppressed.
    #[must_use]
    pub fn contents_listing(&self, show_contents: bool) -> Vec<String> {
        let mut listing = Vec::new();
        for dir in self.index.dirs() {
            let names: Vec<&str> = self
                .index
                .children_of(dir)
                .map(MonitorElement::name)
                .collect();
            if names.is_empty() {
                continue;
            }
            if show_contents {
                listing.push(format!("{dir}:{}", names.join(",")));
            } else {
                listing.push(format!("{dir}:"));
            }
        }
        listing
    }

    /// Per-directory tag listing: `<dir>:name1/t1/t2,name2/t3` restricted to
    /// tagged elements.
    #[must_use]
    pub fn tag_listing(&self) -> Vec<String> {
        let mut listing = Vec::new();
        for dir in self.index.dirs() {
            let mut parts = Vec::new();
            for me in self.index.children_of(dir) {
                if me.tags().is_empty() {
                    continue;
                }
                let tags: Vec<String> = me.tags().iter().map(ToString::to_string).collect();
                parts.push(format!("{}/{}", me.name(), tags.join("/")));
            }
            if !parts.is_empty() {
                listing.push(format!("{dir}:{}", parts.join(",")));
            }
        }
        listing
    }

    /// The framed directory-structure rendering.
    #[must_use]
    pub fn dir_structure(&self) -> String {
        let rule = " ------------------------------------------------------------";
        let mut out = String::new();
        out.push_str(rule);
        out.push('\n');
        out.push_str("                    Directory structure:                     \n");
        out.push_str(rule);
        out.push('\n');
        for line in self.contents_listing(true) {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(rule);
        out
    }

    /// Log the directory structure.
    pub fn show_dir_structure(&self) {
        for line in self.dir_structure().lines() {
            info!("{line}");
        }
    }

    // ─── Removal ────────────────────────────────────────────────────────

    /// Delete a directory with all contents and subfolders.
    pub fn rmdir(&mut self, path: &str) {
        let clean = clean_trailing_slashes(path);
        let removed = self.index.remove_subtree(clean);
        self.removed.extend(removed);
    }

    /// Delete the elements of the current directory (subfolders survive).
    pub fn remove_contents(&mut self) {
        let pwd = self.pwd.clone();
        let removed = self.index.remove_children(&pwd);
        self.removed.extend(removed);
    }

    /// Delete one element from the current directory.
    pub fn remove_element(&mut self, name: &str) {
        let full = join_path(&self.pwd, name);
        if self.index.remove(&full).is_some() {
            self.removed.push(full);
        } else {
            warn!(path = %full, "attempt to remove non-existent monitor element");
        }
    }

    /// Drain the log of full names removed since the last drain (consumed by
    /// delta subscribers).
    pub fn take_removed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.removed)
    }

    // ─── Cycle reset ────────────────────────────────────────────────────

    /// End-of-cycle reset: clear payloads of updated elements that request
    /// it, drop all updated flags, and arm the quality-test run.
    pub fn reset(&mut self) {
        for (_, me) in self.index.iter_mut() {
            if me.was_updated() {
                if me.should_cycle_reset() {
                    me.reset_value();
                }
                me.reset_update();
            }
        }
        self.post_reset = true;
    }

    /// Record a subtractive baseline on an element.
    pub fn soft_reset(&mut self, path: &str) -> bool {
        self.index.get_mut(path).is_some_and(|me| {
            me.soft_reset();
            true
        })
    }

    /// Discard an element's subtractive baseline.
    pub fn disable_soft_reset(&mut self, path: &str) -> bool {
        self.index.get_mut(path).is_some_and(|me| {
            me.disable_soft_reset();
            true
        })
    }

    /// Toggle cross-cycle accumulation on an element.
    pub fn set_accumulate(&mut self, path: &str, flag: bool) -> bool {
        self.index.get_mut(path).is_some_and(|me| {
            me.set_accumulate(flag);
            true
        })
    }

    // ─── Reference and collate helpers ──────────────────────────────────

    /// True when the full path lies under `Reference/`.
    #[must_use]
    pub fn is_reference_path(path: &str) -> bool {
        is_subdirectory(REFERENCE_DIR, path)
    }

    /// True when the full path lies under `Collate/`.
    #[must_use]
    pub fn is_collate_path(path: &str) -> bool {
        is_subdirectory(COLLATE_DIR, path)
    }

    /// The reference mirror of the element at `path`, when present.
    #[must_use]
    pub fn reference_of(&self, path: &str) -> Option<&MonitorElement> {
        self.index.get(&join_path(REFERENCE_DIR, path))
    }

    /// Copy a live histogram element into the `Reference/` mirror and wire
    /// the element's reference handle to it. Returns false when the element
    /// is missing or is not a histogram.
    pub fn make_reference_me(&mut self, path: &str) -> DqmResult<bool> {
        let Some(hist) = self.index.get(path).and_then(MonitorElement::histogram) else {
            return Ok(false);
        };
        let kind = self.index.get(path).expect("checked above").kind();
        let hist = hist.clone();
        let (dir, name) = crate::path::split_path(path);
        let refdir = join_path(REFERENCE_DIR, dir);
        let name = name.to_owned();
        self.book_histogram_in(&refdir, &name, kind, hist)?;
        let refpath = join_path(REFERENCE_DIR, path);
        if let Some(me) = self.index.get_mut(path) {
            me.set_reference(Some(refpath));
        }
        Ok(true)
    }

    // ─── Quality tests ──────────────────────────────────────────────────

    /// Create a named quality test from a catalog algorithm, returning the
    /// criterion for configuration.
    pub fn create_qtest(&mut self, algorithm: &str, qtname: &str) -> DqmResult<&mut Criterion> {
        self.engine.create(algorithm, qtname)
    }

    /// The criterion with this name, if created.
    #[must_use]
    pub fn qtest(&self, qtname: &str) -> Option<&Criterion> {
        self.engine.criterion(qtname)
    }

    /// Mutable criterion lookup, for parameter configuration.
    pub fn qtest_mut(&mut self, qtname: &str) -> Option<&mut Criterion> {
        self.engine.criterion_mut(qtname)
    }

    /// Attach a quality test to the direct contents of a directory.
    pub fn use_qtest(&mut self, dir: &str, qtname: &str) -> DqmResult<()> {
        let clean = clean_trailing_slashes(dir);
        validate_path(clean)?;
        let pattern = if clean.is_empty() {
            "*".to_owned()
        } else {
            format!("{clean}/*")
        };
        self.use_qtest_by_match(&pattern, qtname)
    }

    /// Attach a quality test to every element matching a wildcard pattern,
    /// now and at every future booking.
    pub fn use_qtest_by_match(&mut self, pattern: &str, qtname: &str) -> DqmResult<()> {
        let Some(criterion) = self.engine.criterion(qtname) else {
            return Err(DqmError::NoSuchQTest {
                qtname: qtname.to_owned(),
            });
        };
        let algorithm = criterion.algo_name().to_owned();
        let glob = GlobPattern::compile(pattern)?;

        for (full, me) in self.index.iter_mut() {
            if glob.matches(full) {
                me.attach_report(QReport::pending(qtname, &algorithm));
            }
        }
        self.engine.record_spec(glob, qtname.to_owned());
        Ok(())
    }

    /// Run every attached quality test on every element outside
    /// `Reference/`, storing a fresh report per attachment.
    pub fn run_qtests(&mut self) {
        if !self.post_reset {
            warn!("run_qtests invoked without an intervening reset()");
        }

        // Phase 1: immutable scan, executing criteria against element
        // snapshots. The engine and the index are disjoint fields, so the
        // criteria can mutate their own state while the index is borrowed.
        let index = &self.index;
        let engine = &mut self.engine;
        let mut results: Vec<(String, QReport)> = Vec::new();
        for (full, me) in index.iter() {
            if is_subdirectory(REFERENCE_DIR, full) {
                continue;
            }
            for report in me.qreports() {
                let Some(criterion) = engine.criterion_mut(&report.qtname) else {
                    // Reports restored from archives keep their stored verdict.
                    continue;
                };
                let reference = index
                    .get(&join_path(REFERENCE_DIR, full))
                    .and_then(MonitorElement::histogram);
                let ctx = TestContext {
                    fullname: full,
                    kind: me.kind(),
                    hist: me.histogram(),
                    reference,
                    entries: me.entries(),
                };
                results.push((full.clone(), criterion.run(Some(&ctx))));
            }
        }

        // Phase 2: store the reports.
        for (full, report) in results {
            if let Some(me) = self.index.get_mut(&full) {
                me.attach_report(report);
            }
        }

        self.engine.clear_modified_flags();
        self.post_reset = false;
    }

    /// Aggregate status of every element under `path`: the most severe of
    /// ERROR > WARNING > OTHER > OK, where any report that is not OK, WARNING
    /// or ERROR counts as OTHER.
    #[must_use]
    pub fn get_status(&self, path: &str) -> Status {
        let clean = clean_trailing_slashes(path);
        let mut status = Status::Ok;
        for me in self.index.subtree_of(clean) {
            if me.has_error() {
                return Status::Error;
            }
            if me.has_warning() {
                status = Status::Warning;
            } else if status == Status::Ok && me.has_other_report() {
                status = Status::Other;
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DqmStore {
        DqmStore::new(StoreConfig::default()).expect("store construction")
    }

    fn store_no_collate() -> DqmStore {
        DqmStore::new(StoreConfig {
            collate_histograms: false,
            ..StoreConfig::default()
        })
        .expect("store construction")
    }

    #[test]
    fn config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.verbose, 0);
        assert!(config.collate_histograms);
        assert!(config.reference_file.is_empty());
    }

    #[test]
    fn navigation_creates_ancestors() {
        let mut store = store();
        store.set_current_folder("A/B/C/").unwrap();
        assert_eq!(store.pwd(), "A/B/C");
        for dir in ["", "A", "A/B", "A/B/C"] {
            assert!(store.dir_exists(dir));
        }
        store.go_up();
        assert_eq!(store.pwd(), "A/B");
        store.cd_root();
        assert_eq!(store.pwd(), "");
    }

    #[test]
    fn cd_requires_existing_directory() {
        let mut store = store();
        assert!(matches!(
            store.cd("Nowhere"),
            Err(DqmError::NoSuchDirectory { .. })
        ));
        store.set_current_folder("A").unwrap();
        store.cd_root();
        store.cd("A").unwrap();
        assert_eq!(store.pwd(), "A");
    }

    #[test]
    fn booking_over_a_directory_is_duplicate() {
        let mut store = store();
        store.set_current_folder("A/B").unwrap();
        store.cd_root();
        assert!(matches!(
            store.book_int_in("A", "B"),
            Err(DqmError::Duplicate { .. })
        ));
    }

    #[test]
    fn booking_rejects_illegal_names() {
        let mut store = store();
        assert!(matches!(
            store.book_int("bad!name"),
            Err(DqmError::IllegalName { .. })
        ));
    }

    #[test]
    fn scalar_booking_and_filling() {
        let mut store = store();
        store.set_current_folder("A/B").unwrap();
        store.book_int("n").unwrap().fill_int(7);
        assert_eq!(store.get("A/B/n").unwrap().int_value(), Some(7));
        assert_eq!(store.get_mes(), vec!["n"]);
    }

    #[test]
    fn scalar_rebooking_under_collation_returns_existing() {
        let mut store = store();
        store.book_string_in("A", "s", "first").unwrap();
        let me = store.book_string_in("A", "s", "second").unwrap();
        assert_eq!(me.string_value(), Some("first"));
    }

    #[test]
    fn histogram_collation_merges_contents() {
        let mut store = store();
        store.set_current_folder("A").unwrap();
        store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();
        store.get_mut("A/h").unwrap().fill(&[3.5], 5.0);
        // Re-book the same shape: contents merge.
        store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();
        let h = store.get("A/h").unwrap().histogram().unwrap();
        assert_eq!(h.nbins(0), 10);
        assert!((h.content(4, 0, 0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn collation_disabled_duplicate_leaves_store_unchanged() {
        let mut store = store_no_collate();
        store.set_current_folder("A").unwrap();
        store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();
        store.get_mut("A/h").unwrap().fill(&[3.5], 5.0);
        assert!(matches!(
            store.book_1d("h", "t", 10, 0.0, 10.0),
            Err(DqmError::Duplicate { .. })
        ));
        let h = store.get("A/h").unwrap().histogram().unwrap();
        assert!((h.content(4, 0, 0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn collation_shape_mismatch_is_duplicate() {
        let mut store = store();
        store.set_current_folder("A").unwrap();
        store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();
        assert!(matches!(
            store.book_1d("h", "t", 5, 0.0, 10.0),
            Err(DqmError::Duplicate { .. })
        ));
    }

    #[test]
    fn collate_prefix_overrides_disabled_collation() {
        let mut store = store_no_collate();
        store.set_current_folder("Collate/A").unwrap();
        store.book_1d("h", "t", 4, 0.0, 4.0).unwrap();
        // Second booking must merge despite the global flag.
        store.book_1d("h", "t", 4, 0.0, 4.0).unwrap();
        assert!(store.get("Collate/A/h").is_some());
    }

    #[test]
    fn tagging_keeps_lists_increasing() {
        let mut store = store();
        store.set_current_folder("A/B").unwrap();
        store.book_int("n").unwrap();
        store.tag_path("A/B/n", 3).unwrap();
        store.tag_path("A/B/n", 1).unwrap();
        store.tag_path("A/B/n", 3).unwrap();
        assert_eq!(store.get("A/B/n").unwrap().tags(), &[1, 3]);
        assert!(matches!(
            store.tag_path("A/B/n", 0),
            Err(DqmError::InvalidTag { .. })
        ));
        assert!(matches!(
            store.tag_path("A/B/missing", 1),
            Err(DqmError::InvalidTag { .. })
        ));
    }

    #[test]
    fn tag_contents_vs_tag_all_contents() {
        let mut store = store();
        store.book_int_in("A", "x").unwrap();
        store.book_int_in("A/B", "y").unwrap();
        store.tag_contents("A", 5).unwrap();
        assert_eq!(store.get("A/x").unwrap().tags(), &[5]);
        assert!(store.get("A/B/y").unwrap().tags().is_empty());
        store.tag_all_contents("A", 6).unwrap();
        assert_eq!(store.get("A/x").unwrap().tags(), &[5, 6]);
        assert_eq!(store.get("A/B/y").unwrap().tags(), &[6]);
    }

    #[test]
    fn get_by_tag_scans_everything() {
        let mut store = store();
        store.book_int_in("A", "x").unwrap();
        store.book_int_in("B", "y").unwrap();
        store.tag_path("A/x", 9).unwrap();
        let tagged = store.get_by_tag(9);
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].fullname(), "A/x");
    }

    #[test]
    fn listings_have_the_documented_shapes() {
        let mut store = store();
        store.book_int_in("A", "x").unwrap();
        store.book_int_in("A", "y").unwrap();
        store.book_int_in("A/B", "z").unwrap();
        store.tag_path("A/x", 2).unwrap();
        store.tag_path("A/x", 7).unwrap();

        assert_eq!(store.contents_listing(true), vec!["A:x,y", "A/B:z"]);
        assert_eq!(store.contents_listing(false), vec!["A:", "A/B:"]);
        assert_eq!(store.tag_listing(), vec!["A:x/2/7"]);
        assert!(store.dir_structure().contains("A:x,y"));
    }

    #[test]
    fn removal_feeds_the_removed_log() {
        let mut store = store();
        store.book_int_in("A", "x").unwrap();
        store.book_int_in("A/B", "y").unwrap();
        store.book_int_in("C", "z").unwrap();
        store.rmdir("A");
        assert!(store.get("A/x").is_none());
        assert!(!store.dir_exists("A/B"));
        assert_eq!(store.take_removed(), vec!["A/x", "A/B/y"]);
        assert!(store.take_removed().is_empty());

        store.set_current_folder("C").unwrap();
        store.remove_element("z");
        assert_eq!(store.take_removed(), vec!["C/z"]);
    }

    #[test]
    fn remove_contents_spares_subfolders() {
        let mut store = store();
        store.book_int_in("A", "x").unwrap();
        store.book_int_in("A/B", "y").unwrap();
        store.set_current_folder("A").unwrap();
        store.remove_contents();
        assert!(store.get("A/x").is_none());
        assert!(store.get("A/B/y").is_some());
    }

    #[test]
    fn reset_clears_flagged_elements() {
        let mut store = store();
        store.set_current_folder("A").unwrap();
        store.book_1d("h", "t", 4, 0.0, 4.0).unwrap();
        let me = store.get_mut("A/h").unwrap();
        me.set_reset_at_cycle_end(true);
        me.fill(&[1.5], 3.0);
        store.reset();
        let h = store.get("A/h").unwrap().histogram().unwrap();
        assert!((h.content(2, 0, 0)).abs() < 1e-12);
        assert!(!store.get("A/h").unwrap().was_updated());
    }

    #[test]
    fn qtest_attach_on_booking_via_recorded_spec() {
        let mut store = store();
        store.create_qtest("ContentsXRange", "qx").unwrap();
        store.use_qtest_by_match("A/*", "qx").unwrap();
        store.set_current_folder("A").unwrap();
        store.book_1d("h", "t", 4, 0.0, 4.0).unwrap();
        let me = store.get("A/h").unwrap();
        assert!(me.report("qx").is_some());
        assert_eq!(me.report("qx").unwrap().status, Status::DidNotRun);
    }

    #[test]
    fn use_qtest_reaches_direct_children_only() {
        let mut store = store();
        store.book_1d("h", "t", 4, 0.0, 4.0).unwrap();
        store.set_current_folder("A").unwrap();
        store.book_1d("h1", "t", 4, 0.0, 4.0).unwrap();
        store.set_current_folder("A/B").unwrap();
        store.book_1d("h2", "t", 4, 0.0, 4.0).unwrap();
        store.create_qtest("DeadChannel", "dc").unwrap();
        store.use_qtest("A", "dc").unwrap();
        assert!(store.get("A/h1").unwrap().report("dc").is_some());
        assert!(store.get("A/B/h2").unwrap().report("dc").is_none());
        assert!(store.get("h").unwrap().report("dc").is_none());
    }

    #[test]
    fn use_qtest_requires_existing_criterion() {
        let mut store = store();
        assert!(matches!(
            store.use_qtest_by_match("A/*", "ghost"),
            Err(DqmError::NoSuchQTest { .. })
        ));
    }

    #[test]
    fn run_qtests_skips_reference_subtree() {
        let mut store = store();
        store.create_qtest("DeadChannel", "dc").unwrap();
        store
            .qtest_mut("dc")
            .unwrap()
            .configure::<DeadChannel>()
            .unwrap()
            .set_threshold(0.0);
        store.use_qtest_by_match("A/*", "dc").unwrap();
        store.use_qtest_by_match("Reference/A/*", "dc").unwrap();
        store.book_1d_kind_for_test("Reference/A", "h");
        store.book_1d_kind_for_test("A", "h");
        store.reset();
        store.run_qtests();
        // The reference copy keeps its pending report; the live one ran.
        assert_eq!(
            store.get("A/h").unwrap().report("dc").unwrap().status,
            Status::Error
        );
        assert_eq!(
            store
                .get("Reference/A/h")
                .unwrap()
                .report("dc")
                .unwrap()
                .status,
            Status::DidNotRun
        );
    }

    impl DqmStore {
        fn book_1d_kind_for_test(&mut self, dir: &str, name: &str) {
            let hist = Histogram::new_1d(name, "t", Axis::new(4, 0.0, 4.0));
            self.book_histogram_in(dir, name, Kind::H1F, hist).unwrap();
        }
    }

    #[test]
    fn status_aggregation_ranks_severities() {
        let mut store = store();
        store.book_1d_kind_for_test("A", "dead");
        store.create_qtest("DeadChannel", "dc").unwrap();
        store
            .qtest_mut("dc")
            .unwrap()
            .configure::<DeadChannel>()
            .unwrap()
            .set_threshold(0.0);
        store.use_qtest_by_match("A/*", "dc").unwrap();
        store.reset();
        store.run_qtests();
        // Every bin is empty: prob 0 → ERROR.
        assert_eq!(store.get_status("A"), Status::Error);
        assert_eq!(store.get_status(""), Status::Error);
        assert_eq!(store.get_status("Elsewhere"), Status::Ok);
    }

    #[test]
    fn pending_tests_aggregate_as_other() {
        let mut store = store();
        store.book_1d_kind_for_test("A", "h");
        store.create_qtest("DeadChannel", "dc").unwrap();
        store.use_qtest_by_match("A/*", "dc").unwrap();
        assert_eq!(store.get_status("A"), Status::Other);
    }

    #[test]
    fn make_reference_me_mirrors_and_links() {
        let mut store = store();
        store.book_1d_kind_for_test("A", "h");
        store.get_mut("A/h").unwrap().fill(&[1.5], 2.0);
        assert!(store.make_reference_me("A/h").unwrap());
        assert!(!store.make_reference_me("A/missing").unwrap());
        let mirror = store.get("Reference/A/h").unwrap();
        assert!((mirror.histogram().unwrap().content(2, 0, 0) - 2.0).abs() < 1e-12);
        assert_eq!(store.get("A/h").unwrap().reference(), Some("Reference/A/h"));
        assert_eq!(store.reference_of("A/h").unwrap().fullname(), "Reference/A/h");
    }

    #[test]
    fn booking_attaches_existing_reference() {
        let mut store = store();
        store.book_1d_kind_for_test("Reference/A", "h");
        store.book_1d_kind_for_test("A", "h");
        assert_eq!(store.get("A/h").unwrap().reference(), Some("Reference/A/h"));
    }
}
