//! Quality-test engine: the algorithm catalog, criterion lifecycle, and
//! attach-by-pattern specs.
//!
//! A *criterion* is a named instance of an algorithm with its thresholds and
//! state; only one criterion exists per name. Criteria attach to monitor
//! elements through glob patterns over full paths: attachment is recorded
//! as a pending report on the element, and the store's run loop asks the
//! engine to execute each attached criterion against a [`TestContext`]
//! snapshot of the element.

use std::any::Any;
use std::collections::BTreeMap;

use crate::element::{BadChannel, Kind, QReport, Status};
use crate::error::{DqmError, DqmResult};
use crate::hist::Histogram;
use crate::path::GlobPattern;

/// Default probability threshold below which a result is a warning.
pub const WARNING_PROB_THRESHOLD: f64 = 0.90;
/// Default probability threshold below which a result is an error.
pub const ERROR_PROB_THRESHOLD: f64 = 0.50;

/// Read-only snapshot of the element a criterion runs against.
#[derive(Debug, Clone, Copy)]
pub struct TestContext<'a> {
    /// Full `path/name` of the element, for diagnostics.
    pub fullname: &'a str,
    /// Element kind.
    pub kind: Kind,
    /// Histogram payload (None for scalar elements).
    pub hist: Option<&'a Histogram>,
    /// Mirror histogram under `Reference/`, when present.
    pub reference: Option<&'a Histogram>,
    /// Entry count used by the minimum-statistics gate.
    pub entries: f64,
}

/// What an algorithm produced: a probability in `[0, 1]`, or a negative
/// value when the test does not apply, plus any flagged bins.
#[derive(Debug, Clone)]
pub struct AlgoResult {
    /// Probability, or a negative value for "cannot run on this element".
    pub prob: f64,
    /// Bins that failed, when tracked.
    pub bad_channels: Vec<BadChannel>,
}

impl AlgoResult {
    /// A result with no flagged bins.
    #[must_use]
    pub fn prob(prob: f64) -> Self {
        Self {
            prob,
            bad_channels: Vec::new(),
        }
    }

    /// The test does not apply to this element.
    #[must_use]
    pub fn inapplicable() -> Self {
        Self::prob(-1.0)
    }
}

/// A quality-test algorithm. Implementations are pure numeric procedures;
/// they never error, signalling inapplicability with a negative probability.
pub trait QAlgorithm: Any {
    /// Catalog name of the algorithm.
    fn algo_name(&self) -> &'static str;

    /// Execute against an element snapshot.
    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult;

    /// Downcast hook for parameter configuration.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Factory signature stored in the catalog.
pub type AlgorithmFactory = fn() -> Box<dyn QAlgorithm>;

/// A named, configured instance of an algorithm.
pub struct Criterion {
    qtname: String,
    algorithm: Box<dyn QAlgorithm>,
    enabled: bool,
    status: Status,
    message: String,
    prob: f64,
    warning_prob: f64,
    error_prob: f64,
    min_entries: f64,
    was_modified: bool,
}

impl std::fmt::Debug for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Criterion")
            .field("qtname", &self.qtname)
            .field("algorithm", &self.algorithm.algo_name())
            .field("enabled", &self.enabled)
            .field("status", &self.status)
            .field("prob", &self.prob)
            .finish_non_exhaustive()
    }
}

impl Criterion {
    /// New criterion around an algorithm instance, with default thresholds.
    #[must_use]
    pub fn new(qtname: &str, algorithm: Box<dyn QAlgorithm>) -> Self {
        Self {
            qtname: qtname.to_owned(),
            algorithm,
            enabled: true,
            status: Status::DidNotRun,
            message: String::new(),
            prob: 0.0,
            warning_prob: WARNING_PROB_THRESHOLD,
            error_prob: ERROR_PROB_THRESHOLD,
            min_entries: 0.0,
            was_modified: true,
        }
    }

    /// Criterion name.
    #[must_use]
    pub fn qtname(&self) -> &str {
        &self.qtname
    }

    /// Algorithm name.
    #[must_use]
    pub fn algo_name(&self) -> &'static str {
        self.algorithm.algo_name()
    }

    /// Status of the last run.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Message of the last run.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Probability of the last run (−1 when it could not run).
    #[must_use]
    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Allow the criterion to run.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Skip this criterion; attached elements report DISABLED.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// True if the criterion will run.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True when parameters changed since the last engine run.
    #[must_use]
    pub fn was_modified(&self) -> bool {
        self.was_modified
    }

    pub(crate) fn clear_modified(&mut self) {
        self.was_modified = false;
    }

    /// Set the warning threshold; out-of-range values are ignored.
    pub fn set_warning_prob(&mut self, prob: f64) {
        if (0.0..=1.0).contains(&prob) {
            self.warning_prob = prob;
            self.was_modified = true;
        }
    }

    /// Set the error threshold; out-of-range values are ignored.
    pub fn set_error_prob(&mut self, prob: f64) {
        if (0.0..=1.0).contains(&prob) {
            self.error_prob = prob;
            self.was_modified = true;
        }
    }

    /// Minimum entries an element needs before the test runs.
    pub fn set_minimum_entries(&mut self, entries: u64) {
        #[allow(clippy::cast_precision_loss)]
        {
            self.min_entries = entries as f64;
        }
        self.was_modified = true;
    }

    /// Typed access to the algorithm for parameter configuration.
    pub fn configure<T: QAlgorithm>(&mut self) -> Option<&mut T> {
        self.was_modified = true;
        self.algorithm.as_any_mut().downcast_mut::<T>()
    }

    /// Execute against an element snapshot (`None` when the element is
    /// missing) and produce the report to store on the element.
    pub fn run(&mut self, ctx: Option<&TestContext<'_>>) -> QReport {
        let mut bad_channels = Vec::new();
        if !self.enabled {
            self.prob = -1.0;
            self.status = Status::Disabled;
            self.message = format!("test {} is disabled", self.qtname);
        } else if let Some(ctx) = ctx {
            if ctx.entries < self.min_entries {
                self.prob = -1.0;
                self.status = Status::InsufStat;
                self.message = format!(
                    "test {}: not enough statistics ({} < {} entries)",
                    self.qtname, ctx.entries, self.min_entries
                );
            } else {
                let result = self.algorithm.run(ctx);
                self.prob = result.prob;
                bad_channels = result.bad_channels;
                if !(0.0..=1.0).contains(&self.prob) {
                    self.status = Status::Invalid;
                    self.message = format!(
                        "test {} ({}) cannot run on '{}'",
                        self.qtname,
                        self.algo_name(),
                        ctx.fullname
                    );
                } else {
                    self.status = if self.prob < self.error_prob {
                        Status::Error
                    } else if self.prob < self.warning_prob {
                        Status::Warning
                    } else {
                        Status::Ok
                    };
                    self.message = format!(
                        "test {} ({}): prob = {}",
                        self.qtname,
                        self.algo_name(),
                        self.prob
                    );
                }
            }
        } else {
            self.prob = -1.0;
            self.status = Status::Invalid;
            self.message = format!("test {}: monitor element missing or unsupported", self.qtname);
        }

        QReport {
            qtname: self.qtname.clone(),
            algorithm: self.algo_name().to_owned(),
            status: self.status,
            message: self.message.clone(),
            bad_channels,
        }
    }
}

/// Catalog of algorithm factories, live criteria, and attach patterns.
#[derive(Debug, Default)]
pub struct QTestEngine {
    factories: BTreeMap<&'static str, AlgorithmFactory>,
    criteria: BTreeMap<String, Criterion>,
    specs: Vec<(GlobPattern, String)>,
}

impl QTestEngine {
    /// Empty engine with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one algorithm factory under its catalog name.
    pub fn register(&mut self, name: &'static str, factory: AlgorithmFactory) {
        self.factories.insert(name, factory);
    }

    /// Known algorithm names, in order.
    pub fn algorithms(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Instantiate a criterion. Fails with `Duplicate` on an existing
    /// `qtname` and `UnknownAlgorithm` on a catalog miss.
    pub fn create(&mut self, algorithm: &str, qtname: &str) -> DqmResult<&mut Criterion> {
        if self.criteria.contains_key(qtname) {
            return Err(DqmError::Duplicate {
                context: "createQTest",
                path: qtname.to_owned(),
            });
        }
        let factory = self
            .factories
            .get(algorithm)
            .ok_or_else(|| DqmError::UnknownAlgorithm {
                algorithm: algorithm.to_owned(),
            })?;
        let criterion = Criterion::new(qtname, factory());
        self.criteria.insert(qtname.to_owned(), criterion);
        Ok(self.criteria.get_mut(qtname).expect("just inserted"))
    }

    /// Look up a criterion.
    #[must_use]
    pub fn criterion(&self, qtname: &str) -> Option<&Criterion> {
        self.criteria.get(qtname)
    }

    /// Mutable criterion lookup.
    pub fn criterion_mut(&mut self, qtname: &str) -> Option<&mut Criterion> {
        self.criteria.get_mut(qtname)
    }

    /// Record a pattern spec so future bookings auto-attach.
    pub fn record_spec(&mut self, pattern: GlobPattern, qtname: String) {
        self.specs.push((pattern, qtname));
    }

    /// Criteria whose recorded patterns match `fullpath`, as
    /// `(qtname, algorithm)` pairs, for attach-at-booking.
    #[must_use]
    pub fn matching_specs(&self, fullpath: &str) -> Vec<(String, String)> {
        self.specs
            .iter()
            .filter(|(pattern, _)| pattern.matches(fullpath))
            .filter_map(|(_, qtname)| {
                self.criteria
                    .get(qtname)
                    .map(|c| (qtname.clone(), c.algo_name().to_owned()))
            })
            .collect()
    }

    /// Clear every criterion's modified flag (end of a run cycle).
    pub fn clear_modified_flags(&mut self) {
        for criterion in self.criteria.values_mut() {
            criterion.clear_modified();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always returns a fixed probability.
    struct FixedProb(f64);

    impl QAlgorithm for FixedProb {
        fn algo_name(&self) -> &'static str {
            "FixedProb"
        }

        fn run(&mut self, _ctx: &TestContext<'_>) -> AlgoResult {
            AlgoResult::prob(self.0)
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn ctx(entries: f64) -> TestContext<'static> {
        TestContext {
            fullname: "A/h",
            kind: Kind::Int,
            hist: None,
            reference: None,
            entries,
        }
    }

    fn engine_with_fixed() -> QTestEngine {
        let mut engine = QTestEngine::new();
        engine.register("FixedProb", || Box::new(FixedProb(1.0)));
        engine
    }

    #[test]
    fn create_rejects_duplicates_and_unknown() {
        let mut engine = engine_with_fixed();
        engine.create("FixedProb", "q1").unwrap();
        assert!(matches!(
            engine.create("FixedProb", "q1"),
            Err(DqmError::Duplicate { .. })
        ));
        assert!(matches!(
            engine.create("NoSuchAlgo", "q2"),
            Err(DqmError::UnknownAlgorithm { .. })
        ));
    }

    #[test]
    fn probability_maps_to_statuses() {
        let mut engine = QTestEngine::new();
        engine.register("FixedProb", || Box::new(FixedProb(0.3)));
        let c = engine.create("FixedProb", "q").unwrap();
        let report = c.run(Some(&ctx(10.0)));
        assert_eq!(report.status, Status::Error);

        c.configure::<FixedProb>().unwrap().0 = 0.7;
        assert_eq!(c.run(Some(&ctx(10.0))).status, Status::Warning);

        c.configure::<FixedProb>().unwrap().0 = 0.95;
        assert_eq!(c.run(Some(&ctx(10.0))).status, Status::Ok);

        c.configure::<FixedProb>().unwrap().0 = -1.0;
        assert_eq!(c.run(Some(&ctx(10.0))).status, Status::Invalid);
    }

    #[test]
    fn custom_thresholds_shift_the_mapping() {
        let mut engine = QTestEngine::new();
        engine.register("FixedProb", || Box::new(FixedProb(0.9)));
        let c = engine.create("FixedProb", "q").unwrap();
        c.set_warning_prob(0.95);
        c.set_error_prob(0.85);
        assert_eq!(c.run(Some(&ctx(1.0))).status, Status::Warning);
        // Out-of-range thresholds are ignored.
        c.set_error_prob(1.5);
        assert_eq!(c.run(Some(&ctx(1.0))).status, Status::Warning);
    }

    #[test]
    fn disabled_and_missing_and_thin_elements() {
        let mut engine = engine_with_fixed();
        let c = engine.create("FixedProb", "q").unwrap();
        c.disable();
        assert_eq!(c.run(Some(&ctx(10.0))).status, Status::Disabled);
        c.enable();
        assert_eq!(c.run(None).status, Status::Invalid);
        c.set_minimum_entries(100);
        assert_eq!(c.run(Some(&ctx(10.0))).status, Status::InsufStat);
    }

    #[test]
    fn modified_flag_lifecycle() {
        let mut engine = engine_with_fixed();
        let c = engine.create("FixedProb", "q").unwrap();
        assert!(c.was_modified());
        engine.clear_modified_flags();
        assert!(!engine.criterion("q").unwrap().was_modified());
        engine.criterion_mut("q").unwrap().set_warning_prob(0.8);
        assert!(engine.criterion("q").unwrap().was_modified());
    }

    #[test]
    fn specs_match_existing_criteria_only() {
        let mut engine = engine_with_fixed();
        engine.create("FixedProb", "q").unwrap();
        engine.record_spec(GlobPattern::compile("A/*").unwrap(), "q".into());
        engine.record_spec(GlobPattern::compile("B/*").unwrap(), "ghost".into());
        let matches = engine.matching_specs("A/h");
        assert_eq!(matches, vec![("q".to_owned(), "FixedProb".to_owned())]);
        assert!(engine.matching_specs("C/h").is_empty());
        // The ghost spec has no criterion behind it.
        assert!(engine.matching_specs("B/h").is_empty());
    }
}
