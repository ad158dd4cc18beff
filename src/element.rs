//! Monitor elements: typed value holders living in the store's namespace.
//!
//! An element couples a directory path and leaf name with a scalar or
//! histogram value, a sorted tag list, the quality reports produced for it,
//! and the per-cycle flags the store's reset machinery consults.

use crate::hist::Histogram;
use crate::path::join_path;

/// Monitor-element kind. Histogram kinds carry the storage precision the
/// element was booked with; the container itself always accumulates in f64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Unsupported or not-yet-initialized payload.
    Invalid,
    /// 64-bit integer scalar.
    Int,
    /// Floating-point scalar.
    Real,
    /// String scalar.
    String,
    /// 1-D histogram, f32 precision.
    H1F,
    /// 1-D histogram, i16 precision.
    H1S,
    /// 1-D histogram, f64 precision.
    H1D,
    /// 2-D histogram, f32 precision.
    H2F,
    /// 2-D histogram, i16 precision.
    H2S,
    /// 3-D histogram, f32 precision.
    H3F,
    /// 1-D profile.
    Profile,
    /// 2-D profile.
    Profile2d,
}

impl Kind {
    /// True for INT/REAL/STRING.
    #[must_use]
    pub fn is_scalar(self) -> bool {
        matches!(self, Self::Int | Self::Real | Self::String)
    }

    /// True for every histogram or profile kind.
    #[must_use]
    pub fn is_histogram(self) -> bool {
        matches!(
            self,
            Self::H1F
                | Self::H1S
                | Self::H1D
                | Self::H2F
                | Self::H2S
                | Self::H3F
                | Self::Profile
                | Self::Profile2d
        )
    }

    /// True for the three 1-D histogram precisions (profiles excluded).
    #[must_use]
    pub fn is_1d(self) -> bool {
        matches!(self, Self::H1F | Self::H1S | Self::H1D)
    }

    /// True for the 2-D histogram precisions (profiles excluded).
    #[must_use]
    pub fn is_2d(self) -> bool {
        matches!(self, Self::H2F | Self::H2S)
    }

    /// Stable archive tag byte.
    #[must_use]
    pub fn tag_byte(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Int => 1,
            Self::Real => 2,
            Self::String => 3,
            Self::H1F => 4,
            Self::H1S => 5,
            Self::H1D => 6,
            Self::H2F => 7,
            Self::H2S => 8,
            Self::H3F => 9,
            Self::Profile => 10,
            Self::Profile2d => 11,
        }
    }

    /// Inverse of [`Kind::tag_byte`].
    #[must_use]
    pub fn from_tag_byte(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Invalid,
            1 => Self::Int,
            2 => Self::Real,
            3 => Self::String,
            4 => Self::H1F,
            5 => Self::H1S,
            6 => Self::H1D,
            7 => Self::H2F,
            8 => Self::H2S,
            9 => Self::H3F,
            10 => Self::Profile,
            11 => Self::Profile2d,
            _ => return None,
        })
    }
}

/// Quality-report status. The numeric codes are the archival wire values;
/// severity ranking for folder aggregation is ERROR > WARNING > OTHER > OK,
/// with every diagnostic status counting as OTHER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Test passed.
    Ok,
    /// Probability below the warning threshold.
    Warning,
    /// Probability below the error threshold.
    Error,
    /// Result that is neither pass nor warn/error.
    Other,
    /// Test is administratively disabled.
    Disabled,
    /// Element missing, wrong kind, or algorithm reported failure.
    Invalid,
    /// Not enough entries to judge.
    InsufStat,
    /// Attached but never executed.
    DidNotRun,
}

impl Status {
    /// Archival wire code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Other => 30,
            Self::Disabled => 50,
            Self::Invalid => 60,
            Self::InsufStat => 70,
            Self::DidNotRun => 90,
            Self::Ok => 100,
            Self::Warning => 200,
            Self::Error => 300,
        }
    }

    /// Map a wire code back to a status; unknown codes read as OTHER.
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            30 => Self::Other,
            50 => Self::Disabled,
            60 => Self::Invalid,
            70 => Self::InsufStat,
            90 => Self::DidNotRun,
            100 => Self::Ok,
            200 => Self::Warning,
            300 => Self::Error,
            _ => Self::Other,
        }
    }

    /// Aggregation rank: ERROR(3) > WARNING(2) > everything-not-OK(1) > OK(0).
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Error => 3,
            Self::Warning => 2,
            Self::Ok => 0,
            _ => 1,
        }
    }
}

/// A histogram bin flagged by a quality test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BadChannel {
    /// X bin index (0 = underflow).
    pub bin_x: usize,
    /// Y bin index, 0 when not applicable.
    pub bin_y: usize,
    /// Z bin index, 0 when not applicable.
    pub bin_z: usize,
    /// Observed bin content.
    pub contents: f64,
    /// Observed bin error.
    pub error: f64,
}

impl BadChannel {
    /// Flag a 1-D bin.
    #[must_use]
    pub fn x(bin_x: usize, contents: f64, error: f64) -> Self {
        Self {
            bin_x,
            bin_y: 0,
            bin_z: 0,
            contents,
            error,
        }
    }

    /// Flag a 2-D cell.
    #[must_use]
    pub fn xy(bin_x: usize, bin_y: usize, contents: f64, error: f64) -> Self {
        Self {
            bin_x,
            bin_y,
            bin_z: 0,
            contents,
            error,
        }
    }
}

/// The stored result of one quality test on one element. Rewritten on every
/// engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct QReport {
    /// Name of the criterion instance that produced this report.
    pub qtname: String,
    /// Algorithm name of that criterion ("" for reports read from archives
    /// without a live criterion).
    pub algorithm: String,
    /// Verdict.
    pub status: Status,
    /// Human-readable summary.
    pub message: String,
    /// Bins that failed, when the algorithm tracks them.
    pub bad_channels: Vec<BadChannel>,
}

impl QReport {
    /// A fresh attachment that has not been executed yet.
    #[must_use]
    pub fn pending(qtname: &str, algorithm: &str) -> Self {
        Self {
            qtname: qtname.to_owned(),
            algorithm: algorithm.to_owned(),
            status: Status::DidNotRun,
            message: "test has not run yet".to_owned(),
            bad_channels: Vec::new(),
        }
    }
}

/// The element's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum MeValue {
    /// INT scalar.
    Int(i64),
    /// REAL scalar.
    Real(f64),
    /// STRING scalar.
    String(String),
    /// Any histogram kind.
    Hist(Histogram),
}

/// A named monitor element owned by the store.
#[derive(Debug, Clone)]
pub struct MonitorElement {
    path: String,
    name: String,
    kind: Kind,
    value: MeValue,
    /// Full path of the mirror element under `Reference/`, when one existed
    /// at booking time (or was created later). Non-owning.
    reference: Option<String>,
    tags: Vec<u32>,
    qreports: Vec<QReport>,
    updated: bool,
    reset_at_cycle_end: bool,
    accumulate: bool,
    soft_reset_baseline: Option<Histogram>,
}

impl MonitorElement {
    fn new(path: &str, name: &str, kind: Kind, value: MeValue) -> Self {
        Self {
            path: path.to_owned(),
            name: name.to_owned(),
            kind,
            value,
            reference: None,
            tags: Vec::new(),
            qreports: Vec::new(),
            updated: true,
            reset_at_cycle_end: false,
            accumulate: false,
            soft_reset_baseline: None,
        }
    }

    /// New INT element (initial value 0).
    #[must_use]
    pub fn new_int(path: &str, name: &str) -> Self {
        Self::new(path, name, Kind::Int, MeValue::Int(0))
    }

    /// New REAL element (initial value 0).
    #[must_use]
    pub fn new_real(path: &str, name: &str) -> Self {
        Self::new(path, name, Kind::Real, MeValue::Real(0.0))
    }

    /// New STRING element with its initial value.
    #[must_use]
    pub fn new_string(path: &str, name: &str, value: &str) -> Self {
        Self::new(path, name, Kind::String, MeValue::String(value.to_owned()))
    }

    /// New histogram element adopting `hist`.
    #[must_use]
    pub fn new_histogram(path: &str, name: &str, kind: Kind, hist: Histogram) -> Self {
        debug_assert!(kind.is_histogram());
        Self::new(path, name, kind, MeValue::Hist(hist))
    }

    /// Directory part (empty at the root).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Leaf name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `path/name`.
    #[must_use]
    pub fn fullname(&self) -> String {
        join_path(&self.path, &self.name)
    }

    /// Element kind.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> &MeValue {
        &self.value
    }

    /// INT value, if this is an INT element.
    #[must_use]
    pub fn int_value(&self) -> Option<i64> {
        match self.value {
            MeValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// REAL value, if this is a REAL element.
    #[must_use]
    pub fn real_value(&self) -> Option<f64> {
        match self.value {
            MeValue::Real(v) => Some(v),
            _ => None,
        }
    }

    /// STRING value, if this is a STRING element.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            MeValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Histogram payload, for histogram kinds.
    #[must_use]
    pub fn histogram(&self) -> Option<&Histogram> {
        match &self.value {
            MeValue::Hist(h) => Some(h),
            _ => None,
        }
    }

    /// Mutable histogram payload. Does not mark the element updated; use the
    /// fill forwarders for event-loop filling.
    pub fn histogram_mut(&mut self) -> Option<&mut Histogram> {
        match &mut self.value {
            MeValue::Hist(h) => Some(h),
            _ => None,
        }
    }

    /// Entry count used for minimum-statistics checks: histogram entries,
    /// and 1 for scalars (a scalar always holds exactly one value).
    #[must_use]
    pub fn entries(&self) -> f64 {
        match &self.value {
            MeValue::Hist(h) => h.entries(),
            _ => 1.0,
        }
    }

    /// Set an INT value. Scalars are always "updated" after a fill.
    pub fn fill_int(&mut self, v: i64) {
        if matches!(self.value, MeValue::Int(_)) {
            self.value = MeValue::Int(v);
            self.updated = true;
        }
    }

    /// Set a REAL value.
    pub fn fill_real(&mut self, v: f64) {
        if matches!(self.value, MeValue::Real(_)) {
            self.value = MeValue::Real(v);
            self.updated = true;
        }
    }

    /// Set a STRING value.
    pub fn fill_string(&mut self, v: &str) {
        if matches!(self.value, MeValue::String(_)) {
            self.value = MeValue::String(v.to_owned());
            self.updated = true;
        }
    }

    /// Weighted histogram fill.
    pub fn fill(&mut self, coords: &[f64], weight: f64) {
        if let MeValue::Hist(h) = &mut self.value {
            h.fill(coords, weight);
            self.updated = true;
        }
    }

    /// Weighted profile fill.
    pub fn fill_profile(&mut self, coords: &[f64], value: f64, weight: f64) {
        if let MeValue::Hist(h) = &mut self.value {
            h.fill_profile(coords, value, weight);
            self.updated = true;
        }
    }

    /// The reference-mirror path handle, when set.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Install or clear the reference handle.
    pub fn set_reference(&mut self, full_path: Option<String>) {
        self.reference = full_path;
    }

    /// Sorted, duplicate-free tag list.
    #[must_use]
    pub fn tags(&self) -> &[u32] {
        &self.tags
    }

    /// Insert a tag keeping the list strictly increasing. Zero tags are the
    /// caller's responsibility to reject. Returns false when already present.
    pub fn add_tag(&mut self, tag: u32) -> bool {
        match self.tags.binary_search(&tag) {
            Ok(_) => false,
            Err(pos) => {
                self.tags.insert(pos, tag);
                true
            }
        }
    }

    /// All stored quality reports.
    #[must_use]
    pub fn qreports(&self) -> &[QReport] {
        &self.qreports
    }

    /// Look up a report by criterion name.
    #[must_use]
    pub fn report(&self, qtname: &str) -> Option<&QReport> {
        self.qreports.iter().find(|r| r.qtname == qtname)
    }

    /// Append a report, or replace an existing one with the same `qtname`.
    pub fn attach_report(&mut self, report: QReport) {
        match self.qreports.iter_mut().find(|r| r.qtname == report.qtname) {
            Some(slot) => *slot = report,
            None => self.qreports.push(report),
        }
    }

    /// True when any report is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.qreports.iter().any(|r| r.status == Status::Error)
    }

    /// True when any report is a warning.
    #[must_use]
    pub fn has_warning(&self) -> bool {
        self.qreports.iter().any(|r| r.status == Status::Warning)
    }

    /// True when any report is neither OK nor warning nor error (including
    /// tests that have not run).
    #[must_use]
    pub fn has_other_report(&self) -> bool {
        self.qreports.iter().any(|r| r.status.severity() == 1)
    }

    /// Highest-severity status across attached reports.
    #[must_use]
    pub fn worst_status(&self) -> Status {
        self.qreports
            .iter()
            .map(|r| r.status)
            .max_by_key(|s| s.severity())
            .unwrap_or(Status::Ok)
    }

    /// True when the element changed since the last cycle reset.
    #[must_use]
    pub fn was_updated(&self) -> bool {
        self.updated
    }

    /// Mark the element changed (used by archive extraction).
    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    /// Clear the updated flag at cycle end.
    pub fn reset_update(&mut self) {
        self.updated = false;
    }

    /// Configure whether the payload is cleared at cycle end.
    pub fn set_reset_at_cycle_end(&mut self, flag: bool) {
        self.reset_at_cycle_end = flag;
    }

    /// Accumulate across cycles (suppresses the cycle-end clear).
    pub fn set_accumulate(&mut self, flag: bool) {
        self.accumulate = flag;
    }

    /// True when the cycle reset should clear the payload.
    #[must_use]
    pub fn should_cycle_reset(&self) -> bool {
        self.reset_at_cycle_end && !self.accumulate
    }

    /// Clear the histogram payload (cycle reset).
    pub fn reset_value(&mut self) {
        if let MeValue::Hist(h) = &mut self.value {
            h.reset();
        }
    }

    /// Record the current histogram contents as the subtractive baseline.
    /// No-op for scalar elements.
    pub fn soft_reset(&mut self) {
        if let MeValue::Hist(h) = &self.value {
            self.soft_reset_baseline = Some(h.clone());
        }
    }

    /// Discard the soft-reset baseline.
    pub fn disable_soft_reset(&mut self) {
        self.soft_reset_baseline = None;
    }

    /// True while a soft-reset baseline is active.
    #[must_use]
    pub fn is_soft_reset(&self) -> bool {
        self.soft_reset_baseline.is_some()
    }

    /// The display view: current contents minus the soft-reset baseline, or
    /// a plain clone when no baseline is active. `None` for scalars.
    #[must_use]
    pub fn subtracted_view(&self) -> Option<Histogram> {
        let h = self.histogram()?;
        let mut view = h.clone();
        if let Some(baseline) = &self.soft_reset_baseline {
            let _ = view.subtract(baseline);
        }
        Some(view)
    }

    /// Archival text payload for scalar elements:
    /// `<name>k=value</name>` with `k` in `{i, f, s}`.
    #[must_use]
    pub fn tag_string(&self) -> Option<String> {
        let body = match &self.value {
            MeValue::Int(v) => format!("i={v}"),
            MeValue::Real(v) => format!("f={v}"),
            MeValue::String(v) => format!("s={v}"),
            MeValue::Hist(_) => return None,
        };
        Some(format!("<{n}>{body}</{n}>", n = self.name))
    }

    /// Archival text payload for one quality report:
    /// `<name.qtname>qr=st.<code>.<message></name.qtname>`.
    #[must_use]
    pub fn quality_tag_string(&self, report: &QReport) -> String {
        format!(
            "<{n}.{q}>qr=st.{c}.{m}</{n}.{q}>",
            n = self.name,
            q = report.qtname,
            c = report.status.code(),
            m = report.message
        )
    }
}
