//! Binary archive format and the save/open walks over the store.
//!
//! An archive is a nested directory container of named objects:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Header                              │
//! │   magic: b"DQMA" (4 bytes)          │
//! │   version: u16                      │
//! ├─────────────────────────────────────┤
//! │ Node tree (recursive)               │
//! │   tag: u8 (dir / text / hist /      │
//! │            legacy named)            │
//! │   directory: name, child count,     │
//! │              children               │
//! │   text: one string (scalar and      │
//! │         quality-report payloads)    │
//! │   hist: name, kind, title, axes,    │
//! │         bin arrays, entry count     │
//! ├─────────────────────────────────────┤
//! │ crc32 of everything above           │
//! └─────────────────────────────────────┘
//! ```
//!
//! The top level holds exactly two marker text objects, the producer
//! release (leading `CMSSW`) and `DQMPATCH:<patch>`, followed by the
//! `DQMData` directory with one entry per monitor element. Scalars and
//! quality reports travel as text objects with the
//! `<label>k=value</label>` grammar, `k` in `{i, f, s, qr}`.

use std::fs;
use std::io::Write;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::element::{Kind, QReport, Status};
use crate::error::{DqmError, DqmResult};
use crate::hist::{Axis, Histogram};
use crate::path::{is_subdirectory, join_path};
use crate::store::{COLLATE_DIR, DqmStore, REFERENCE_DIR};

/// Magic bytes identifying an archive.
const MAGIC: [u8; 4] = *b"DQMA";

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Top-level directory holding all monitor elements.
pub const MONITOR_DIR: &str = "DQMData";

/// Archive patch level, written as the second top-level marker.
pub const PATCH_VERSION: &str = "1.0";

/// Producer release marker (first top-level object).
pub const RELEASE_MARKER: &str = concat!("CMSSW_dqstore_", env!("CARGO_PKG_VERSION"));

/// The `DQMPATCH:<patch>` marker string.
#[must_use]
pub fn patch_marker() -> String {
    format!("DQMPATCH:{PATCH_VERSION}")
}

/// Nesting bound for the node tree; deeper archives are rejected as corrupt.
const MAX_DEPTH: usize = 64;

const TAG_DIRECTORY: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_HIST: u8 = 3;
const TAG_NAMED: u8 = 4;

/// One object in the archive tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveNode {
    /// A nested directory of objects.
    Directory {
        /// Directory name (one path component).
        name: String,
        /// Contained objects, in written order.
        children: Vec<ArchiveNode>,
    },
    /// A text object; the value carries the whole payload.
    Text {
        /// The payload string.
        value: String,
    },
    /// A histogram object.
    Hist {
        /// Leaf name.
        name: String,
        /// Monitor-element kind booked on extraction.
        kind: Kind,
        /// Bin payload.
        hist: Histogram,
    },
    /// Legacy named object (`name` + `title`), re-encoded to the text
    /// grammar on extraction. Never written by `save`.
    Named {
        /// Object name.
        name: String,
        /// Object title (the encoded payload).
        title: String,
    },
}

// ─── Options ────────────────────────────────────────────────────────────────

/// Options for [`save`].
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Save only this subtree when non-empty.
    pub path: String,
    /// Regex rewrite `(pattern, replacement)` applied to each directory
    /// name during the write.
    pub rewrite: Option<(String, String)>,
    /// Only quality reports with a status code at or above this are written.
    pub min_status: u32,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            path: String::new(),
            rewrite: None,
            min_status: Status::Ok.code(),
        }
    }
}

/// Options for [`open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Replace existing element contents instead of collating.
    pub overwrite: bool,
    /// Extract only this subtree when non-empty.
    pub only_path: String,
    /// Prefix every extracted path, with special handling for the
    /// `Collate` and `Reference` prefixes.
    pub prepend: Option<String>,
}

// ─── Encoding ───────────────────────────────────────────────────────────────

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> DqmResult<()> {
    let len = u32::try_from(s.len()).map_err(|_| DqmError::ArchiveIo {
        path: std::path::PathBuf::new(),
        detail: "string too long for archive".into(),
    })?;
    put_u32(buf, len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_f64_slice(buf: &mut Vec<u8>, values: &[f64]) -> DqmResult<()> {
    let len = u32::try_from(values.len()).map_err(|_| DqmError::ArchiveIo {
        path: std::path::PathBuf::new(),
        detail: "bin array too long for archive".into(),
    })?;
    put_u32(buf, len);
    for v in values {
        put_f64(buf, *v);
    }
    Ok(())
}

fn encode_node(buf: &mut Vec<u8>, node: &ArchiveNode) -> DqmResult<()> {
    match node {
        ArchiveNode::Directory { name, children } => {
            buf.push(TAG_DIRECTORY);
            put_string(buf, name)?;
            let count = u32::try_from(children.len()).map_err(|_| DqmError::ArchiveIo {
                path: std::path::PathBuf::new(),
                detail: "directory too large for archive".into(),
            })?;
            put_u32(buf, count);
            for child in children {
                encode_node(buf, child)?;
            }
        }
        ArchiveNode::Text { value } => {
            buf.push(TAG_TEXT);
            put_string(buf, value)?;
        }
        ArchiveNode::Hist { name, kind, hist } => {
            buf.push(TAG_HIST);
            put_string(buf, name)?;
            buf.push(kind.tag_byte());
            put_string(buf, hist.title())?;
            buf.push(u8::from(hist.is_profile()));
            #[allow(clippy::cast_possible_truncation)]
            buf.push(hist.dims() as u8);
            for i in 0..hist.dims() {
                let axis = hist.axis(i);
                let bins = u32::try_from(axis.bins).map_err(|_| DqmError::ArchiveIo {
                    path: std::path::PathBuf::new(),
                    detail: "axis too large for archive".into(),
                })?;
                put_u32(buf, bins);
                put_f64(buf, axis.low);
                put_f64(buf, axis.high);
            }
            put_f64(buf, hist.entries());
            put_f64_slice(buf, hist.contents())?;
            put_f64_slice(buf, hist.sumw2())?;
            put_f64_slice(buf, hist.profile_entries())?;
        }
        ArchiveNode::Named { name, title } => {
            buf.push(TAG_NAMED);
            put_string(buf, name)?;
            put_string(buf, title)?;
        }
    }
    Ok(())
}

// ─── Decoding ───────────────────────────────────────────────────────────────

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    file: &'a Path,
}

impl<'a> Cursor<'a> {
    fn corrupt(&self, detail: impl Into<String>) -> DqmError {
        DqmError::ArchiveIo {
            path: self.file.to_path_buf(),
            detail: detail.into(),
        }
    }

    fn take(&mut self, n: usize) -> DqmResult<&'a [u8]> {
        let slice = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or_else(|| self.corrupt(format!("truncated at offset {}", self.pos)))?;
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> DqmResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DqmResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("len 2")))
    }

    fn u32(&mut self) -> DqmResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("len 4")))
    }

    fn f64(&mut self) -> DqmResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().expect("len 8")))
    }

    fn string(&mut self) -> DqmResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| self.corrupt("string payload is not UTF-8"))
    }

    fn f64_vec(&mut self) -> DqmResult<Vec<f64>> {
        let len = self.u32()? as usize;
        if len > self.data.len().saturating_sub(self.pos) / 8 + 1 {
            return Err(self.corrupt("bin array length exceeds file size"));
        }
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.f64()?);
        }
        Ok(values)
    }

    fn node(&mut self, depth: usize) -> DqmResult<ArchiveNode> {
        if depth > MAX_DEPTH {
            return Err(self.corrupt("directory nesting too deep"));
        }
        match self.u8()? {
            TAG_DIRECTORY => {
                let name = self.string()?;
                let count = self.u32()? as usize;
                let mut children = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    children.push(self.node(depth + 1)?);
                }
                Ok(ArchiveNode::Directory { name, children })
            }
            TAG_TEXT => Ok(ArchiveNode::Text {
                value: self.string()?,
            }),
            TAG_HIST => {
                let name = self.string()?;
                let kind_byte = self.u8()?;
                let kind = Kind::from_tag_byte(kind_byte)
                    .ok_or_else(|| self.corrupt(format!("unknown kind byte {kind_byte}")))?;
                let title = self.string()?;
                let profile = self.u8()? != 0;
                let dims = self.u8()? as usize;
                if !(1..=3).contains(&dims) {
                    return Err(self.corrupt(format!("unsupported dimensionality {dims}")));
                }
                let mut axes = Vec::with_capacity(dims);
                for _ in 0..dims {
                    let bins = self.u32()? as usize;
                    let low = self.f64()?;
                    let high = self.f64()?;
                    if bins == 0 || !low.is_finite() || !high.is_finite() || high <= low {
                        return Err(self.corrupt("degenerate axis"));
                    }
                    axes.push(Axis::new(bins, low, high));
                }
                let entries = self.f64()?;
                let contents = self.f64_vec()?;
                let sumw2 = self.f64_vec()?;
                let bin_entries = self.f64_vec()?;
                let hist = Histogram::from_raw(
                    &name, &title, axes, profile, contents, sumw2, bin_entries, entries,
                )
                .map_err(|detail| self.corrupt(detail))?;
                Ok(ArchiveNode::Hist { name, kind, hist })
            }
            TAG_NAMED => Ok(ArchiveNode::Named {
                name: self.string()?,
                title: self.string()?,
            }),
            other => Err(self.corrupt(format!("unknown node tag {other}"))),
        }
    }
}

/// Parse a whole archive file into its top-level objects.
fn read_file(filename: &Path) -> DqmResult<Vec<ArchiveNode>> {
    let data = fs::read(filename).map_err(|e| DqmError::ArchiveIo {
        path: filename.to_path_buf(),
        detail: format!("cannot read: {e}"),
    })?;
    let mut cursor = Cursor {
        data: &data,
        pos: 0,
        file: filename,
    };
    if data.len() < MAGIC.len() + 2 + 4 {
        return Err(cursor.corrupt("file too short to be an archive"));
    }
    let stored_crc = u32::from_le_bytes(data[data.len() - 4..].try_into().expect("len 4"));
    let computed_crc = crc32fast::hash(&data[..data.len() - 4]);
    if stored_crc != computed_crc {
        return Err(cursor.corrupt(format!(
            "checksum mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"
        )));
    }
    cursor.data = &data[..data.len() - 4];

    if cursor.take(MAGIC.len())? != MAGIC.as_slice() {
        return Err(cursor.corrupt("bad magic bytes"));
    }
    let version = cursor.u16()?;
    if version != FORMAT_VERSION {
        return Err(cursor.corrupt(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let count = cursor.u32()? as usize;
    let mut nodes = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        nodes.push(cursor.node(0)?);
    }
    Ok(nodes)
}

// ─── Save ───────────────────────────────────────────────────────────────────

/// Find or create the child directory `name`, returning its child list.
fn ensure_dir<'a>(children: &'a mut Vec<ArchiveNode>, name: &str) -> &'a mut Vec<ArchiveNode> {
    let pos = children.iter().position(
        |node| matches!(node, ArchiveNode::Directory { name: n, .. } if n == name),
    );
    let pos = pos.unwrap_or_else(|| {
        children.push(ArchiveNode::Directory {
            name: name.to_owned(),
            children: Vec::new(),
        });
        children.len() - 1
    });
    match &mut children[pos] {
        ArchiveNode::Directory { children, .. } => children,
        _ => unreachable!("position filtered to directories"),
    }
}

fn dir_children<'a>(
    root: &'a mut Vec<ArchiveNode>,
    path: &str,
) -> &'a mut Vec<ArchiveNode> {
    let mut slot = root;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        slot = ensure_dir(slot, component);
    }
    slot
}

/// Serialize the store (or one subtree) into an archive file.
///
/// Writes the two top-level version markers, then one payload per monitor
/// element under `DQMData/<dir>`, scalars as text objects, each quality
/// report at or above `min_status` as a sibling text object. Reference
/// mirrors are written only when their live element has reports attached.
pub fn save(store: &DqmStore, filename: &Path, options: &SaveOptions) -> DqmResult<()> {
    let rewrite = options
        .rewrite
        .as_ref()
        .map(|(pattern, replacement)| {
            Regex::new(pattern)
                .map(|rx| (rx, replacement.clone()))
                .map_err(|e| DqmError::BadPattern {
                    pattern: pattern.clone(),
                    detail: e.to_string(),
                })
        })
        .transpose()?;

    let mut top: Vec<ArchiveNode> = vec![
        ArchiveNode::Text {
            value: RELEASE_MARKER.to_owned(),
        },
        ArchiveNode::Text {
            value: patch_marker(),
        },
    ];

    let dirs: Vec<String> = store.index().dirs().cloned().collect();
    for dir in &dirs {
        if !options.path.is_empty() && !is_subdirectory(&options.path, dir) {
            continue;
        }
        for me in store.index().children_of(dir) {
            let full = me.fullname();

            // Reference mirrors ride along only when their live element has
            // at least one attached report.
            if is_subdirectory(REFERENCE_DIR, &full) {
                let master = &full[REFERENCE_DIR.len() + 1..];
                if !store
                    .get(master)
                    .is_some_and(|live| !live.qreports().is_empty())
                {
                    debug!(path = %full, "skipping unreferenced reference element");
                    continue;
                }
            }

            let written_dir = match &rewrite {
                Some((rx, replacement)) => rx.replace_all(dir, replacement.as_str()).into_owned(),
                None => dir.clone(),
            };
            let target = dir_children(&mut top, &join_path(MONITOR_DIR, &written_dir));

            match me.tag_string() {
                Some(text) => target.push(ArchiveNode::Text { value: text }),
                None => {
                    if let Some(hist) = me.histogram() {
                        target.push(ArchiveNode::Hist {
                            name: me.name().to_owned(),
                            kind: me.kind(),
                            hist: hist.clone(),
                        });
                    }
                }
            }

            if !is_subdirectory(REFERENCE_DIR, &full) {
                for report in me.qreports() {
                    if report.status.code() >= options.min_status {
                        target.push(ArchiveNode::Text {
                            value: me.quality_tag_string(report),
                        });
                    }
                }
            }
        }
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    put_u16(&mut buf, FORMAT_VERSION);
    let count = u32::try_from(top.len()).map_err(|_| DqmError::ArchiveIo {
        path: filename.to_path_buf(),
        detail: "too many top-level objects".into(),
    })?;
    put_u32(&mut buf, count);
    for node in &top {
        encode_node(&mut buf, node)?;
    }
    let crc = crc32fast::hash(&buf);
    put_u32(&mut buf, crc);

    let mut file = fs::File::create(filename).map_err(|e| DqmError::ArchiveIo {
        path: filename.to_path_buf(),
        detail: format!("cannot create: {e}"),
    })?;
    file.write_all(&buf)?;
    debug!(file = %filename.display(), bytes = buf.len(), "archive written");
    Ok(())
}

// ─── Open ───────────────────────────────────────────────────────────────────

/// Text-object payload: `<label>k=value</label>` with `k` in `{i,f,s,qr}`.
fn parse_me_text(text: &str) -> Option<(&str, char, &str)> {
    let rest = text.strip_prefix('<')?;
    let close = rest.find('>')?;
    let label = &rest[..close];
    let body = &rest[close + 1..];
    let mut suffix = String::with_capacity(label.len() + 3);
    suffix.push_str("</");
    suffix.push_str(label);
    suffix.push('>');
    let body = body.strip_suffix(suffix.as_str())?;
    let (kind, value) = match body.as_bytes() {
        [b'i', b'=', ..] => ('i', &body[2..]),
        [b'f', b'=', ..] => ('f', &body[2..]),
        [b's', b'=', ..] => ('s', &body[2..]),
        [b'q', b'r', b'=', ..] => ('q', &body[3..]),
        _ => return None,
    };
    Some((label, kind, value))
}

/// Quality-report payload: `st.<code>.<message>`.
fn parse_qr_value(value: &str) -> Option<(u32, &str)> {
    let rest = value.strip_prefix("st.")?;
    let dot = rest.find('.')?;
    let code: u32 = rest[..dot].parse().ok()?;
    Some((code, &rest[dot + 1..]))
}

/// Extract one non-directory object into `dir`. Returns true when counted.
fn extract(store: &mut DqmStore, node: &ArchiveNode, dir: &str, overwrite: bool) -> bool {
    match node {
        ArchiveNode::Hist { name, kind, hist } => {
            let full = join_path(dir, name);
            if store.get(&full).is_none() {
                if let Err(e) = store.book_histogram_in(dir, name, *kind, hist.clone()) {
                    warn!(path = %full, error = %e, "cannot extract histogram");
                    return false;
                }
                return true;
            }
            if overwrite {
                if let Some(target) = store.get_mut(&full).and_then(|me| me.histogram_mut()) {
                    *target = hist.clone();
                }
                store.get_mut(&full).expect("present").mark_updated();
                return true;
            }
            if DqmStore::is_collate_path(&full) || store.config().collate_histograms {
                let added = store
                    .get_mut(&full)
                    .and_then(|me| me.histogram_mut())
                    .is_some_and(|target| target.add(hist));
                if !added {
                    warn!(path = %full, "cannot collate histogram with different shape");
                    return false;
                }
                store.get_mut(&full).expect("present").mark_updated();
            }
            true
        }
        ArchiveNode::Text { value } => extract_text(store, value, dir, overwrite),
        ArchiveNode::Named { name, title } => {
            // Old payload form: re-encode and take the text path.
            debug!(name = %name, "extracting legacy named object");
            let text = format!("<{name}>{title}</{name}>");
            extract_text(store, &text, dir, overwrite)
        }
        ArchiveNode::Directory { .. } => false,
    }
}

fn extract_text(store: &mut DqmStore, value: &str, dir: &str, overwrite: bool) -> bool {
    let Some((label, kind, payload)) = parse_me_text(value) else {
        if value.contains("CMSSW") {
            debug!(marker = value, "input file release version");
            return true;
        }
        if value.contains("DQMPATCH") {
            debug!(marker = value, "input file patch version");
            return true;
        }
        warn!(object = value, "cannot extract text object");
        return false;
    };

    let full = join_path(dir, label);
    match kind {
        'i' => {
            let Ok(parsed) = payload.parse::<i64>() else {
                warn!(object = value, "malformed integer payload");
                return false;
            };
            if store.get(&full).is_none() || overwrite {
                let me = if store.get(&full).is_none() {
                    store.book_int_in(dir, label)
                } else {
                    Ok(store.get_mut(&full).expect("present"))
                };
                match me {
                    Ok(me) => me.fill_int(parsed),
                    Err(e) => {
                        warn!(path = %full, error = %e, "cannot extract integer");
                        return false;
                    }
                }
            }
            true
        }
        'f' => {
            let Ok(parsed) = payload.parse::<f64>() else {
                warn!(object = value, "malformed float payload");
                return false;
            };
            if store.get(&full).is_none() || overwrite {
                let me = if store.get(&full).is_none() {
                    store.book_real_in(dir, label)
                } else {
                    Ok(store.get_mut(&full).expect("present"))
                };
                match me {
                    Ok(me) => me.fill_real(parsed),
                    Err(e) => {
                        warn!(path = %full, error = %e, "cannot extract float");
                        return false;
                    }
                }
            }
            true
        }
        's' => {
            if store.get(&full).is_none() {
                if let Err(e) = store.book_string_in(dir, label, payload) {
                    warn!(path = %full, error = %e, "cannot extract string");
                    return false;
                }
            } else if overwrite {
                store.get_mut(&full).expect("present").fill_string(payload);
            }
            true
        }
        'q' => {
            // The label is `mename.qtname`, split at the first dot (the
            // emitter writes it that way).
            let Some(split) = label.find('.') else {
                warn!(label, "quality report label is missing a '.'");
                return false;
            };
            let (mename, qtname) = (&label[..split], &label[split + 1..]);
            let Some((code, message)) = parse_qr_value(payload) else {
                warn!(object = value, "quality test value is incorrectly formatted");
                return false;
            };
            let target = join_path(dir, mename);
            let algorithm = store
                .qtest(qtname)
                .map(|c| c.algo_name().to_owned())
                .unwrap_or_default();
            let Some(me) = store.get_mut(&target) else {
                warn!(path = %target, qtname, "no monitor element for quality report");
                return false;
            };
            me.attach_report(QReport {
                qtname: qtname.to_owned(),
                algorithm,
                status: Status::from_code(code),
                message: message.to_owned(),
                bad_channels: Vec::new(),
            });
            true
        }
        _ => false,
    }
}

/// Strip the top-level `DQMData` container from an archive directory label.
fn strip_container(label: &str) -> &str {
    if label == MONITOR_DIR {
        ""
    } else {
        label
            .strip_prefix(MONITOR_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(label)
    }
}

/// Apply the prepend prefix to a stripped directory label, with the special
/// casing of the `Collate`/`Reference` prefixes. Returns `None` when the
/// whole directory is skipped.
fn apply_prepend(stripped: &str, prepend: Option<&str>) -> Option<String> {
    let mut dirpart = stripped.to_owned();
    match prepend {
        Some(prefix) if prefix == COLLATE_DIR || prefix == REFERENCE_DIR => {
            if let Some(slash) = dirpart.find('/') {
                // Skip per-source EventInfo bookkeeping.
                if dirpart[slash + 1..] == *"EventInfo" {
                    return None;
                }
                // Skip an already-prefixed nested copy.
                if dirpart[slash + 1..] == *prefix {
                    return None;
                }
                // Strip run-scoped wrapping.
                if dirpart.starts_with("Run ") {
                    dirpart = dirpart[slash + 1..].to_owned();
                }
                if let Some(pos) = dirpart.find("/Run summary") {
                    dirpart.replace_range(pos..pos + "/Run summary".len(), "");
                }
            }
            Some(join_path(prefix, &dirpart))
        }
        Some(prefix) => Some(join_path(prefix, &dirpart)),
        None => Some(dirpart),
    }
}

fn read_directory(
    store: &mut DqmStore,
    children: &[ArchiveNode],
    label: &str,
    options: &OpenOptions,
) -> DqmResult<usize> {
    let stripped = strip_container(label);
    let Some(dirpart) = apply_prepend(stripped, options.prepend.as_deref()) else {
        return Ok(0);
    };
    // The subtree filter applies to the un-prefixed path.
    let skip = !options.only_path.is_empty() && !is_subdirectory(&options.only_path, stripped);

    let mut count = 0;
    for child in children {
        if let ArchiveNode::Directory { name, children } = child {
            let sub = if label.is_empty() {
                name.clone()
            } else {
                join_path(label, name)
            };
            count += read_directory(store, children, &sub, options)?;
        } else if !skip {
            store.ensure_directory(&dirpart)?;
            if extract(store, child, &dirpart, options.overwrite) {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Read an archive into the store, returning the number of extracted
/// objects. See [`OpenOptions`] for the overwrite/filter/prepend rules.
pub fn open(store: &mut DqmStore, filename: &Path, options: &OpenOptions) -> DqmResult<usize> {
    debug!(file = %filename.display(), "reading archive");
    let top = read_file(filename)?;
    let count = read_directory(store, &top, "", options)?;
    debug!(file = %filename.display(), count, "archive read");
    Ok(count)
}

// ─── Version probes ─────────────────────────────────────────────────────────

fn top_level_marker(filename: &Path, prefix: &str) -> DqmResult<Option<String>> {
    let top = read_file(filename)?;
    for node in top {
        if let ArchiveNode::Text { value } = node
            && (value.starts_with(prefix) || value.starts_with(&format!("\"{prefix}")))
        {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// The producer release marker of an archive, when present.
pub fn release_version(filename: &Path) -> DqmResult<Option<String>> {
    top_level_marker(filename, "CMSSW")
}

/// The `DQMPATCH` marker of an archive, when present.
pub fn patch_version(filename: &Path) -> DqmResult<Option<String>> {
    top_level_marker(filename, "DQMPATCH")
}
