//! Record package builder (spec §4.F): turns a [`Chain`] + its merged
//! [`Configuration`] into one or more [`RecordPackage`]s — ordinary
//! bidirectional PVs produce an output record plus a `_RBV` readback.

use crate::chain::{Chain, LeafKind};
use crate::diag::Diagnostics;
use crate::error::{CompileError, Result};
use crate::merge::Configuration;
use crate::pragma::{ArchiveMethod, Direction, UpdateMethod};
use crate::types::{EnumInfo, PlcPrimitive};

/// Standard EPICS poll rates (menuScan), ascending. A requested update period
/// that falls between two entries rounds up to the next slower one — a
/// record is never scanned faster than what was asked for (spec §4.F).
const SCAN_RATES: &[(f64, &str)] = &[
    (0.1, ".1 second"),
    (0.2, ".2 second"),
    (0.5, ".5 second"),
    (1.0, "1 second"),
    (2.0, "2 second"),
    (5.0, "5 second"),
    (10.0, "10 second"),
];

const DEFAULT_MAX_NAME_LEN: usize = 60;
const DEFAULT_MACRO_CHARACTER: char = '@';
const MAX_ARCHIVED_ARRAY_ELEMENTS: u64 = 1000;

/// Default autosave pass-0 field list applied when a configuration's pragma
/// doesn't specify one itself (spec §4.F step 4: "include description field,
/// alarm severities and limits on all relevant records"; spec §8 scenario 2
/// exercises this with a bare `pv:`/`io:` pragma and no `autosave_pass0` at
/// all).
const DEFAULT_AUTOSAVE_BASE_FIELDS: &[&str] = &["DESC", "HIHI", "HHSV", "LOLO", "LLSV", "HOPR", "LOPR"];

/// Additional default pass-0 fields for output records only (spec §4.F step
/// 4: "control-limit fields on outputs by default").
const DEFAULT_AUTOSAVE_OUTPUT_FIELDS: &[&str] = &["DRVL", "DRVH"];

#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub max_name_len: usize,
    pub ads_port: u32,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
            ads_port: 851,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordPackage {
    pub pv: String,
    pub record_type: String,
    pub fields: Vec<(String, String)>,
    pub infos: Vec<(String, String)>,
}

/// Build every record a chain's configuration produces. A scalar input
/// pragma yields one record; a scalar output pragma yields two (the output
/// itself, plus a `_RBV` readback) per spec §4.F / §8 scenario 2.
pub fn build_records(
    chain: &Chain,
    cfg: &Configuration,
    opts: &RecordOptions,
    diag: &mut Diagnostics,
) -> Result<Vec<RecordPackage>> {
    let direction = cfg.direction.unwrap_or(Direction::Input);
    let mut kind = RecordKind::classify(&chain.leaf);
    if let Some(type_name) = &cfg.type_override {
        kind = apply_type_override(kind, type_name, &chain.tcname, diag);
    }

    check_name_len(&cfg.pv, opts.max_name_len, &chain.tcname)?;

    let mut out = Vec::new();
    match direction {
        Direction::Input => {
            out.push(build_one(chain, cfg, kind, Direction::Input, &cfg.pv, opts, diag, true)?);
        }
        Direction::Output => {
            out.push(build_one(chain, cfg, kind, Direction::Output, &cfg.pv, opts, diag, true)?);
            let rbv_pv = format!("{}_RBV", cfg.pv);
            check_name_len(&rbv_pv, opts.max_name_len, &chain.tcname)?;
            out.push(build_one(chain, cfg, kind, Direction::Input, &rbv_pv, opts, diag, false)?);
        }
    }
    Ok(out)
}

fn check_name_len(pv: &str, max: usize, tcname: &str) -> Result<()> {
    if pv.len() > max {
        return Err(CompileError::InvalidChain {
            tcname: tcname.to_string(),
            reason: format!("record name {pv:?} exceeds max length {max}"),
        });
    }
    Ok(())
}

/// Integer element width, per spec §4.B's type table: BYTE/SINT/USINT is an
/// 8-bit array element, WORD/INT/UINT/ENUM is 16-bit, DWORD/DINT/UDINT is
/// 32-bit. Scalar records don't care (every width renders `longin`/`longout`
/// with an `Int32` transport), but array element kind/`FTVL` must track it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntWidth {
    W8,
    W16,
    W32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElemKind {
    Bool,
    Integer(IntWidth),
    Float,
    StringType,
    EnumType,
}

#[derive(Debug, Clone, Copy)]
struct RecordKind {
    elem: ElemKind,
    is_array: bool,
}

impl RecordKind {
    fn classify(leaf: &LeafKind) -> RecordKind {
        match leaf {
            // STRING(n) is always a waveform of char, regardless of whether the
            // declaration itself carries an `ArrayInfo` (spec §4.B: "STRING(n) |
            // waveform of char"; §4.F.1: "if the type is string or array,
            // substitute waveform").
            LeafKind::Primitive(PlcPrimitive::StringN(_)) => RecordKind { elem: ElemKind::StringType, is_array: true },
            LeafKind::Primitive(p) => RecordKind { elem: elem_kind_of(*p), is_array: false },
            LeafKind::PrimitiveArray { prim, .. } => RecordKind { elem: elem_kind_of(*prim), is_array: true },
            LeafKind::Enum(_) => RecordKind { elem: ElemKind::EnumType, is_array: false },
        }
    }

    fn record_type(&self, direction: Direction) -> &'static str {
        if self.is_array {
            return "waveform";
        }
        match (self.elem, direction) {
            (ElemKind::Bool, Direction::Input) => "bi",
            (ElemKind::Bool, Direction::Output) => "bo",
            (ElemKind::EnumType, Direction::Input) => "mbbi",
            (ElemKind::EnumType, Direction::Output) => "mbbo",
            (ElemKind::StringType, Direction::Input) => "stringin",
            (ElemKind::StringType, Direction::Output) => "stringout",
            (ElemKind::Float, Direction::Input) => "ai",
            (ElemKind::Float, Direction::Output) => "ao",
            (ElemKind::Integer(_), Direction::Input) => "longin",
            (ElemKind::Integer(_), Direction::Output) => "longout",
        }
    }

    /// `FTVL` for a waveform's element type — only meaningful when `is_array`.
    fn ftvl(&self) -> &'static str {
        match self.elem {
            ElemKind::Bool => "UCHAR",
            ElemKind::Integer(IntWidth::W8) => "CHAR",
            ElemKind::Integer(IntWidth::W16) => "SHORT",
            ElemKind::Integer(IntWidth::W32) => "LONG",
            ElemKind::Float => "DOUBLE",
            ElemKind::StringType => "STRING",
            ElemKind::EnumType => "LONG",
        }
    }

    /// `asyn*` transport base for a scalar record — every integer width
    /// shares the same `Int32` primary transport at scalar granularity (spec
    /// §4.B: "Primary data transport: int32" for the whole BYTE..UDINT range).
    fn asyn_base_scalar(&self) -> &'static str {
        match self.elem {
            ElemKind::Bool => "UInt32Digital",
            ElemKind::Integer(_) | ElemKind::EnumType => "Int32",
            ElemKind::Float => "Float64",
            ElemKind::StringType => "Octet",
        }
    }

    /// `asyn*Array` transport base for a waveform record — width-specific for
    /// the integer family (spec §4.B: int8/int16/int32 array per source type).
    fn asyn_base_array(&self) -> &'static str {
        match self.elem {
            ElemKind::Bool => "Int8",
            ElemKind::Integer(IntWidth::W8) => "Int8",
            ElemKind::Integer(IntWidth::W16) => "Int16",
            ElemKind::Integer(IntWidth::W32) => "Int32",
            ElemKind::Float => "Float64",
            ElemKind::StringType => "Octet",
            ElemKind::EnumType => "Int32",
        }
    }
}

/// Apply a `type:` pragma override (spec §3, §9 Open Question 1): an explicit
/// record-kind override is authoritative over the inferred `(ElemKind,
/// is_array)` pair, but a mismatch between the two is surfaced as a warning
/// rather than silently swallowed or rejected — the author presumably meant
/// to force a non-default record type, so the override wins either way.
/// An unrecognized override name is itself a warning and the inferred kind
/// is used unchanged.
fn apply_type_override(inferred: RecordKind, type_name: &str, tcname: &str, diag: &mut Diagnostics) -> RecordKind {
    let Some(overridden) = override_kind(type_name, inferred.elem) else {
        diag.warn(
            format!("type: unrecognized record-kind override {type_name:?}; using the inferred record kind"),
            Some(tcname.to_string()),
        );
        return inferred;
    };
    if overridden.elem != inferred.elem || overridden.is_array != inferred.is_array {
        diag.warn(
            format!("type: {type_name:?} overrides the inferred record kind for {tcname}; proceeding with the explicit override"),
            Some(tcname.to_string()),
        );
    }
    overridden
}

/// Map a `type:` override value (an EPICS record-type name, direction-neutral)
/// to the `(ElemKind, is_array)` pair that drives DTYP/FTVL/field assembly.
/// `waveform` keeps the inferred element kind (a waveform's element type is a
/// property of the leaf, not something the override names) and only forces
/// `is_array`.
fn override_kind(type_name: &str, inferred_elem: ElemKind) -> Option<RecordKind> {
    let (elem, is_array) = match type_name.trim() {
        "ai" | "ao" => (ElemKind::Float, false),
        "bi" | "bo" => (ElemKind::Bool, false),
        "longin" | "longout" => (ElemKind::Integer(IntWidth::W32), false),
        "mbbi" | "mbbo" => (ElemKind::EnumType, false),
        "stringin" | "stringout" => (ElemKind::StringType, false),
        "waveform" => (inferred_elem, true),
        _ => return None,
    };
    Some(RecordKind { elem, is_array })
}

fn elem_kind_of(prim: PlcPrimitive) -> ElemKind {
    if prim.is_float() {
        ElemKind::Float
    } else if prim.is_string() {
        ElemKind::StringType
    } else if matches!(prim, PlcPrimitive::Bool) {
        ElemKind::Bool
    } else {
        ElemKind::Integer(int_width_of(prim))
    }
}

/// Array-element width for the integer family (spec §4.B): BYTE/SINT/USINT is
/// 8-bit, WORD/INT/UINT/ENUM is 16-bit, DWORD/DINT/UDINT/LWORD/LINT/ULINT is
/// 32-bit — EPICS has no native 64-bit waveform element, so the 64-bit PLC
/// integers still render as the widest array kind this crate supports.
fn int_width_of(prim: PlcPrimitive) -> IntWidth {
    match prim {
        PlcPrimitive::Byte | PlcPrimitive::Sint | PlcPrimitive::Usint => IntWidth::W8,
        PlcPrimitive::Word | PlcPrimitive::Int | PlcPrimitive::Uint | PlcPrimitive::Enum => IntWidth::W16,
        _ => IntWidth::W32,
    }
}

/// `is_primary` marks the record that carries the configuration's own value
/// (the only record for an input-direction chain; the output record, not its
/// `_RBV`, for an output-direction chain) — archiving attaches there (spec §8
/// scenario 6), while autosave's direction-agnostic `autosave_pass{0,1}` keys
/// attach to every record a configuration produces (spec §8 scenario 2).
#[allow(clippy::too_many_arguments)]
fn build_one(
    chain: &Chain,
    cfg: &Configuration,
    kind: RecordKind,
    direction: Direction,
    pv: &str,
    opts: &RecordOptions,
    diag: &mut Diagnostics,
    is_primary: bool,
) -> Result<RecordPackage> {
    let macro_char = cfg.macro_character.unwrap_or(DEFAULT_MACRO_CHARACTER);
    let record_type = kind.record_type(direction).to_string();
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut infos: Vec<(String, String)> = Vec::new();

    let dtyp = if kind.elem == ElemKind::StringType {
        // A string waveform still talks over the same asynOctet transport a
        // stringin/stringout would use (spec §4.B), not asynOctetArrayIn/Out.
        if direction == Direction::Input { "asynOctetRead".to_string() } else { "asynOctetWrite".to_string() }
    } else if kind.is_array {
        format!("asyn{}Array{}", kind.asyn_base_array(), if direction == Direction::Input { "In" } else { "Out" })
    } else {
        format!("asyn{}", kind.asyn_base_scalar())
    };
    fields.push(("DTYP".to_string(), dtyp));

    let link = substitute_macros(&format!("@asyn($(PORT),0,1)ADSPORT={}/{}", opts.ads_port, chain.tcname), macro_char);
    if direction == Direction::Input {
        fields.push(("INP".to_string(), link));
    } else {
        fields.push(("OUT".to_string(), link));
    }

    if let Some(update) = cfg.update {
        fields.push(("SCAN".to_string(), scan_field(update.method, update.period_seconds, &chain.tcname, diag)));
    } else if direction == Direction::Input {
        // No `update:` directive at all: default to the slowest-but-one poll
        // rate rather than change notification (spec §4.F.2: "Default 1 second").
        fields.push(("SCAN".to_string(), "1 second".to_string()));
    }

    if kind.is_array {
        let nelm = match &chain.leaf {
            LeafKind::PrimitiveArray { array, .. } => Some(array.element_count()),
            // A bare STRING(n) carries its own element count as its declared
            // length, not an ArrayInfo (spec §4.B: "waveform of char").
            LeafKind::Primitive(PlcPrimitive::StringN(n)) => Some(*n as u64),
            _ => None,
        };
        if let Some(nelm) = nelm {
            fields.push(("NELM".to_string(), nelm.to_string()));
        }
        fields.push(("FTVL".to_string(), kind.ftvl().to_string()));
    }

    if kind.elem == ElemKind::Float {
        fields.push(("PREC".to_string(), "3".to_string()));
    }

    if kind.elem == ElemKind::EnumType {
        if let LeafKind::Enum(info) = &chain.leaf {
            if info.values.len() > MBBI_MAX_STATES {
                diag.warn(
                    format!(
                        "enum has {} values, exceeding the {MBBI_MAX_STATES} states an mbbi/mbbo record can hold; extra values are dropped",
                        info.values.len()
                    ),
                    Some(chain.tcname.clone()),
                );
            }
            for (field, value) in mbbi_choice_fields(info) {
                fields.push((field, value));
            }
        }
    }

    if direction == Direction::Output && autosave_requests_pini(cfg) {
        fields.push(("PINI".to_string(), "YES".to_string()));
    }

    if direction == Direction::Input {
        fields.push(("ASG".to_string(), "NO_WRITE".to_string()));
    }

    // `link:` aliases an output's forward-link field to another PV (spec §3,
    // §8 scenario 8: "link: ... on an output; emitted DOL contains ...").
    if direction == Direction::Output {
        if let Some(link) = &cfg.link {
            set_field(&mut fields, "DOL", &substitute_macros(link, macro_char));
        }
    }

    for (name, value) in &cfg.fields {
        set_field(&mut fields, name, &substitute_macros(value, macro_char));
    }

    if let Some(scale) = &cfg.scale {
        fields.push(("ASLO".to_string(), substitute_macros(scale, macro_char)));
    }
    if let Some(offset) = &cfg.offset {
        fields.push(("AOFF".to_string(), substitute_macros(offset, macro_char)));
    }
    if let Some(desc) = cfg.fields.get("DESC") {
        set_field(&mut fields, "DESC", &substitute_macros(desc, macro_char));
    }

    if is_primary {
        if let Some(archive) = archive_info(chain, cfg, diag) {
            infos.push(archive);
        }
    }
    // `autosave_pass{0,1}` apply to both directions (spec §3 table), so every
    // record a configuration produces carries them; the directional variants
    // layer on top for just the output record or just the input/_RBV side.
    let mut pass0 = cfg.autosave_pass0.clone();
    let mut pass1 = cfg.autosave_pass1.clone();
    if direction == Direction::Output {
        union_extend(&mut pass0, &cfg.autosave_output_pass0);
        union_extend(&mut pass1, &cfg.autosave_output_pass1);
    } else {
        union_extend(&mut pass0, &cfg.autosave_input_pass0);
        union_extend(&mut pass1, &cfg.autosave_input_pass1);
    }
    if pass0.is_empty() {
        pass0.extend(DEFAULT_AUTOSAVE_BASE_FIELDS.iter().map(|s| s.to_string()));
        if direction == Direction::Output {
            pass0.extend(DEFAULT_AUTOSAVE_OUTPUT_FIELDS.iter().map(|s| s.to_string()));
        }
    }
    push_list_info(&mut infos, "autosaveFields_pass0", &pass0);
    push_list_info(&mut infos, "autosaveFields_pass1", &pass1);
    if !cfg.archive_fields.is_empty() {
        infos.push(("archive_fields".to_string(), cfg.archive_fields.join(" ")));
    }

    sort_fields(&mut fields);

    Ok(RecordPackage {
        pv: pv.to_string(),
        record_type,
        fields,
        infos,
    })
}

fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some(existing) = fields.iter_mut().find(|(n, _)| n == name) {
        existing.1 = value.to_string();
    } else {
        fields.push((name.to_string(), value.to_string()));
    }
}

fn push_list_info(infos: &mut Vec<(String, String)>, key: &str, list: &[String]) {
    if list.is_empty() {
        return;
    }
    infos.push((key.to_string(), list.join(" ")));
}

fn autosave_requests_pini(cfg: &Configuration) -> bool {
    !cfg.autosave_pass0.is_empty() || !cfg.autosave_output_pass0.is_empty()
}

fn archive_info(chain: &Chain, cfg: &Configuration, diag: &mut Diagnostics) -> Option<(String, String)> {
    let archive = cfg.archive?;
    if let LeafKind::PrimitiveArray { array, .. } = &chain.leaf {
        if array.element_count() > MAX_ARCHIVED_ARRAY_ELEMENTS {
            diag.warn(
                format!(
                    "array has {} elements, exceeding the {MAX_ARCHIVED_ARRAY_ELEMENTS}-element archive limit; omitting archive info",
                    array.element_count()
                ),
                Some(chain.tcname.clone()),
            );
            return None;
        }
    }
    let mut period = archive.period_seconds;
    if let Some(update) = cfg.update {
        if period < update.period_seconds {
            diag.warn(
                format!("archive rate faster than update rate; capping archive period at {}s", update.period_seconds),
                Some(chain.tcname.clone()),
            );
            period = update.period_seconds;
        }
    }
    let method = match archive.method {
        ArchiveMethod::Scan => "scan",
        ArchiveMethod::Monitor => "monitor",
    };
    Some(("archive".to_string(), format!("{period} {method}")))
}

fn scan_field(method: UpdateMethod, period_seconds: f64, tcname: &str, diag: &mut Diagnostics) -> String {
    if method == UpdateMethod::Notify {
        return "I/O Intr".to_string();
    }
    for (rate, label) in SCAN_RATES {
        if period_seconds <= *rate + f64::EPSILON {
            return (*label).to_string();
        }
    }
    let (slowest_rate, slowest_label) = SCAN_RATES.last().copied().unwrap();
    diag.warn(
        format!("update period {period_seconds}s exceeds the slowest available scan rate ({slowest_rate}s); using it anyway"),
        Some(tcname.to_string()),
    );
    slowest_label.to_string()
}

/// Number of discrete states an EPICS mbbi/mbbo record can represent (`ZRVL`
/// through `SFVL`, values 0 through 15).
const MBBI_MAX_STATES: usize = 16;

fn mbbi_choice_fields(info: &EnumInfo) -> Vec<(String, String)> {
    const VAL_LETTERS: &[&str] =
        &["ZR", "ON", "TW", "TH", "FR", "FV", "SX", "SV", "EI", "NI", "TE", "EL", "TV", "FT", "FF", "SF"];
    let mut out = Vec::new();
    for (letter, (value, text)) in VAL_LETTERS.iter().zip(info.values.iter()) {
        out.push((format!("{letter}VL"), value.to_string()));
        out.push((format!("{letter}ST"), text.clone()));
    }
    out
}

/// Translate `{macro_char}(NAME)` into the EPICS macro syntax `$(NAME)`
/// (spec §4.F: pragma text uses a configurable stand-in so attribute values
/// don't have to embed a literal `$`).
fn substitute_macros(value: &str, macro_char: char) -> String {
    let from = format!("{macro_char}(");
    value.replace(&from, "$(")
}

const FIELD_PRIORITY: &[&str] = &["DTYP", "SCAN", "INP", "OUT", "NELM", "FTVL", "PREC", "PINI", "ASG"];

fn sort_fields(fields: &mut [(String, String)]) {
    fields.sort_by(|a, b| {
        let pa = FIELD_PRIORITY.iter().position(|f| *f == a.0);
        let pb = FIELD_PRIORITY.iter().position(|f| *f == b.0);
        match (pa, pb) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        }
    });
}
