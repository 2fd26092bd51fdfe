//! Pragma lexer/parser (spec §4.C) and the `pv`-boundary chain-composition
//! grouping it feeds to [`crate::merge`].

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Poll,
    Notify,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSpec {
    pub period_seconds: f64,
    pub method: UpdateMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMethod {
    Scan,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchiveSpec {
    pub period_seconds: f64,
    pub method: ArchiveMethod,
}

/// One normalized `(key, value)` directive from a pragma (spec §3 table).
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Pv(String),
    Io(Direction),
    Field(String, String),
    Update(UpdateSpec),
    Archive(ArchiveSpec),
    ArchiveFields(Vec<String>),
    AutosavePass0(Vec<String>),
    AutosavePass1(Vec<String>),
    AutosaveInputPass0(Vec<String>),
    AutosaveInputPass1(Vec<String>),
    AutosaveOutputPass0(Vec<String>),
    AutosaveOutputPass1(Vec<String>),
    Link(String),
    Array(String),
    Expand(String),
    Scale(String),
    Offset(String),
    MacroCharacter(char),
    Type(String),
    Str(String),
    /// Unknown key: non-fatal, ignored for merging but kept for diagnostics.
    Unknown(String, String),
}

impl Directive {
    pub fn key_name(&self) -> &'static str {
        match self {
            Directive::Pv(_) => "pv",
            Directive::Io(_) => "io",
            Directive::Field(..) => "field",
            Directive::Update(_) => "update",
            Directive::Archive(_) => "archive",
            Directive::ArchiveFields(_) => "archive_fields",
            Directive::AutosavePass0(_) => "autosave_pass0",
            Directive::AutosavePass1(_) => "autosave_pass1",
            Directive::AutosaveInputPass0(_) => "autosave_input_pass0",
            Directive::AutosaveInputPass1(_) => "autosave_input_pass1",
            Directive::AutosaveOutputPass0(_) => "autosave_output_pass0",
            Directive::AutosaveOutputPass1(_) => "autosave_output_pass1",
            Directive::Link(_) => "link",
            Directive::Array(_) => "array",
            Directive::Expand(_) => "expand",
            Directive::Scale(_) => "scale",
            Directive::Offset(_) => "offset",
            Directive::MacroCharacter(_) => "macro_character",
            Directive::Type(_) => "type",
            Directive::Str(_) => "str",
            Directive::Unknown(..) => "unknown",
        }
    }
}

/// One `pv`-delimited segment of a pragma. `pv` is `None` for directives that
/// precede the first `pv` token (or for a pragma with none at all) — these
/// carry level-wide defaults down to whatever `pv` segment eventually follows
/// them in the chain (spec §4.E: "configurations from different levels are
/// combined in declaration order").
#[derive(Debug, Clone, Default)]
pub struct PragmaConfig {
    pub pv: Option<String>,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, Default)]
pub struct Pragma {
    pub directives: Vec<Directive>,
}

impl Pragma {
    /// Split at every `pv` key into ordered per-PV segments (spec §4.C/§4.E).
    ///
    /// Keys written before the level's first `pv` have no configuration of
    /// their own to belong to (spec §3: "subsequent keys up to the next `pv`
    /// belong to that configuration" — never "preceding"). When the level
    /// goes on to fan out into one or more real `pv`-bearing segments, those
    /// leading keys are instead prepended to every one of them, so a shared
    /// default written before a multi-`pv` fan-out still applies to each
    /// branch instead of surfacing as a bogus pv-less configuration of its
    /// own (which would otherwise fail the merge with "no pv directive
    /// anywhere"). A level with no `pv` key at all keeps its single pv-less
    /// segment as-is — that's the ordinary case of an intermediate level
    /// contributing only inherited defaults down the chain.
    pub fn configs(&self) -> Vec<PragmaConfig> {
        let mut configs: Vec<PragmaConfig> = Vec::new();
        let mut current = PragmaConfig::default();
        let mut started = false;
        for d in &self.directives {
            if let Directive::Pv(v) = d {
                if started || !current.directives.is_empty() {
                    configs.push(std::mem::take(&mut current));
                }
                started = true;
                current.pv = Some(v.clone());
                continue;
            }
            current.directives.push(d.clone());
        }
        configs.push(current);

        if configs.len() > 1 && configs[0].pv.is_none() {
            let leading = configs.remove(0);
            for cfg in &mut configs {
                let mut merged = leading.directives.clone();
                merged.extend(std::mem::take(&mut cfg.directives));
                cfg.directives = merged;
            }
        }
        configs
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Parse the raw pragma attribute text into an ordered directive list (spec §4.C).
///
/// Missing/empty pragmas are not errors — they return an empty [`Pragma`],
/// which causes no chain to be emitted through that item (spec §3 invariant).
pub fn parse(raw: &str) -> Result<Pragma> {
    let content = strip_framing(raw)?;
    if content.trim().is_empty() {
        return Ok(Pragma::default());
    }

    let mut directives = Vec::new();
    for line in content.split(['\n', ';']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        directives.push(parse_directive(key, value)?);
    }
    Ok(Pragma { directives })
}

/// Strip the `{attribute 'pytmc' := '...'}` framing if present. Unframed text
/// is returned unchanged. An opening brace with no matching, balanced close
/// (or a malformed quoted span) is `MalformedPragma` (spec §4.C).
fn strip_framing(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }
    if !trimmed.ends_with('}') {
        return Err(CompileError::MalformedPragma {
            path: String::new(),
            reason: "unbalanced attribute framing: missing closing '}'".to_string(),
        });
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    let first_quote = inner.find('\'');
    let last_quote = inner.rfind('\'');
    match (first_quote, last_quote) {
        (Some(a), Some(b)) if b > a => Ok(inner[a + 1..b].to_string()),
        _ => Err(CompileError::MalformedPragma {
            path: String::new(),
            reason: "unbalanced attribute framing: missing quoted body".to_string(),
        }),
    }
}

fn parse_directive(key: &str, value: &str) -> Result<Directive> {
    Ok(match key {
        "pv" => Directive::Pv(value.to_string()),
        "io" => Directive::Io(parse_direction(value)?),
        "field" => {
            let (name, val) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
            Directive::Field(name.trim().to_string(), val.trim().to_string())
        }
        "update" => Directive::Update(parse_update_spec(value)?),
        "archive" => Directive::Archive(parse_archive_spec(value)?),
        "archive_fields" => Directive::ArchiveFields(split_words(value)),
        "autosave_pass0" => Directive::AutosavePass0(split_words(value)),
        "autosave_pass1" => Directive::AutosavePass1(split_words(value)),
        "autosave_input_pass0" => Directive::AutosaveInputPass0(split_words(value)),
        "autosave_input_pass1" => Directive::AutosaveInputPass1(split_words(value)),
        "autosave_output_pass0" => Directive::AutosaveOutputPass0(split_words(value)),
        "autosave_output_pass1" => Directive::AutosaveOutputPass1(split_words(value)),
        "link" => Directive::Link(value.to_string()),
        "array" => Directive::Array(value.to_string()),
        "expand" => Directive::Expand(value.to_string()),
        "scale" => Directive::Scale(value.to_string()),
        "offset" => Directive::Offset(value.to_string()),
        "macro_character" => {
            let c = value.trim().chars().next().unwrap_or('@');
            Directive::MacroCharacter(c)
        }
        "type" => Directive::Type(value.to_string()),
        "str" => Directive::Str(value.to_string()),
        other => Directive::Unknown(other.to_string(), value.to_string()),
    })
}

fn parse_direction(value: &str) -> Result<Direction> {
    match value.trim().to_ascii_lowercase().as_str() {
        "i" | "input" | "ro" => Ok(Direction::Input),
        "o" | "output" | "rw" | "io" => Ok(Direction::Output),
        other => Err(CompileError::MalformedPragma {
            path: String::new(),
            reason: format!("unrecognized io direction {other:?}"),
        }),
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Split a rate token like `10Hz`, `1 s`, `.5s` into `(magnitude, unit)`.
fn split_rate_token(token: &str) -> Option<(f64, &str)> {
    let token = token.trim();
    let unit_start = token.find(|c: char| c.is_alphabetic())?;
    let (num, unit) = token.split_at(unit_start);
    let magnitude: f64 = num.trim().parse().ok()?;
    Some((magnitude, unit.trim()))
}

fn parse_update_spec(value: &str) -> Result<UpdateSpec> {
    let mut parts = value.split_whitespace();
    let rate_tok = parts.next().ok_or_else(|| CompileError::MalformedPragma {
        path: String::new(),
        reason: "update: missing rate".to_string(),
    })?;
    let (magnitude, unit) = split_rate_token(rate_tok).ok_or_else(|| CompileError::MalformedPragma {
        path: String::new(),
        reason: format!("update: cannot parse rate {rate_tok:?}"),
    })?;
    let period_seconds = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => magnitude,
        "hz" => 1.0 / magnitude,
        other => {
            return Err(CompileError::MalformedPragma {
                path: String::new(),
                reason: format!("update: unrecognized rate unit {other:?}"),
            });
        }
    };
    let method = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("poll") => UpdateMethod::Poll,
        Some("notify") => UpdateMethod::Notify,
        Some(other) => {
            return Err(CompileError::MalformedPragma {
                path: String::new(),
                reason: format!("update: unrecognized method {other:?}"),
            });
        }
    };
    Ok(UpdateSpec { period_seconds, method })
}

fn parse_archive_spec(value: &str) -> Result<ArchiveSpec> {
    let mut parts = value.split_whitespace();
    let rate_tok = parts.next().ok_or_else(|| CompileError::MalformedPragma {
        path: String::new(),
        reason: "archive: missing rate".to_string(),
    })?;
    let (magnitude, unit) = split_rate_token(rate_tok).ok_or_else(|| CompileError::MalformedPragma {
        path: String::new(),
        reason: format!("archive: cannot parse rate {rate_tok:?}"),
    })?;
    let period_seconds = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => magnitude,
        "hz" => 1.0 / magnitude,
        other => {
            return Err(CompileError::MalformedPragma {
                path: String::new(),
                reason: format!("archive: unrecognized rate unit {other:?}"),
            });
        }
    };
    let method = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("scan") => ArchiveMethod::Scan,
        Some("monitor") => ArchiveMethod::Monitor,
        Some(other) => {
            return Err(CompileError::MalformedPragma {
                path: String::new(),
                reason: format!("archive: unrecognized method {other:?}"),
            });
        }
    };
    Ok(ArchiveSpec { period_seconds, method })
}

/// Parse an `array:` selector value — a comma list of `N`, `N..M`, `N..`, `..M`
/// — into inclusive `(lower, upper)` ranges, resolved against an array's
/// actual bounds by the caller (spec §3, §4.D).
pub fn parse_array_selector(value: &str) -> Result<Vec<(Option<i64>, Option<i64>)>> {
    let mut out = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once("..") {
            let lo = lo.trim();
            let hi = hi.trim();
            let lo = if lo.is_empty() { None } else { Some(lo.parse::<i64>().map_err(|_| selector_err(value))?) };
            let hi = if hi.is_empty() { None } else { Some(hi.parse::<i64>().map_err(|_| selector_err(value))?) };
            out.push((lo, hi));
        } else {
            let n = part.parse::<i64>().map_err(|_| selector_err(value))?;
            out.push((Some(n), Some(n)));
        }
    }
    Ok(out)
}

fn selector_err(value: &str) -> CompileError {
    CompileError::MalformedPragma {
        path: String::new(),
        reason: format!("array: cannot parse selector {value:?}"),
    }
}
