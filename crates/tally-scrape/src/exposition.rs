//! Prometheus text exposition format.
//!
//! Parses the plaintext body served by a `/metrics` endpoint into metric
//! families. Samples are grouped under the most recent `# TYPE` declaration
//! when their name matches it (including the type's reserved suffixes such
//! as `_total` or `_bucket`); anything else opens a new untyped family.

use crate::error::{ParseError, ParseErrorKind};

/// The declared type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "histogram" => Some(Self::Histogram),
            "summary" => Some(Self::Summary),
            "untyped" | "unknown" => Some(Self::Untyped),
            _ => None,
        }
    }

    /// Sample name suffixes that still belong to a family of this type.
    fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Counter => &["_total", "_created"],
            Self::Histogram => &["_bucket", "_sum", "_count", "_created"],
            Self::Summary => &["_sum", "_count", "_created"],
            Self::Gauge | Self::Untyped => &[],
        }
    }
}

/// A single labelled measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    /// Labels in exposition order.
    pub labels: Vec<(String, String)>,
    pub value: f64,
    /// Optional timestamp in milliseconds since the epoch. Kept as a float
    /// since some exporters write it in exponent form.
    pub timestamp_ms: Option<f64>,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            value,
            timestamp_ms: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Look up a label value by name.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A named group of samples sharing a type and help text.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub kind: MetricType,
    pub help: Option<String>,
    pub samples: Vec<Sample>,
    /// The name as written in `# HELP`/`# TYPE` lines, before any
    /// `_total` normalization.
    declared: String,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricType) -> Self {
        let name = name.into();
        Self {
            declared: name.clone(),
            name,
            kind,
            help: None,
            samples: Vec::new(),
        }
    }

    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    fn set_kind(&mut self, kind: MetricType) {
        self.kind = kind;
        self.name = match (kind, self.declared.strip_suffix("_total")) {
            (MetricType::Counter, Some(base)) => base.to_string(),
            _ => self.declared.clone(),
        };
    }

    /// Whether a sample with this name belongs to the family.
    fn owns(&self, sample_name: &str) -> bool {
        if sample_name == self.name || sample_name == self.declared {
            return true;
        }
        sample_name
            .strip_prefix(self.name.as_str())
            .is_some_and(|suffix| self.kind.suffixes().contains(&suffix))
    }
}

/// One scrape worth of metric families, in exposition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    families: Vec<MetricFamily>,
}

impl Snapshot {
    pub fn new(families: Vec<MetricFamily>) -> Self {
        Self { families }
    }

    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    /// All families with exactly this name.
    pub fn family<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MetricFamily> + 'a {
        self.families.iter().filter(move |f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

/// Parse a Prometheus text exposition body.
pub fn parse_exposition(text: &str) -> Result<Snapshot, ParseError> {
    let mut families: Vec<MetricFamily> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            let (keyword, rest) = split_word(comment);
            match keyword {
                "HELP" => {
                    let (name, text) = split_word(rest);
                    if !name.is_empty() {
                        metadata_family(&mut families, name).help = Some(unescape_help(text));
                    }
                }
                "TYPE" => {
                    let (name, word) = split_word(rest);
                    let word = word.trim();
                    let kind = MetricType::from_word(word).ok_or_else(|| {
                        ParseError::new(lineno, ParseErrorKind::InvalidType(word.to_string()))
                    })?;
                    if !name.is_empty() {
                        metadata_family(&mut families, name).set_kind(kind);
                    }
                }
                // Plain comment.
                _ => {}
            }
            continue;
        }

        let sample = parse_sample(line, lineno)?;
        let owned = families.last().is_some_and(|f| f.owns(&sample.name));
        if owned {
            if let Some(family) = families.last_mut() {
                family.samples.push(sample);
            }
        } else {
            families.push(MetricFamily::new(sample.name.clone(), MetricType::Untyped).with_sample(sample));
        }
    }

    Ok(Snapshot::new(families))
}

/// The family a `# HELP` or `# TYPE` line refers to: the current one if it
/// was declared under the same name and has no samples yet, otherwise a
/// fresh untyped family.
fn metadata_family<'a>(families: &'a mut Vec<MetricFamily>, name: &str) -> &'a mut MetricFamily {
    let reuse = families
        .last()
        .is_some_and(|f| f.declared == name && f.samples.is_empty());
    if !reuse {
        families.push(MetricFamily::new(name, MetricType::Untyped));
    }
    let last = families.len() - 1;
    &mut families[last]
}

fn parse_sample(line: &str, lineno: usize) -> Result<Sample, ParseError> {
    let err = |kind| ParseError::new(lineno, kind);

    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return Err(err(ParseErrorKind::MissingName));
    }

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if let Some(body) = rest.strip_prefix('{') {
        let (parsed, after) = parse_labels(body).map_err(err)?;
        labels = parsed;
        rest = after;
    }

    let mut fields = rest.split_whitespace();
    let raw_value = fields.next().ok_or_else(|| err(ParseErrorKind::MissingValue))?;
    let value = parse_value(raw_value)
        .ok_or_else(|| err(ParseErrorKind::InvalidValue(raw_value.to_string())))?;

    let timestamp_ms = match fields.next() {
        Some(ts) => Some(
            parse_value(ts)
                .ok_or_else(|| err(ParseErrorKind::InvalidTimestamp(ts.to_string())))?,
        ),
        None => None,
    };

    if let Some(extra) = fields.next() {
        return Err(err(ParseErrorKind::TrailingInput(extra.to_string())));
    }

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
        timestamp_ms,
    })
}

/// Parse `key="value",...}` and return the labels plus whatever follows
/// the closing brace.
fn parse_labels(body: &str) -> Result<(Vec<(String, String)>, &str), ParseErrorKind> {
    let mut labels = Vec::new();
    let mut rest = body;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Err(ParseErrorKind::UnterminatedLabels);
        }
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest.find('=').ok_or(ParseErrorKind::MalformedLabel)?;
        let key = rest[..eq].trim();
        if key.is_empty() || key.contains(['{', '}', ',', '"']) {
            return Err(ParseErrorKind::MalformedLabel);
        }

        rest = rest[eq + 1..]
            .trim_start()
            .strip_prefix('"')
            .ok_or(ParseErrorKind::MalformedLabel)?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let close = loop {
            match chars.next() {
                None => return Err(ParseErrorKind::UnterminatedLabels),
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, 'n')) => value.push('\n'),
                    // Unknown escapes are kept verbatim.
                    Some((_, c)) => {
                        value.push('\\');
                        value.push(c);
                    }
                    None => return Err(ParseErrorKind::UnterminatedLabels),
                },
                Some((_, c)) => value.push(c),
            }
        };
        labels.push((key.to_string(), value));

        rest = rest[close + 1..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if rest.is_empty() {
            return Err(ParseErrorKind::UnterminatedLabels);
        } else if !rest.starts_with('}') {
            return Err(ParseErrorKind::MalformedLabel);
        }
    }
}

fn parse_value(s: &str) -> Option<f64> {
    match s {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => s.parse::<f64>().ok(),
    }
}

fn unescape_help(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}
