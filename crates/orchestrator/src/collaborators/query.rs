//! Path-based lookups into reference data.

use serde_json::Value;

/// Paths present in [`JsonDataQuery::catalog`].
pub mod paths {
    pub const DIGITAL_CHANNELS_PER_MODULE: &str = "io.module_channels.digital";
    pub const ANALOG_CHANNELS_PER_MODULE: &str = "io.module_channels.analog";
    pub const MIN_CPU_MHZ_REAL_TIME: &str = "system.min_cpu_mhz_real_time";
}

/// Read-only access to auxiliary data by path.
pub trait DataQuery: Send + Sync {
    /// Value at `path`, e.g. `io.module_channels.digital` or `protocols[0].name`.
    fn query(&self, path: &str) -> Option<Value>;

    /// Convenience for numeric lookups.
    fn query_u64(&self, path: &str) -> Option<u64> {
        self.query(path).and_then(|v| v.as_u64())
    }
}

/// [`DataQuery`] over an in-memory JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDataQuery {
    data: Value,
}

impl Default for JsonDataQuery {
    fn default() -> Self {
        Self::catalog()
    }
}

impl JsonDataQuery {
    #[must_use]
    pub const fn new(data: Value) -> Self {
        Self { data }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `JsonParseFailed` for malformed input.
    pub fn from_json_str(input: &str) -> concord_core::Result<Self> {
        concord_core::parse::from_json_str(input).map(Self::new)
    }

    /// Built-in hardware catalog used by the default experts.
    #[must_use]
    pub fn catalog() -> Self {
        Self::new(serde_json::json!({
            "io": {
                "module_channels": { "digital": 16, "analog": 8 }
            },
            "system": {
                "min_cpu_mhz_real_time": 500
            }
        }))
    }
}

impl DataQuery for JsonDataQuery {
    fn query(&self, path: &str) -> Option<Value> {
        if path.is_empty() {
            return Some(self.data.clone());
        }
        segments(path)?
            .into_iter()
            .try_fold(&self.data, |node, segment| match segment {
                Segment::Key(key) => node.get(key),
                Segment::Index(i) => node.get(i),
            })
            .cloned()
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// `a.b[0].c` into `[Key(a), Key(b), Index(0), Key(c)]`. `None` on malformed paths.
fn segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = part.find('[').map_or((part, ""), |i| part.split_at(i));
        if key.is_empty() && rest.is_empty() {
            return None;
        }
        if !key.is_empty() {
            out.push(Segment::Key(key));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let (index, tail) = inner.split_once(']')?;
            out.push(Segment::Index(index.trim().parse().ok()?));
            rest = tail;
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(out)
}
