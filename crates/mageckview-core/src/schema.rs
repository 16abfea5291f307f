//! Accessor tables: field path → extraction function.
//!
//! Every record type describes its addressable fields once; per dataset the
//! table is extended with one column per sample. Query requests and filter
//! criteria resolve their field paths against this table up front, so an
//! unknown path fails before any record is touched.
//!
//! Paths are at most two levels deep (`LFC`, `neg.LFC`, `counts.0`).

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, ViewError};
use crate::record::{GeneRecord, GuideRecord, Sample};

/// A borrowed view of one field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Text(&'a str),
    Number(f64),
    Missing,
}

impl<'a> FieldRef<'a> {
    /// Numeric reading; text is parsed, anything unparsable is NaN.
    pub fn as_number(&self) -> f64 {
        match self {
            FieldRef::Number(n) => *n,
            FieldRef::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
            FieldRef::Missing => f64::NAN,
        }
    }

    pub fn as_text(&self) -> Option<Cow<'a, str>> {
        match self {
            FieldRef::Text(s) => Some(Cow::Borrowed(s)),
            FieldRef::Number(n) => Some(Cow::Owned(n.to_string())),
            FieldRef::Missing => None,
        }
    }

    /// Ordering used for sorting: numbers before text, missing values last.
    pub fn sort_cmp(&self, other: &FieldRef<'_>) -> Ordering {
        match (self, other) {
            (FieldRef::Number(a), FieldRef::Number(b)) => a.total_cmp(b),
            (FieldRef::Text(a), FieldRef::Text(b)) => a.cmp(b),
            (FieldRef::Number(_), FieldRef::Text(_)) => Ordering::Less,
            (FieldRef::Text(_), FieldRef::Number(_)) => Ordering::Greater,
            (FieldRef::Missing, FieldRef::Missing) => Ordering::Equal,
            (FieldRef::Missing, _) => Ordering::Greater,
            (_, FieldRef::Missing) => Ordering::Less,
        }
    }
}

/// A record type the query engine can index.
pub trait ScreenRecord: Sized {
    /// Gene identity, matched against inclusion sets.
    fn gene(&self) -> &str;

    /// Text fields scanned by the basic search box.
    fn search_fields(&self) -> Vec<&str>;

    /// Display value of the sample with the given `Sample::order`.
    fn sample_value(&self, _order: usize) -> Option<f64> {
        None
    }

    /// Raw count of the sample with the given `Sample::order`.
    fn raw_count(&self, _order: usize) -> Option<f64> {
        None
    }

    /// Register the statically known fields.
    fn describe(schema: &mut Schema<Self>);
}

pub type FieldFn<R> = for<'a> fn(&'a R) -> FieldRef<'a>;

/// How one field path is read from a record.
pub enum Accessor<R> {
    Field(FieldFn<R>),
    Sample(usize),
    Count(usize),
}

impl<R> Clone for Accessor<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Accessor<R> {}

impl<R> fmt::Debug for Accessor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Field(_) => f.write_str("Field(..)"),
            Accessor::Sample(i) => write!(f, "Sample({i})"),
            Accessor::Count(i) => write!(f, "Count({i})"),
        }
    }
}

impl<R: ScreenRecord> Accessor<R> {
    pub fn get<'a>(&self, record: &'a R) -> FieldRef<'a> {
        let value = match self {
            Accessor::Field(get) => return get(record),
            Accessor::Sample(order) => record.sample_value(*order),
            Accessor::Count(order) => record.raw_count(*order),
        };
        value.map_or(FieldRef::Missing, FieldRef::Number)
    }
}

/// Field path table for one record type and sample layout.
#[derive(Debug)]
pub struct Schema<R> {
    accessors: HashMap<String, Accessor<R>>,
    paths: Vec<String>,
}

impl<R: ScreenRecord> Schema<R> {
    pub fn new(samples: &[Sample]) -> Self {
        let mut schema = Schema {
            accessors: HashMap::new(),
            paths: Vec::new(),
        };
        R::describe(&mut schema);
        for sample in samples {
            schema.insert(sample.name.clone(), Accessor::Sample(sample.order));
            schema.insert(format!("counts.{}", sample.order), Accessor::Count(sample.order));
        }
        schema
    }

    pub fn field(&mut self, path: &str, get: FieldFn<R>) -> &mut Self {
        self.insert(path.to_string(), Accessor::Field(get));
        self
    }

    /// A later registration replaces an earlier one under the same path.
    fn insert(&mut self, path: String, accessor: Accessor<R>) {
        if self.accessors.insert(path.clone(), accessor).is_some() {
            tracing::warn!(path = %path, "field path registered twice; later accessor wins");
        } else {
            self.paths.push(path);
        }
    }

    pub fn resolve(&self, path: &str) -> Result<Accessor<R>> {
        if let Some(accessor) = self.accessors.get(path) {
            return Ok(*accessor);
        }
        Err(ViewError::InvalidFieldPath {
            path: path.to_string(),
        })
    }

    /// Registered paths, in registration order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

// ============================================================================
// Record descriptions
// ============================================================================

impl ScreenRecord for GeneRecord {
    fn gene(&self) -> &str {
        &self.gene
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.gene.as_str()]
    }

    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("gene", |r| FieldRef::Text(&r.gene))
            .field("id", |r| FieldRef::Text(&r.gene))
            .field("numSgRNA", |r| FieldRef::Number(r.num_sgrna as f64))
            .field("best", |r| FieldRef::Text(r.best.as_str()))
            .field("LFC", |r| FieldRef::Number(r.lfc))
            .field("pvalue", |r| FieldRef::Number(r.pvalue))
            .field("FDR", |r| FieldRef::Number(r.fdr))
            .field("rank", |r| FieldRef::Number(r.rank as f64))
            .field("neg.score", |r| FieldRef::Number(r.neg.score))
            .field("neg.pvalue", |r| FieldRef::Number(r.neg.pvalue))
            .field("neg.FDR", |r| FieldRef::Number(r.neg.fdr))
            .field("neg.rank", |r| FieldRef::Number(r.neg.rank))
            .field("neg.good", |r| FieldRef::Number(r.neg.good as f64))
            .field("neg.LFC", |r| FieldRef::Number(r.neg.lfc))
            .field("pos.score", |r| FieldRef::Number(r.pos.score))
            .field("pos.pvalue", |r| FieldRef::Number(r.pos.pvalue))
            .field("pos.FDR", |r| FieldRef::Number(r.pos.fdr))
            .field("pos.rank", |r| FieldRef::Number(r.pos.rank))
            .field("pos.good", |r| FieldRef::Number(r.pos.good as f64))
            .field("pos.LFC", |r| FieldRef::Number(r.pos.lfc));
    }
}

impl ScreenRecord for GuideRecord {
    fn gene(&self) -> &str {
        &self.stats.gene
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut out = vec![self.stats.gene.as_str(), self.stats.sgrna.as_str()];
        if let Some(library) = &self.library {
            out.push(library);
        }
        out
    }

    fn sample_value(&self, order: usize) -> Option<f64> {
        self.normalized.get(order).copied()
    }

    fn raw_count(&self, order: usize) -> Option<f64> {
        self.counts.get(order).copied()
    }

    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("sgrna", |r| FieldRef::Text(&r.stats.sgrna))
            .field("id", |r| FieldRef::Text(&r.stats.sgrna))
            .field("gene", |r| FieldRef::Text(&r.stats.gene))
            .field("library", |r| {
                r.library
                    .as_deref()
                    .map_or(FieldRef::Missing, FieldRef::Text)
            })
            .field("control_count", |r| FieldRef::Text(&r.stats.control_count))
            .field("treatment_count", |r| {
                FieldRef::Text(&r.stats.treatment_count)
            })
            .field("control_mean", |r| FieldRef::Number(r.stats.control_mean))
            .field("treat_mean", |r| FieldRef::Number(r.stats.treat_mean))
            .field("LFC", |r| FieldRef::Number(r.stats.lfc))
            .field("control_var", |r| FieldRef::Number(r.stats.control_var))
            .field("adj_var", |r| FieldRef::Number(r.stats.adj_var))
            .field("score", |r| FieldRef::Number(r.stats.score))
            .field("pLow", |r| FieldRef::Number(r.stats.p_low))
            .field("pHigh", |r| FieldRef::Number(r.stats.p_high))
            .field("pvalue", |r| FieldRef::Number(r.stats.pvalue))
            .field("FDR", |r| FieldRef::Number(r.stats.fdr))
            .field("highInTreatment", |r| {
                FieldRef::Text(if r.stats.high_in_treatment {
                    "True"
                } else {
                    "False"
                })
            });
    }
}
