//! Incremental query engine.
//!
//! Emulates server-side pagination over an in-memory record set. A request is
//! turned into a [`SearchDescriptor`] (what rows are visible) and an
//! [`OrderDescriptor`] (how they are ordered). Both are reduced to structural
//! signatures; the engine keeps the filtered index set and the ordered index
//! list from the previous request and only recomputes what changed:
//!
//! - same search signature: the filtered bitmap is reused;
//! - same order signature and the cached order still covers the filtered set:
//!   the ordered list is reused;
//! - filtered set shrank: the ordered list is re-intersected with it, keeping
//!   the prior relative order, without sorting again.
//!
//! Page turns therefore cost one slice.

use std::collections::BTreeSet;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::config::SearchMode;
use crate::error::{Result, ViewError};
use crate::predicate::{FilterCriterion, Logic, Predicate, TextMatcher, ValueType};
use crate::record::Sample;
use crate::schema::{Accessor, Schema, ScreenRecord};
use crate::signature::{order_signature, search_signature, Signature};

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Everything that determines the filtered subset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDescriptor {
    pub basic_text: Option<String>,
    pub criteria: Vec<FilterCriterion>,
    pub logic: Logic,
    /// Genes whose records stay visible; `None` keeps every gene.
    pub inclusion_set: Option<BTreeSet<String>>,
}

impl SearchDescriptor {
    pub fn basic(&self) -> Option<&str> {
        self.basic_text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn has_builder(&self) -> bool {
        !self.criteria.is_empty()
    }

    pub fn inclusion(&self) -> Option<&BTreeSet<String>> {
        self.inclusion_set.as_ref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDescriptor {
    pub field_path: String,
    pub direction: SortDirection,
}

impl OrderDescriptor {
    pub fn new(field_path: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field_path: field_path.into(),
            direction,
        }
    }
}

// ============================================================================
// Wire request / response
// ============================================================================

/// A table request: either a structured page request or a full-set dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryRequest {
    Dump(DumpKind),
    Page(PageRequest),
}

/// Sentinels that bypass pagination and caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpKind {
    /// The current filtered set in its current order.
    Filtered,
    /// Every record, unfiltered, in record order.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderColumn {
    pub column: usize,
    #[serde(default)]
    pub dir: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicSearch {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub regex: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderCriterion {
    /// Column title; used as the field path when `origData` is absent.
    #[serde(default)]
    pub data: String,
    #[serde(rename = "origData", default, skip_serializing_if = "Option::is_none")]
    pub orig_data: Option<String>,
    pub condition: String,
    #[serde(default)]
    pub value: Vec<serde_json::Value>,
    #[serde(rename = "type", default)]
    pub ty: String,
}

impl BuilderCriterion {
    fn to_criterion(&self) -> FilterCriterion {
        let path = self.orig_data.as_deref().unwrap_or(&self.data);
        let operands = self
            .value
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        FilterCriterion::new(
            path,
            self.condition.clone(),
            operands,
            ValueType::from_column_type(&self.ty),
        )
    }
}

impl From<&FilterCriterion> for BuilderCriterion {
    fn from(c: &FilterCriterion) -> Self {
        Self {
            data: c.field_path.clone(),
            orig_data: Some(c.field_path.clone()),
            condition: c.operator.clone(),
            value: c
                .operands
                .iter()
                .cloned()
                .map(serde_json::Value::String)
                .collect(),
            ty: match c.value_type {
                ValueType::Num => "num".to_string(),
                ValueType::String => "string".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchBuilder {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub criteria: Vec<BuilderCriterion>,
}

fn default_length() -> i64 {
    10
}

/// A DataTables-style page request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Echo token, returned unchanged.
    #[serde(default)]
    pub draw: u64,
    #[serde(default)]
    pub start: usize,
    /// Page length; negative means "to the end".
    #[serde(default = "default_length")]
    pub length: i64,
    #[serde(default)]
    pub order: Vec<OrderColumn>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub search: Option<BasicSearch>,
    #[serde(default)]
    pub search_builder: Option<SearchBuilder>,
    #[serde(default)]
    pub selected_subset: Vec<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            draw: 0,
            start: 0,
            length: default_length(),
            order: Vec::new(),
            columns: Vec::new(),
            search: None,
            search_builder: None,
            selected_subset: Vec::new(),
        }
    }
}

impl PageRequest {
    pub fn new(start: usize, length: i64) -> Self {
        Self {
            start,
            length,
            ..Self::default()
        }
    }

    /// Sort by `field_path`, replacing any previous order.
    pub fn order_by(mut self, field_path: &str, dir: SortDirection) -> Self {
        let column = match self.columns.iter().position(|c| c.data == field_path) {
            Some(i) => i,
            None => {
                self.columns.push(ColumnSpec {
                    data: field_path.to_string(),
                });
                self.columns.len() - 1
            }
        };
        self.order = vec![OrderColumn { column, dir }];
        self
    }

    pub fn with_search(mut self, text: &str) -> Self {
        self.search = Some(BasicSearch {
            value: text.to_string(),
            regex: false,
        });
        self
    }

    pub fn with_criteria(mut self, logic: Logic, criteria: &[FilterCriterion]) -> Self {
        self.search_builder = Some(SearchBuilder {
            logic,
            criteria: criteria.iter().map(BuilderCriterion::from).collect(),
        });
        self
    }

    pub fn with_selected<I, S>(mut self, genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_subset = genes.into_iter().map(Into::into).collect();
        self
    }

    pub fn search_descriptor(&self) -> SearchDescriptor {
        let (logic, criteria) = match &self.search_builder {
            Some(b) => (b.logic, b.criteria.iter().map(|c| c.to_criterion()).collect()),
            None => (Logic::And, Vec::new()),
        };
        let inclusion_set = if self.selected_subset.is_empty() {
            None
        } else {
            Some(self.selected_subset.iter().cloned().collect())
        };
        SearchDescriptor {
            basic_text: self
                .search
                .as_ref()
                .map(|s| s.value.clone())
                .filter(|v| !v.is_empty()),
            criteria,
            logic,
            inclusion_set,
        }
    }

    /// Only the first order entry is honoured.
    pub fn order_descriptor(&self) -> Result<Option<OrderDescriptor>> {
        let Some(first) = self.order.first() else {
            return Ok(None);
        };
        let column = self
            .columns
            .get(first.column)
            .ok_or_else(|| ViewError::InvalidFieldPath {
                path: format!("columns[{}]", first.column),
            })?;
        Ok(Some(OrderDescriptor::new(column.data.clone(), first.dir)))
    }

    fn wants_regex(&self) -> bool {
        self.search.as_ref().is_some_and(|s| s.regex)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub draw: u64,
    pub records_total: usize,
    pub records_filtered: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            draw: self.draw,
            records_total: self.records_total,
            records_filtered: self.records_filtered,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Default)]
struct QueryCache {
    search: Option<Signature>,
    order: Option<Signature>,
    filtered: RoaringBitmap,
    ordered: Vec<u32>,
    /// Set when the filtered set gained members the ordered list lacks.
    order_stale: bool,
}

impl QueryCache {
    fn reset(&mut self, n: usize) {
        let n = n as u32;
        *self = QueryCache {
            filtered: (0..n).collect(),
            ordered: (0..n).collect(),
            ..QueryCache::default()
        };
    }
}

/// Paginated, cached access to one record set.
#[derive(Debug)]
pub struct QueryEngine<R> {
    records: Vec<R>,
    schema: Schema<R>,
    search_mode: SearchMode,
    cache: QueryCache,
}

impl<R: ScreenRecord> Default for QueryEngine<R> {
    fn default() -> Self {
        Self::new(SearchMode::default())
    }
}

impl<R: ScreenRecord> QueryEngine<R> {
    pub fn new(search_mode: SearchMode) -> Self {
        Self {
            records: Vec::new(),
            schema: Schema::new(&[]),
            search_mode,
            cache: QueryCache::default(),
        }
    }

    /// Replace the record set and rebuild the schema for `samples`.
    pub fn configure(&mut self, records: Vec<R>, samples: &[Sample]) {
        self.schema = Schema::new(samples);
        self.cache.reset(records.len());
        self.records = records;
        tracing::debug!(records = self.records.len(), "query engine configured");
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn schema(&self) -> &Schema<R> {
        &self.schema
    }

    pub fn search_mode(&self) -> SearchMode {
        self.search_mode
    }

    /// Size of the filtered set of the last query.
    pub fn filtered_len(&self) -> usize {
        self.cache.filtered.len() as usize
    }

    /// Records of the last query's filtered set, in its current order.
    pub fn filtered_records(&self) -> impl Iterator<Item = &R> + '_ {
        self.cache.ordered.iter().map(|&i| &self.records[i as usize])
    }

    /// Mutate derived values of every record. Both caches are invalidated.
    pub fn rederive(&mut self, mut f: impl FnMut(&mut R)) {
        for record in &mut self.records {
            f(record);
        }
        self.cache.search = None;
        self.cache.order = None;
    }

    pub fn query(&mut self, request: &QueryRequest) -> Result<Page<&R>> {
        match request {
            QueryRequest::Dump(kind) => Ok(self.dump(*kind, 0)),
            QueryRequest::Page(page) => self.page(page),
        }
    }

    pub fn dump(&self, kind: DumpKind, draw: u64) -> Page<&R> {
        let data: Vec<&R> = match kind {
            DumpKind::Filtered => self.filtered_records().collect(),
            DumpKind::All => self.records.iter().collect(),
        };
        Page {
            draw,
            records_total: self.records.len(),
            records_filtered: data.len(),
            data,
        }
    }

    pub fn page(&mut self, request: &PageRequest) -> Result<Page<&R>> {
        let search = request.search_descriptor();
        let regex = request.wants_regex() || self.search_mode == SearchMode::Regex;
        let order = request.order_descriptor()?;

        // Resolve everything fallible before touching the cache.
        let sort_key = match &order {
            Some(o) => Some((self.schema.resolve(&o.field_path)?, o.direction)),
            None => None,
        };

        let search_sig = search_signature(&search, regex);
        if self.cache.search.as_ref() != Some(&search_sig) {
            let predicate = if search.has_builder() {
                Some(Predicate::compile(&search.criteria, search.logic, &self.schema)?)
            } else {
                None
            };
            let filtered = self.filter(&search, predicate.as_ref(), regex);
            if !filtered.is_subset(&self.cache.filtered) {
                self.cache.order_stale = true;
            }
            tracing::debug!(
                signature = %search_sig.digest(),
                filtered = filtered.len(),
                "filter recomputed"
            );
            self.cache.filtered = filtered;
            self.cache.search = Some(search_sig);
        }

        let order_sig = order_signature(order.as_ref());
        if self.cache.order.as_ref() != Some(&order_sig)
            || self.cache.order_stale
            || (self.cache.ordered.len() as u64) < self.cache.filtered.len()
        {
            self.cache.ordered = self.sorted(sort_key);
            tracing::debug!(
                signature = %order_sig.digest(),
                ordered = self.cache.ordered.len(),
                "order recomputed"
            );
            self.cache.order = Some(order_sig);
            self.cache.order_stale = false;
        }

        if self.cache.ordered.len() as u64 != self.cache.filtered.len() {
            let QueryCache {
                filtered, ordered, ..
            } = &mut self.cache;
            ordered.retain(|i| filtered.contains(*i));
        }

        let total = self.cache.ordered.len();
        let start = request.start.min(total);
        let end = if request.length < 0 {
            total
        } else {
            start.saturating_add(request.length as usize).min(total)
        };
        let data = self.cache.ordered[start..end]
            .iter()
            .map(|&i| &self.records[i as usize])
            .collect();

        Ok(Page {
            draw: request.draw,
            records_total: self.records.len(),
            records_filtered: self.cache.filtered.len() as usize,
            data,
        })
    }

    fn filter(
        &self,
        search: &SearchDescriptor,
        predicate: Option<&Predicate<R>>,
        regex: bool,
    ) -> RoaringBitmap {
        let matcher = search.basic().map(|text| {
            if regex {
                TextMatcher::regex(text)
            } else {
                TextMatcher::Substring(text.to_string())
            }
        });
        let inclusion = search.inclusion();

        let mut out = RoaringBitmap::new();
        for (idx, record) in self.records.iter().enumerate() {
            if inclusion.is_some_and(|genes| !genes.contains(record.gene())) {
                continue;
            }
            if matcher.as_ref().is_some_and(|m| !m.matches_record(record)) {
                continue;
            }
            if predicate.is_some_and(|p| !p.matches(record)) {
                continue;
            }
            out.insert(idx as u32);
        }
        out
    }

    fn sorted(&self, key: Option<(Accessor<R>, SortDirection)>) -> Vec<u32> {
        let mut ordered: Vec<u32> = self.cache.filtered.iter().collect();
        if let Some((accessor, direction)) = key {
            let records = &self.records;
            ordered.sort_by(|&a, &b| {
                let ord = accessor
                    .get(&records[a as usize])
                    .sort_cmp(&accessor.get(&records[b as usize]));
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GuideRecord, GuideStats};

    fn guide(id: &str, gene: &str, lfc: f64) -> GuideRecord {
        let mut stats = GuideStats::bare(id, gene);
        stats.lfc = lfc;
        GuideRecord::new(stats, None, vec![1.0])
    }

    fn engine() -> QueryEngine<GuideRecord> {
        let mut engine = QueryEngine::default();
        engine.configure(
            vec![
                guide("g0", "A", 0.5),
                guide("g1", "B", -1.0),
                guide("g2", "A", 2.0),
                guide("g3", "C", 1.0),
                guide("g4", "B", 0.0),
            ],
            &[Sample::new("s0", 0)],
        );
        engine
    }

    fn ids<'a>(page: &Page<&'a GuideRecord>) -> Vec<&'a str> {
        page.data.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn sorts_and_paginates() {
        let mut engine = engine();
        let req = PageRequest::new(0, 2).order_by("LFC", SortDirection::Desc);
        let page = engine.page(&req).unwrap();
        assert_eq!(ids(&page), vec!["g2", "g3"]);
        assert_eq!(page.records_total, 5);
        assert_eq!(page.records_filtered, 5);

        let req = PageRequest { start: 4, ..req };
        let page = engine.page(&req).unwrap();
        assert_eq!(ids(&page), vec!["g1"]);
    }

    #[test]
    fn start_past_the_end_is_an_empty_page() {
        let mut engine = engine();
        let page = engine.page(&PageRequest::new(50, 10)).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.records_filtered, 5);
    }

    #[test]
    fn negative_length_returns_the_rest() {
        let mut engine = engine();
        let page = engine.page(&PageRequest::new(3, -1)).unwrap();
        assert_eq!(ids(&page), vec!["g3", "g4"]);
    }

    #[test]
    fn inclusion_set_filters_by_gene() {
        let mut engine = engine();
        let req = PageRequest::new(0, 10).with_selected(["A"]);
        let page = engine.page(&req).unwrap();
        assert_eq!(ids(&page), vec!["g0", "g2"]);
    }

    #[test]
    fn basic_and_builder_are_anded_even_in_or_mode() {
        let mut engine = engine();
        let req = PageRequest::new(0, 10).with_search("B").with_criteria(
            Logic::Or,
            &[
                FilterCriterion::num("LFC", "<", &[-0.5]),
                FilterCriterion::text("gene", "=", "C"),
            ],
        );
        let page = engine.page(&req).unwrap();
        assert_eq!(ids(&page), vec!["g1"]);
    }

    #[test]
    fn unknown_order_path_aborts_without_touching_cache() {
        let mut engine = engine();
        let ok = PageRequest::new(0, 10).with_search("A");
        assert_eq!(engine.page(&ok).unwrap().records_filtered, 2);

        let bad = PageRequest::new(0, 10).order_by("nope", SortDirection::Asc);
        assert!(matches!(
            engine.page(&bad),
            Err(ViewError::InvalidFieldPath { .. })
        ));
        assert_eq!(engine.filtered_len(), 2);
    }

    #[test]
    fn unknown_criterion_path_aborts_without_touching_cache() {
        let mut engine = engine();
        let ok = PageRequest::new(0, 10)
            .order_by("LFC", SortDirection::Desc)
            .with_selected(["B"]);
        assert_eq!(ids(&engine.page(&ok).unwrap()), vec!["g4", "g1"]);

        let bad = PageRequest::new(0, 10).with_criteria(
            Logic::And,
            &[
                FilterCriterion::num("LFC", ">", &[0.0]),
                FilterCriterion::text("neg.nope", "=", "x"),
            ],
        );
        assert_eq!(
            engine.page(&bad).unwrap_err(),
            ViewError::InvalidFieldPath {
                path: "neg.nope".to_string()
            }
        );
        assert_eq!(engine.filtered_len(), 2);
        let kept: Vec<&str> = engine.filtered_records().map(|r| r.id()).collect();
        assert_eq!(kept, vec!["g4", "g1"]);
    }

    #[test]
    fn order_column_out_of_range_is_invalid() {
        let mut engine = engine();
        let req = PageRequest {
            order: vec![OrderColumn {
                column: 3,
                dir: SortDirection::Asc,
            }],
            ..PageRequest::new(0, 10)
        };
        assert!(engine.page(&req).is_err());
    }

    #[test]
    fn shrinking_filter_keeps_order_without_resort() {
        let mut engine = engine();
        let req = PageRequest::new(0, 10).order_by("LFC", SortDirection::Asc);
        let all = ids(&engine.page(&req).unwrap())
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        assert_eq!(all, vec!["g1", "g4", "g0", "g3", "g2"]);

        let narrowed = req.clone().with_selected(["A", "B"]);
        let page = engine.page(&narrowed).unwrap();
        assert_eq!(ids(&page), vec!["g1", "g4", "g0", "g2"]);
    }

    #[test]
    fn disjoint_filter_of_equal_size_is_resorted() {
        let mut engine = engine();
        let base = PageRequest::new(0, 10).order_by("LFC", SortDirection::Asc);
        let a = base.clone().with_selected(["A"]);
        assert_eq!(ids(&engine.page(&a).unwrap()), vec!["g0", "g2"]);
        let b = base.with_selected(["B"]);
        assert_eq!(ids(&engine.page(&b).unwrap()), vec!["g1", "g4"]);
    }

    #[test]
    fn dumps_bypass_pagination() {
        let mut engine = engine();
        let req = PageRequest::new(0, 1)
            .order_by("LFC", SortDirection::Desc)
            .with_selected(["B"]);
        engine.page(&req).unwrap();

        let filtered = engine.query(&QueryRequest::Dump(DumpKind::Filtered)).unwrap();
        assert_eq!(ids(&filtered), vec!["g4", "g1"]);
        let all = engine.query(&QueryRequest::Dump(DumpKind::All)).unwrap();
        assert_eq!(all.data.len(), 5);
        assert_eq!(all.records_total, 5);
    }

    #[test]
    fn rederive_invalidates_cached_order() {
        let mut engine = engine();
        let req = PageRequest::new(0, 10).order_by("LFC", SortDirection::Asc);
        engine.page(&req).unwrap();
        engine.rederive(|r| r.stats.lfc = -r.stats.lfc);
        let page = engine.page(&req).unwrap();
        assert_eq!(ids(&page), vec!["g2", "g3", "g4", "g0", "g1"]);
    }

    #[test]
    fn request_json_shapes() {
        let dump: QueryRequest = serde_json::from_str(r#""filtered""#).unwrap();
        assert!(matches!(dump, QueryRequest::Dump(DumpKind::Filtered)));

        let page: QueryRequest = serde_json::from_str(
            r#"{
                "draw": 7, "start": 0, "length": 25,
                "order": [{"column": 1, "dir": "desc"}],
                "columns": [{"data": "sgrna"}, {"data": "LFC"}],
                "search": {"value": "TP53", "regex": false},
                "searchBuilder": {"logic": "OR", "criteria": [
                    {"data": "LFC", "origData": "LFC", "condition": ">", "value": ["1"], "type": "num"}
                ]},
                "selectedSubset": []
            }"#,
        )
        .unwrap();
        let QueryRequest::Page(page) = page else {
            panic!("expected a page request");
        };
        assert_eq!(page.draw, 7);
        let search = page.search_descriptor();
        assert_eq!(search.basic_text.as_deref(), Some("TP53"));
        assert_eq!(search.logic, Logic::Or);
        assert_eq!(search.criteria[0].value_type, ValueType::Num);
        assert!(search.inclusion_set.is_none());
        let order = page.order_descriptor().unwrap().unwrap();
        assert_eq!(order, OrderDescriptor::new("LFC", SortDirection::Desc));
    }

    #[test]
    fn response_uses_datatables_field_names() {
        let mut engine = engine();
        let page = engine.page(&PageRequest::new(0, 1)).unwrap();
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["recordsTotal"], 5);
        assert_eq!(json["recordsFiltered"], 5);
        assert_eq!(json["data"][0]["sgrna"], "g0");
    }
}
