//! Filter predicates compiled from declarative criteria.
//!
//! A criterion names a field path, an operator and its operands. Compilation
//! resolves the path against the record schema and parses operands once; the
//! resulting [`Predicate`] is a pure function of the record.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::{Accessor, FieldRef, Schema, ScreenRecord};

/// How operands (and the field) are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Num,
    #[default]
    String,
}

impl ValueType {
    /// Map a search-builder column type. Every numeric flavour counts as `num`.
    pub fn from_column_type(ty: &str) -> Self {
        if ty.starts_with("num") {
            ValueType::Num
        } else {
            ValueType::String
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Logic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
    NotBetween,
    Starts,
    NotStarts,
    Contains,
    NotContains,
    Ends,
    NotEnds,
    /// Not a known condition. Evaluates to `true` for every record, so an
    /// unknown condition never hides rows. Kept permissive on purpose until
    /// the table front end stops emitting custom conditions.
    Unrecognized(String),
}

impl Operator {
    pub fn parse(condition: &str) -> Self {
        match condition {
            "=" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "between" => Operator::Between,
            "!between" => Operator::NotBetween,
            "starts" => Operator::Starts,
            "!starts" => Operator::NotStarts,
            "contains" => Operator::Contains,
            "!contains" => Operator::NotContains,
            "ends" => Operator::Ends,
            "!ends" => Operator::NotEnds,
            other => Operator::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Between => "between",
            Operator::NotBetween => "!between",
            Operator::Starts => "starts",
            Operator::NotStarts => "!starts",
            Operator::Contains => "contains",
            Operator::NotContains => "!contains",
            Operator::Ends => "ends",
            Operator::NotEnds => "!ends",
            Operator::Unrecognized(s) => s,
        }
    }

    /// Negated text operators hold for a record with no value.
    fn holds_when_missing(&self) -> bool {
        matches!(
            self,
            Operator::Ne | Operator::NotStarts | Operator::NotContains | Operator::NotEnds
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative filter condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub field_path: String,
    pub operator: String,
    pub operands: Vec<String>,
    pub value_type: ValueType,
}

impl FilterCriterion {
    pub fn new(
        field_path: impl Into<String>,
        operator: impl Into<String>,
        operands: Vec<String>,
        value_type: ValueType,
    ) -> Self {
        Self {
            field_path: field_path.into(),
            operator: operator.into(),
            operands,
            value_type,
        }
    }

    pub fn text(field_path: &str, operator: &str, operand: &str) -> Self {
        Self::new(field_path, operator, vec![operand.to_string()], ValueType::String)
    }

    pub fn num(field_path: &str, operator: &str, operands: &[f64]) -> Self {
        Self::new(
            field_path,
            operator,
            operands.iter().map(|v| v.to_string()).collect(),
            ValueType::Num,
        )
    }
}

struct CompiledCriterion<R> {
    accessor: Accessor<R>,
    operator: Operator,
    value_type: ValueType,
    numbers: Vec<f64>,
    texts: Vec<String>,
}

impl<R: ScreenRecord> CompiledCriterion<R> {
    fn matches(&self, record: &R) -> bool {
        let field = self.accessor.get(record);
        match self.value_type {
            ValueType::Num => self.matches_number(field),
            ValueType::String => self.matches_text(field),
        }
    }

    fn matches_number(&self, field: FieldRef<'_>) -> bool {
        let v = field.as_number();
        let a = self.numbers.first().copied().unwrap_or(f64::NAN);
        let b = self.numbers.get(1).copied().unwrap_or(f64::NAN);
        match self.operator {
            Operator::Eq => v == a,
            Operator::Ne => v != a,
            Operator::Lt => v < a,
            Operator::Le => v <= a,
            Operator::Gt => v > a,
            Operator::Ge => v >= a,
            Operator::Between => a <= v && v <= b,
            Operator::NotBetween => v < a || v > b,
            _ => self.matches_text(field),
        }
    }

    fn matches_text(&self, field: FieldRef<'_>) -> bool {
        if let Operator::Unrecognized(_) = self.operator {
            return true;
        }
        let Some(v) = field.as_text() else {
            return self.operator.holds_when_missing();
        };
        let v = v.as_ref();
        let Some(a) = self.texts.first().map(String::as_str) else {
            return false;
        };
        match &self.operator {
            Operator::Eq => v == a,
            Operator::Ne => v != a,
            Operator::Lt => v < a,
            Operator::Le => v <= a,
            Operator::Gt => v > a,
            Operator::Ge => v >= a,
            Operator::Between => match self.texts.get(1) {
                Some(b) => a <= v && v <= b.as_str(),
                None => false,
            },
            Operator::NotBetween => match self.texts.get(1) {
                Some(b) => v < a || v > b.as_str(),
                None => false,
            },
            Operator::Starts => v.starts_with(a),
            Operator::NotStarts => !v.starts_with(a),
            Operator::Contains => v.contains(a),
            Operator::NotContains => !v.contains(a),
            Operator::Ends => v.ends_with(a),
            Operator::NotEnds => !v.ends_with(a),
            Operator::Unrecognized(_) => true,
        }
    }
}

/// A compiled set of criteria combined with AND or OR.
pub struct Predicate<R> {
    criteria: Vec<CompiledCriterion<R>>,
    logic: Logic,
}

impl<R: ScreenRecord> Predicate<R> {
    /// Compile `criteria` against `schema`.
    ///
    /// Fails with `InvalidFieldPath` when a criterion names an unknown field.
    /// Unknown operators do not fail; see [`Operator::Unrecognized`].
    pub fn compile(
        criteria: &[FilterCriterion],
        logic: Logic,
        schema: &Schema<R>,
    ) -> Result<Self> {
        let mut compiled = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            let accessor = schema.resolve(&criterion.field_path)?;
            let operator = Operator::parse(&criterion.operator);
            if let Operator::Unrecognized(condition) = &operator {
                tracing::warn!(
                    field = %criterion.field_path,
                    condition = %condition,
                    "unrecognized filter condition; criterion matches every record"
                );
            }
            let numbers = match criterion.value_type {
                ValueType::Num => criterion
                    .operands
                    .iter()
                    .map(|v| v.trim().parse::<f64>().unwrap_or(f64::NAN))
                    .collect(),
                ValueType::String => Vec::new(),
            };
            compiled.push(CompiledCriterion {
                accessor,
                operator,
                value_type: criterion.value_type,
                numbers,
                texts: criterion.operands.clone(),
            });
        }
        Ok(Self {
            criteria: compiled,
            logic,
        })
    }

    pub fn matches(&self, record: &R) -> bool {
        match self.logic {
            Logic::And => self.criteria.iter().all(|c| c.matches(record)),
            // Every criterion is evaluated; no short circuit.
            Logic::Or => self
                .criteria
                .iter()
                .fold(false, |hit, c| c.matches(record) || hit),
        }
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

// ============================================================================
// Basic search
// ============================================================================

/// Matcher for the free-text search box.
#[derive(Debug, Clone)]
pub enum TextMatcher {
    Substring(String),
    Regex(Regex),
}

impl TextMatcher {
    /// Build a regex matcher; an invalid pattern falls back to a literal match.
    pub fn regex(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => TextMatcher::Regex(re),
            Err(err) => {
                tracing::warn!(pattern, error = %err, "invalid search regex; matching literally");
                TextMatcher::Substring(pattern.to_string())
            }
        }
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        match self {
            TextMatcher::Substring(needle) => haystack.contains(needle.as_str()),
            TextMatcher::Regex(re) => re.is_match(haystack),
        }
    }

    pub fn matches_record<R: ScreenRecord>(&self, record: &R) -> bool {
        record.search_fields().into_iter().any(|f| self.is_match(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GuideRecord, GuideStats, Sample};

    fn guide(id: &str, gene: &str, lfc: f64) -> GuideRecord {
        let mut stats = GuideStats::bare(id, gene);
        stats.lfc = lfc;
        GuideRecord::new(stats, Some("libA".to_string()), vec![1.0, 2.0])
    }

    fn schema() -> Schema<GuideRecord> {
        Schema::new(&[Sample::new("s0", 0), Sample::new("s1", 1)])
    }

    fn check(criterion: FilterCriterion, record: &GuideRecord) -> bool {
        Predicate::compile(&[criterion], Logic::And, &schema())
            .unwrap()
            .matches(record)
    }

    #[test]
    fn numeric_operators() {
        let g = guide("g1", "A", 1.5);
        assert!(check(FilterCriterion::num("LFC", ">", &[1.0]), &g));
        assert!(!check(FilterCriterion::num("LFC", "<=", &[1.0]), &g));
        assert!(check(FilterCriterion::num("LFC", "between", &[1.0, 2.0]), &g));
        assert!(!check(FilterCriterion::num("LFC", "!between", &[1.0, 2.0]), &g));
        assert!(check(FilterCriterion::num("LFC", "!between", &[2.0, 3.0]), &g));
        assert!(check(FilterCriterion::num("s1", "=", &[2.0]), &g));
    }

    #[test]
    fn malformed_numbers_compare_false() {
        let g = guide("g1", "A", 1.5);
        let c = FilterCriterion::new("LFC", ">", vec!["abc".to_string()], ValueType::Num);
        assert!(!check(c.clone(), &g));
        let c = FilterCriterion { operator: "<=".to_string(), ..c };
        assert!(!check(c, &g));
    }

    #[test]
    fn text_operators() {
        let g = guide("sg_TP53_1", "TP53", 0.0);
        assert!(check(FilterCriterion::text("gene", "=", "TP53"), &g));
        assert!(check(FilterCriterion::text("sgrna", "starts", "sg_"), &g));
        assert!(check(FilterCriterion::text("sgrna", "!starts", "x"), &g));
        assert!(check(FilterCriterion::text("sgrna", "contains", "TP53"), &g));
        assert!(!check(FilterCriterion::text("sgrna", "!contains", "TP53"), &g));
        assert!(check(FilterCriterion::text("sgrna", "ends", "_1"), &g));
        assert!(!check(FilterCriterion::text("sgrna", "!ends", "_1"), &g));
        assert!(check(FilterCriterion::text("gene", "<", "ZZZ"), &g));
    }

    #[test]
    fn unknown_operator_matches_everything() {
        let g = guide("g1", "A", 0.0);
        assert!(check(FilterCriterion::text("gene", "null", "B"), &g));
        assert!(check(FilterCriterion::num("LFC", "~", &[100.0]), &g));
    }

    #[test]
    fn unknown_field_fails_compilation() {
        let err = Predicate::compile(
            &[FilterCriterion::text("nope", "=", "x")],
            Logic::And,
            &schema(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn empty_criteria_and_is_true_or_is_false() {
        let g = guide("g1", "A", 0.0);
        let and = Predicate::compile(&[], Logic::And, &schema()).unwrap();
        let or = Predicate::compile(&[], Logic::Or, &schema()).unwrap();
        assert!(and.matches(&g));
        assert!(!or.matches(&g));
    }

    #[test]
    fn missing_library_only_satisfies_negations() {
        let mut g = guide("g1", "A", 0.0);
        g.library = None;
        assert!(!check(FilterCriterion::text("library", "=", "libA"), &g));
        assert!(check(FilterCriterion::text("library", "!=", "libA"), &g));
        assert!(check(FilterCriterion::text("library", "!contains", "lib"), &g));
    }

    #[test]
    fn text_matcher_modes() {
        let g = guide("123", "BRCA1", 0.0);
        assert!(TextMatcher::Substring("RCA".to_string()).matches_record(&g));
        assert!(!TextMatcher::Substring("rca".to_string()).matches_record(&g));
        assert!(TextMatcher::regex("^[0-9]+$").matches_record(&g));
        assert!(TextMatcher::regex("libA").matches_record(&g));
        // Invalid pattern degrades to a literal search.
        assert!(matches!(TextMatcher::regex("("), TextMatcher::Substring(_)));
    }
}
