use std::collections::BTreeSet;

use mageckview_core::predicate::TextMatcher;
use mageckview_core::query::DumpKind;
use mageckview_core::{
    FilterCriterion, GuideRecord, GuideStats, Logic, PageRequest, Predicate, QueryEngine,
    QueryRequest, Sample, Schema, SortDirection,
};
use proptest::prelude::*;

const GENES: [&str; 4] = ["A", "B", "C", "NO-TARGET"];

fn samples() -> Vec<Sample> {
    vec![Sample::new("plasmid", 0), Sample::new("day14", 1)]
}

fn records(rows: &[(usize, i32, u16)]) -> Vec<GuideRecord> {
    rows.iter()
        .enumerate()
        .map(|(i, &(gene, lfc, count))| {
            let gene = GENES[gene % GENES.len()];
            let mut stats = GuideStats::bare(format!("{gene}_{i}"), gene);
            stats.lfc = lfc as f64;
            stats.pvalue = (i % 7) as f64 / 10.0;
            GuideRecord::new(stats, None, vec![count as f64, (count / 2) as f64])
        })
        .collect()
}

fn rows_strategy() -> impl Strategy<Value = Vec<(usize, i32, u16)>> {
    prop::collection::vec((0usize..4, -3i32..=3, 0u16..200), 0..=40)
}

#[derive(Debug, Clone)]
struct Step {
    filter: u8,
    basic: u8,
    selected: u8,
    order: u8,
    start: usize,
    length: i64,
}

fn steps_strategy() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        (0u8..4, 0u8..3, 0u8..3, 0u8..5, 0usize..50, -1i64..15).prop_map(
            |(filter, basic, selected, order, start, length)| Step {
                filter,
                basic,
                selected,
                order,
                start,
                length,
            },
        ),
        1..=8,
    )
}

fn request(step: &Step) -> PageRequest {
    let mut req = PageRequest::new(step.start, step.length);
    req = match step.filter {
        1 => req.with_criteria(Logic::And, &[FilterCriterion::num("LFC", ">", &[0.0])]),
        2 => req.with_criteria(Logic::And, &[FilterCriterion::text("gene", "=", "A")]),
        3 => req.with_criteria(
            Logic::Or,
            &[
                FilterCriterion::num("LFC", "between", &[-1.0, 1.0]),
                FilterCriterion::text("gene", "=", "C"),
            ],
        ),
        _ => req,
    };
    req = match step.basic {
        1 => req.with_search("_1"),
        2 => req.with_search("B"),
        _ => req,
    };
    req = match step.selected {
        1 => req.with_selected(["A", "B"]),
        2 => req.with_selected(["NO-TARGET"]),
        _ => req,
    };
    match step.order {
        1 => req.order_by("LFC", SortDirection::Asc),
        2 => req.order_by("LFC", SortDirection::Desc),
        3 => req.order_by("gene", SortDirection::Desc),
        4 => req.order_by("pvalue", SortDirection::Asc),
        _ => req,
    }
}

/// Filter and sort from scratch, without any cache.
fn naive(records: &[GuideRecord], req: &PageRequest) -> Vec<usize> {
    let schema: Schema<GuideRecord> = Schema::new(&samples());
    let search = req.search_descriptor();
    let predicate = Predicate::compile(&search.criteria, search.logic, &schema).unwrap();
    let matcher = search.basic().map(|t| TextMatcher::Substring(t.to_string()));
    let mut out: Vec<usize> = (0..records.len())
        .filter(|&i| {
            let r = &records[i];
            search.inclusion().map_or(true, |s| s.contains(r.gene()))
                && matcher.as_ref().map_or(true, |m| m.matches_record(r))
                && (!search.has_builder() || predicate.matches(r))
        })
        .collect();
    if let Some(order) = req.order_descriptor().unwrap() {
        let accessor = schema.resolve(&order.field_path).unwrap();
        out.sort_by(|&a, &b| {
            let ord = accessor.get(&records[a]).sort_cmp(&accessor.get(&records[b]));
            match order.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
    out
}

fn page_ids(engine: &mut QueryEngine<GuideRecord>, req: &PageRequest) -> (usize, Vec<String>) {
    let page = engine.page(req).unwrap();
    (
        page.records_filtered,
        page.data.iter().map(|g| g.id().to_string()).collect(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn cached_pages_match_fresh_evaluation(rows in rows_strategy(), steps in steps_strategy()) {
        let recs = records(&rows);
        let mut engine = QueryEngine::default();
        engine.configure(recs.clone(), &samples());

        for step in &steps {
            let req = request(step);
            let expected = naive(&recs, &req);
            let (filtered, ids) = page_ids(&mut engine, &req);

            prop_assert!(filtered <= recs.len());
            prop_assert_eq!(filtered, expected.len());

            let start = step.start.min(expected.len());
            let end = if step.length < 0 {
                expected.len()
            } else {
                (start + step.length as usize).min(expected.len())
            };
            let expected_ids: Vec<String> =
                expected[start..end].iter().map(|&i| recs[i].id().to_string()).collect();
            prop_assert_eq!(ids, expected_ids);
        }
    }

    #[test]
    fn identical_requests_are_idempotent(rows in rows_strategy(), steps in steps_strategy()) {
        let mut engine = QueryEngine::default();
        engine.configure(records(&rows), &samples());
        for step in &steps {
            let req = request(step);
            let first = page_ids(&mut engine, &req);
            let second = page_ids(&mut engine, &req);
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn pages_cover_the_filtered_set_exactly(
        rows in rows_strategy(),
        steps in steps_strategy(),
        length in 1i64..7,
    ) {
        let mut engine = QueryEngine::default();
        engine.configure(records(&rows), &samples());
        let mut req = request(&steps[0]);
        req.length = length;

        req.start = 0;
        let (filtered, _) = page_ids(&mut engine, &req);
        let mut seen = Vec::new();
        while req.start < filtered {
            let (again, ids) = page_ids(&mut engine, &req);
            prop_assert_eq!(again, filtered);
            seen.extend(ids);
            req.start += length as usize;
        }

        let dump: Vec<String> = engine
            .query(&QueryRequest::Dump(DumpKind::Filtered))
            .unwrap()
            .data
            .iter()
            .map(|g| g.id().to_string())
            .collect();
        prop_assert_eq!(&seen, &dump);
        let unique: BTreeSet<&String> = seen.iter().collect();
        prop_assert_eq!(unique.len(), seen.len());
    }
}
