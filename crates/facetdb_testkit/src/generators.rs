//! Property-based test generators using proptest.
//!
//! Strategies produce `team` bodies and sequences of mutations whose
//! effect on facet counts can be checked against a full recompute.

use crate::fixtures::{body, TEAM, TEAMS};
use facetdb_core::{Document, Engine, FacetMap};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Locations used by generated members.
pub const LOCATIONS: [&str; 4] = ["Berlin", "Boston", "London", "Madrid"];

/// Strategy for generating first names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for generating team memberships, possibly empty.
pub fn teams_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(TEAMS.to_vec()), 0..3)
}

/// Strategy for generating valid `team` bodies.
pub fn member_strategy() -> impl Strategy<Value = Map<String, Value>> {
    (
        name_strategy(),
        teams_strategy(),
        prop::option::of(prop::sample::select(LOCATIONS.to_vec())),
    )
        .prop_map(|(name, teams, location)| {
            let mut member = body(json!({ "name": name, "team": teams }));
            if let Some(location) = location {
                member.insert("location".into(), json!(location));
            }
            member
        })
}

/// One mutation against the `team` entity.
///
/// Document positions are taken modulo the number of live documents when
/// the operation is applied.
#[derive(Debug, Clone)]
pub enum FacetOp {
    /// Create a member.
    Create(Map<String, Value>),
    /// Replace a member wholesale.
    Replace(usize, Map<String, Value>),
    /// Add a team to a member.
    JoinTeam(usize, &'static str),
    /// Remove a team from a member.
    LeaveTeam(usize, &'static str),
    /// Clear a member's location.
    ClearLocation(usize),
    /// Delete a member.
    Delete(usize),
}

/// Strategy for generating mutation sequences.
pub fn facet_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<FacetOp>> {
    let team = || prop::sample::select(TEAMS.to_vec());
    let op = prop_oneof![
        3 => member_strategy().prop_map(FacetOp::Create),
        1 => (any::<usize>(), member_strategy()).prop_map(|(i, m)| FacetOp::Replace(i, m)),
        2 => (any::<usize>(), team()).prop_map(|(i, t)| FacetOp::JoinTeam(i, t)),
        2 => (any::<usize>(), team()).prop_map(|(i, t)| FacetOp::LeaveTeam(i, t)),
        1 => any::<usize>().prop_map(FacetOp::ClearLocation),
        1 => any::<usize>().prop_map(FacetOp::Delete),
    ];
    prop::collection::vec(op, 1..max_len)
}

/// Applies one operation. Operations on an empty entity do nothing.
pub fn apply_op(engine: &Engine, op: &FacetOp) {
    let docs = engine.list(TEAM).expect("list").docs;
    let pick = |i: usize| docs.get(i % docs.len().max(1)).map(Document::id);

    match op {
        FacetOp::Create(member) => {
            engine.create(TEAM, member).expect("create");
        }
        FacetOp::Replace(i, member) => {
            if let Some(id) = pick(*i) {
                engine.replace(TEAM, id, member).expect("replace");
            }
        }
        FacetOp::JoinTeam(i, team) => {
            if let Some(id) = pick(*i) {
                engine.patch_property(TEAM, id, "team", team).expect("join");
            }
        }
        FacetOp::LeaveTeam(i, team) => {
            if let Some(id) = pick(*i) {
                engine.delete_property(TEAM, id, "team", team).expect("leave");
            }
        }
        FacetOp::ClearLocation(i) => {
            if let Some(id) = pick(*i) {
                engine
                    .delete_property(TEAM, id, "location", "")
                    .expect("clear");
            }
        }
        FacetOp::Delete(i) => {
            if let Some(id) = pick(*i) {
                engine.delete(TEAM, id).expect("delete");
            }
        }
    }
}

/// Recomputes `field -> value -> count` from the live documents.
pub fn recount(engine: &Engine) -> BTreeMap<String, HashMap<String, usize>> {
    let docs = engine.list(TEAM).expect("list").docs;
    let mut counts: BTreeMap<String, HashMap<String, usize>> = BTreeMap::new();
    for field in engine.facets(TEAM, None).expect("facets").keys() {
        let per_value = counts.entry(field.clone()).or_default();
        for doc in &docs {
            if let Some(value) = doc.get(field) {
                for key in value.facet_keys() {
                    *per_value.entry(key).or_default() += 1;
                }
            }
        }
    }
    counts
}

/// Flattens a facet map into the shape returned by [`recount`].
pub fn as_counts(facets: &FacetMap) -> BTreeMap<String, HashMap<String, usize>> {
    facets
        .iter()
        .map(|(field, entries)| {
            let counts = entries.iter().map(|e| (e.value.clone(), e.count)).collect();
            (field.clone(), counts)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::empty_engine;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn incremental_facets_match_recompute(ops in facet_ops_strategy(40)) {
            let engine = empty_engine();
            for op in &ops {
                apply_op(&engine, op);
            }
            let facets = engine.facets(TEAM, None).unwrap();
            prop_assert_eq!(as_counts(&facets), recount(&engine));
        }

        #[test]
        fn facet_counts_sum_to_memberships(members in prop::collection::vec(member_strategy(), 0..30)) {
            let engine = empty_engine();
            for member in &members {
                engine.create(TEAM, member).unwrap();
            }

            let facets = engine.facets(TEAM, Some("team")).unwrap();
            let total: usize = facets["team"].iter().map(|e| e.count).sum();
            let memberships: usize = engine
                .list(TEAM)
                .unwrap()
                .docs
                .iter()
                .filter_map(|doc| doc.get("team"))
                .map(|teams| teams.facet_keys().len())
                .sum();
            prop_assert_eq!(total, memberships);
            prop_assert!(facets["team"].iter().all(|e| e.count > 0));
        }

        #[test]
        fn single_valued_facets_sum_to_documents(
            members in prop::collection::vec(
                (
                    prop::option::of(prop::sample::select(TEAMS.to_vec())),
                    prop::option::of(prop::sample::select(LOCATIONS.to_vec())),
                ),
                0..30,
            )
        ) {
            let engine = empty_engine();
            for (team, location) in &members {
                let mut member = body(json!({ "name": "Ann", "team": team.iter().collect::<Vec<_>>() }));
                if let Some(location) = location {
                    member.insert("location".into(), json!(location));
                }
                engine.create(TEAM, &member).unwrap();
            }

            let docs = engine.list(TEAM).unwrap().docs;
            let facets = engine.facets(TEAM, None).unwrap();
            for field in ["team", "location"] {
                let total: usize = facets[field].iter().map(|e| e.count).sum();
                let with_value = docs
                    .iter()
                    .filter(|doc| doc.get(field).is_some_and(|v| !v.is_empty()))
                    .count();
                prop_assert_eq!(total, with_value, "field {}", field);
            }
        }

        #[test]
        fn facets_are_ordered(ops in facet_ops_strategy(30)) {
            let engine = empty_engine();
            for op in &ops {
                apply_op(&engine, op);
            }
            for entries in engine.facets(TEAM, None).unwrap().values() {
                for pair in entries.windows(2) {
                    let ordered = pair[0].count > pair[1].count
                        || (pair[0].count == pair[1].count && pair[0].value < pair[1].value);
                    prop_assert!(ordered, "{:?} before {:?}", pair[0], pair[1]);
                }
            }
        }
    }
}
