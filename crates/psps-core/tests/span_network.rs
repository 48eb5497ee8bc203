use std::collections::BTreeSet;
use std::io::Write;

use psps_core::{
    CombinationMethod, MissingValue, PspsConfig, Span, SpanGraph, SpanId, TraversalOrder,
};
use tempfile::NamedTempFile;

/// Radial feeder:
///
/// ```text
/// src <- trunk1 <- trunk2 <- lateral_a
///                         <- lateral_b <- tap
/// ```
fn radial_feeder() -> Vec<Span> {
    vec![
        Span::new("src").with_upstream("<Null>"),
        Span::new("trunk1").with_upstream("src"),
        Span::new("trunk2").with_upstream("trunk1"),
        Span::new("lateral_a").with_upstream("trunk2"),
        Span::new("lateral_b").with_upstream("trunk2"),
        Span::new("tap").with_upstream("lateral_b"),
    ]
}

fn set(ids: &[SpanId]) -> BTreeSet<&str> {
    ids.iter().map(SpanId::as_str).collect()
}

#[test]
fn test_upstream_of_tap_is_the_trunk_path() {
    let graph = SpanGraph::build(&radial_feeder(), &["<Null>".to_string()]).unwrap();
    assert!(graph.dangling_upstreams().is_empty());

    let up = graph
        .upstream(&SpanId::new("tap"), TraversalOrder::DepthFirst)
        .unwrap();
    assert_eq!(
        up.nodes,
        vec![
            SpanId::new("lateral_b"),
            SpanId::new("trunk2"),
            SpanId::new("trunk1"),
            SpanId::new("src"),
        ]
    );
}

#[test]
fn test_downstream_of_trunk_reaches_every_lateral() {
    let graph = SpanGraph::build(&radial_feeder(), &["<Null>".to_string()]).unwrap();
    let id = SpanId::new("trunk2");

    let dfs = graph.downstream(&id, TraversalOrder::DepthFirst).unwrap();
    let bfs = graph.downstream(&id, TraversalOrder::BreadthFirst).unwrap();
    assert_eq!(set(&dfs.nodes), BTreeSet::from(["lateral_a", "lateral_b", "tap"]));
    assert_eq!(set(&dfs.nodes), set(&bfs.nodes));
    // Breadth-first lists both laterals before the tap.
    assert_eq!(bfs.nodes.last(), Some(&SpanId::new("tap")));
}

#[test]
fn test_sentinel_without_config_is_a_dangling_root() {
    let graph = SpanGraph::build(&radial_feeder(), &[]).unwrap();
    assert_eq!(graph.dangling_upstreams().len(), 1);
    assert_eq!(graph.node_count(), 7);
    assert_eq!(graph.stats().roots, 1);
}

#[test]
fn test_config_file_drives_parameters() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
root_sentinels = ["<Null>"]

[data_sources]
windspeed = "data/raw/windspeed_snapshot.csv"

[parameters]
min_alert_probability = 0.3
parent_feeder_id = "222"
impact_years = 5
traversal = "bfs"
combination = "independent_product"

[fill]
customer_total = "skip"
"#
    )
    .unwrap();

    let config = PspsConfig::load_from(file.path()).unwrap();
    assert_eq!(config.root_sentinels, vec!["<Null>".to_string()]);
    assert_eq!(config.parameters.parent_feeder_id.as_deref(), Some("222"));
    assert_eq!(config.parameters.impact_years, 5);
    assert_eq!(config.parameters.traversal, TraversalOrder::BreadthFirst);
    assert_eq!(
        config.parameters.combination,
        CombinationMethod::IndependentProduct
    );
    assert_eq!(config.fill.customer_total, MissingValue::Skip);
    assert_eq!(config.fill.probability, MissingValue::Skip);

    let graph = SpanGraph::build(&radial_feeder(), &config.root_sentinels).unwrap();
    assert!(graph.dangling_upstreams().is_empty());
}
