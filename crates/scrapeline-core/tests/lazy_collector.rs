#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scrapeline_core::{
    CollectError, Collected, LabelSet, LazyCollector, MetricKind, Registry, ValueMap,
};

fn error_count(collector: &LazyCollector, class: &str) -> Option<f64> {
    collector
        .error_counter()
        .get(&LabelSet::from([("class", class)]))
}

fn two_series() -> ValueMap {
    ValueMap::from([
        (LabelSet::from([("foo", "bar"), ("baz", "wombat")]), 42.0),
        (LabelSet::from([("foo", "something"), ("baz", "funny")]), 21.0),
    ])
}

#[test]
fn registers_itself_and_error_counter() {
    let registry = Registry::new();
    LazyCollector::builder("test_metric", "A test metric")
        .register(&registry, |_| Ok(Collected::from(ValueMap::new())))
        .unwrap();

    let handle = registry.get("test_metric").expect("collector registered");
    assert!(handle.as_collected().is_some());
    assert_eq!(handle.kind(), MetricKind::Gauge);

    let errors = registry
        .get("test_metric_collection_errors_total")
        .expect("error counter registered");
    assert_eq!(errors.kind(), MetricKind::Counter);
    assert_eq!(errors.desc().labels().names(), ["class".to_string()]);
}

#[test]
fn duplicate_name_is_rejected() {
    let registry = Registry::new();
    registry.gauge("taken", "Already here", &[]).unwrap();

    let err = LazyCollector::builder("taken", "Again")
        .register(&registry, |_| Ok(Collected::from(ValueMap::new())))
        .unwrap_err();
    assert_eq!(err.kind().as_str(), "AlreadyRegistered");
}

#[test]
fn unknown_kind_is_a_usage_error() {
    let err = "lulz".parse::<MetricKind>().unwrap_err();
    assert_eq!(err.kind().as_str(), "UnknownMetricKind");
    assert_eq!("summary".parse::<MetricKind>().unwrap(), MetricKind::Summary);
}

#[test]
fn empty_value_set() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("empty", "Nothing")
        .register(&registry, |_| Ok(Collected::from(ValueMap::new())))
        .unwrap();

    assert!(metric.values().is_empty());
}

#[test]
fn populated_value_set_is_returned_unmodified() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("populated", "Some values")
        .labels(&["foo", "baz"])
        .register(&registry, |_| Ok(Collected::from(two_series())))
        .unwrap();

    assert_eq!(metric.values(), two_series());
}

#[test]
fn varying_label_names_fail_closed() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("varying", "Mismatched labels")
        .labels(&["foo", "baz"])
        .register(&registry, |_| {
            Ok(Collected::from([
                (LabelSet::from([("foo", "bar"), ("baz", "wombat")]), 42.0),
                (LabelSet::from([("lol", "cats")]), 180.0),
            ]))
        })
        .unwrap();

    assert!(metric.values().is_empty());
    assert_eq!(error_count(&metric, "InvalidLabelSet"), Some(1.0));
}

#[test]
fn unrecognised_result_counts_not_a_map() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("mystery", "Mystery meat")
        .register(&registry, |_| Ok(Collected::unrecognised("MYSTERY MEAT")))
        .unwrap();

    assert!(metric.values().is_empty());
    assert_eq!(error_count(&metric, "NotAMap"), Some(1.0));
}

#[test]
fn io_error_keeps_its_io_class() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("failing", "Always fails")
        .register(&registry, |_| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "ERANGE").into())
        })
        .unwrap();

    assert!(metric.values().is_empty());
    assert!(metric.values().is_empty());
    assert_eq!(error_count(&metric, "io::Other"), Some(2.0));
}

#[test]
fn other_errors_are_classed_by_type() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("unparsable", "Parses garbage")
        .register(&registry, |_| {
            let v: u64 = "garbage".parse()?;
            Ok(Collected::from([(LabelSet::new(), v as f64)]))
        })
        .unwrap();

    assert!(metric.values().is_empty());
    let class = std::any::type_name::<std::num::ParseIntError>();
    assert_eq!(error_count(&metric, class), Some(1.0));
}

#[test]
fn metrics_error_keeps_its_kind() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("nested", "Uses a bad kind string")
        .register(&registry, |_| {
            let _kind: MetricKind = "lulz".parse()?;
            Ok(Collected::from(ValueMap::new()))
        })
        .unwrap();

    assert!(metric.values().is_empty());
    assert_eq!(error_count(&metric, "UnknownMetricKind"), Some(1.0));
}

#[test]
fn histogram_and_summary_collectors_are_exposed_untyped() {
    let registry = Registry::new();
    let h = LazyCollector::builder("lazy_h", "Declared histogram")
        .kind(MetricKind::Histogram)
        .register(&registry, |_| Ok(Collected::from([(LabelSet::new(), 1.0)])))
        .unwrap();
    LazyCollector::builder("lazy_s", "Declared summary")
        .kind(MetricKind::Summary)
        .register(&registry, |_| Ok(Collected::from([(LabelSet::new(), 2.0)])))
        .unwrap();

    assert_eq!(h.kind(), MetricKind::Histogram);
    let body = registry.render();
    assert!(body.contains("# TYPE lazy_h untyped\nlazy_h 1\n"));
    assert!(body.contains("# TYPE lazy_s untyped\nlazy_s 2\n"));
    assert!(!body.contains("# TYPE lazy_h histogram"));
    assert!(!body.contains("# TYPE lazy_s summary"));
}

#[test]
fn counter_collectors_keep_their_type() {
    let registry = Registry::new();
    LazyCollector::builder("lazy_total", "Declared counter")
        .kind(MetricKind::Counter)
        .register(&registry, |_| Ok(Collected::from([(LabelSet::new(), 3.0)])))
        .unwrap();

    assert!(registry.render().contains("# TYPE lazy_total counter\nlazy_total 3\n"));
}

#[test]
fn explicit_error_class() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("classed", "Fails with a class")
        .register(&registry, |_| Err(CollectError::with_class("Timeout", "backend too slow")))
        .unwrap();

    assert!(metric.values().is_empty());
    assert_eq!(error_count(&metric, "Timeout"), Some(1.0));
    assert_eq!(error_count(&metric, "NotAMap"), None);
}

#[test]
fn panicking_computation_is_isolated() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("panicky", "Panics")
        .register(&registry, |_| panic!("boom"))
        .unwrap();

    assert!(metric.values().is_empty());
    assert_eq!(error_count(&metric, "Panic"), Some(1.0));
}

#[test]
fn get_looks_up_fresh_values() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("lookup", "Lookup")
        .labels(&["foo", "baz"])
        .register(&registry, |_| Ok(Collected::from(two_series())))
        .unwrap();

    let found = metric.get(&LabelSet::from([("foo", "bar"), ("baz", "wombat")]));
    assert_eq!(found.unwrap(), Some(42.0));

    let missing = metric.get(&LabelSet::from([("foo", "lol"), ("baz", "cats")]));
    assert_eq!(missing.unwrap(), None);

    let err = metric.get(&LabelSet::from([("why", "not")])).unwrap_err();
    assert_eq!(err.kind().as_str(), "InvalidLabelSet");
}

#[test]
fn computation_runs_on_every_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let registry = Registry::new();
    let metric = LazyCollector::builder("calls", "Counts its own calls")
        .register(&registry, move |_| {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Collected::from([(LabelSet::new(), n as f64)]))
        })
        .unwrap();

    assert_eq!(metric.get(&LabelSet::new()).unwrap(), Some(1.0));
    assert_eq!(metric.get(&LabelSet::new()).unwrap(), Some(2.0));
    metric.values();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn cpu_seconds_scenario() {
    let registry = Registry::new();
    let metric = LazyCollector::builder("process_cpu_seconds_total", "Total user and system CPU time spent in seconds")
        .labels(&["mode"])
        .register(&registry, |_| {
            Ok(Collected::from([
                (LabelSet::from([("mode", "user")]), 0.42),
                (LabelSet::from([("mode", "system")]), 3141.59),
            ]))
        })
        .unwrap();

    assert_eq!(metric.get(&LabelSet::from([("mode", "user")])).unwrap(), Some(0.42));
    assert_eq!(metric.get(&LabelSet::from([("mode", "system")])).unwrap(), Some(3141.59));
}

#[test]
fn failing_collector_does_not_affect_scrape() {
    let registry = Registry::new();
    LazyCollector::builder("broken", "Broken")
        .register(&registry, |_| Ok(Collected::unrecognised(17)))
        .unwrap();
    LazyCollector::builder("healthy", "Healthy")
        .register(&registry, |_| Ok(Collected::from([(LabelSet::new(), 7.0)])))
        .unwrap();

    let body = registry.render();
    assert!(body.contains("# TYPE broken gauge"));
    assert!(!body.contains("\nbroken "));
    assert!(body.contains("\nhealthy 7\n"));
    assert!(body.contains("broken_collection_errors_total{class=\"NotAMap\"} 1"));
}
