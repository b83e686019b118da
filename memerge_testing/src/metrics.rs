//! Metric capture for assertions.

use metrics_util::debugging::{DebugValue, DebuggingRecorder};

/// A recorded metric: name, sorted `key=value` labels and value.
#[derive(Debug)]
pub struct Recorded {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: DebugValue,
}

/// Run `f` with a thread-local debugging recorder and return what it
/// recorded.
pub fn capture(f: impl FnOnce()) -> Vec<Recorded> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, f);

    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| {
            let mut labels: Vec<(String, String)> = key
                .key()
                .labels()
                .map(|label| (label.key().to_owned(), label.value().to_owned()))
                .collect();
            labels.sort();
            Recorded {
                name: key.key().name().to_owned(),
                labels,
                value,
            }
        })
        .collect()
}

/// Sum of counter `name` across series whose labels include every pair in
/// `labels`.
#[must_use]
pub fn counter(recorded: &[Recorded], name: &str, labels: &[(&str, &str)]) -> u64 {
    recorded
        .iter()
        .filter(|metric| metric.name == name && has_labels(metric, labels))
        .filter_map(|metric| match metric.value {
            DebugValue::Counter(value) => Some(value),
            _ => None,
        })
        .sum()
}

/// Value of gauge `name`, if recorded.
#[must_use]
pub fn gauge(recorded: &[Recorded], name: &str) -> Option<f64> {
    recorded.iter().find_map(|metric| match &metric.value {
        DebugValue::Gauge(value) if metric.name == name => Some(value.into_inner()),
        _ => None,
    })
}

fn has_labels(metric: &Recorded, labels: &[(&str, &str)]) -> bool {
    labels.iter().all(|(key, value)| {
        metric
            .labels
            .iter()
            .any(|(k, v)| k == key && v == value)
    })
}
