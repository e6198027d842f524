use crate::api::VideoResult;

/// Queries tried in order until the platform returns something.
pub fn query_variations(query: &str) -> Vec<String> {
    let query = query.trim();
    vec![
        query.to_string(),
        format!("{} official audio", query),
        format!("{} audio", query),
    ]
}

/// Orders results by how close their length is to the track's. Results with
/// unknown length go last; ties keep platform order.
pub fn rank_by_duration(mut results: Vec<VideoResult>, duration_ms: u64) -> Vec<VideoResult> {
    if duration_ms == 0 {
        return results;
    }
    let target = duration_ms as f64 / 1000.0;
    results.sort_by(|a, b| {
        let distance = |v: &VideoResult| v.duration_secs.map(|secs| (secs - target).abs());
        match (distance(a), distance(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
    results
}

/// "m:ss" as shown next to search hits.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
