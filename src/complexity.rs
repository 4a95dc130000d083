//! File complexity classification used to choose pacing delays.

/// Character-count threshold above which a file is considered complex.
const COMPLEX_CONTENT_THRESHOLD: usize = 20000;

/// Classifies a file as complex from size and name heuristics.
///
/// Complex files get a longer pacing delay after summarization; the
/// classification never affects correctness.
pub fn is_complex_file(file_name: &str, content: &str) -> bool {
    content.chars().count() > COMPLEX_CONTENT_THRESHOLD
        || file_name.contains("test")
        || file_name.ends_with(".json")
}
