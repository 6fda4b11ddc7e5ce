//! Digest sharding: mapping a name to nested directory segments.
//!
//! Storing every object in one flat directory falls over once the file count
//! gets large, so the digest's leading characters become nested directory
//! names:
//!
//! ```text
//! shard("1f09d30c707d53f3d16c530dd73d70a6ce7596a9", 2, 2)
//!   => 1f/09/1f09d30c707d53f3d16c530dd73d70a6ce7596a9
//! shard("1f09d30c707d53f3d16c530dd73d70a6ce7596a9", 3, 2)
//!   => 1f0/9d3/1f09d30c707d53f3d16c530dd73d70a6ce7596a9
//! ```
//!
//! The mapping is a pure function of (name, width, depth) and is stable
//! across calls and processes, so a digest always resolves to the same path.

/// Split `name` into `depth` directory segments of `width` chars each, plus
/// one final segment.
///
/// When `rest_only` is false the final segment is the entire original name,
/// so the full name reappears as the leaf filename. When true, the final
/// segment is only the remainder after the directory prefixes.
///
/// Segments past the end of the name come out shorter or empty rather than
/// erroring, and `depth = 0` yields just the final segment.
pub fn shard(name: &str, width: usize, depth: usize, rest_only: bool) -> Vec<String> {
    let mut segments = Vec::with_capacity(depth + 1);
    for i in 0..depth {
        segments.push(char_range(name, width * i, width * (i + 1)));
    }

    if rest_only {
        segments.push(char_range(name, width * depth, usize::MAX));
    } else {
        segments.push(name.to_string());
    }

    segments
}

/// Substring by char positions, clamped to the end of the string.
///
/// Names are usually hex digests, but `shard` is also applied to raw
/// caller-supplied names, which may not be ASCII.
fn char_range(s: &str, start: usize, end: usize) -> String {
    s.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}
