use catalink_core::SimilarityMetric;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static CODE_PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").expect("valid code part regex"));

const MAX_NAME_TOKENS: usize = 5;
const MIN_NAME_TOKEN_CHARS: usize = 4;
const MIN_CODE_PART_CHARS: usize = 3;

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE_RE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// Significant words of a normalized name: longer than three characters,
/// at most five, in order of appearance.
pub fn name_tokens(normalized: &str) -> Vec<String> {
    normalized
        .split(' ')
        .filter(|w| w.chars().count() >= MIN_NAME_TOKEN_CHARS)
        .take(MAX_NAME_TOKENS)
        .map(str::to_string)
        .collect()
}

/// Alphanumeric runs of at least three characters in an internal code.
pub fn code_parts(code: &str) -> Vec<String> {
    CODE_PART_RE
        .find_iter(code)
        .map(|m| m.as_str())
        .filter(|p| p.len() >= MIN_CODE_PART_CHARS)
        .map(str::to_string)
        .collect()
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
/// Ties go to the run starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    let mut prev = vec![0usize; bhi - blo + 1];
    for i in alo..ahi {
        let mut cur = vec![0usize; bhi - blo + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let len = prev[j - blo] + 1;
                cur[j - blo + 1] = len;
                if len > best_len {
                    best_i = i + 1 - len;
                    best_j = j + 1 - len;
                    best_len = len;
                }
            }
        }
        prev = cur;
    }
    (best_i, best_j, best_len)
}

/// Ratcliff/Obershelp ratio `2 * M / T`, where `M` counts the characters in
/// the matching blocks found by recursively taking the longest common run and
/// `T` is the combined length.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut matched = 0;
    let mut pending = vec![((0, a.len()), (0, b.len()))];
    while let Some(((alo, ahi), (blo, bhi))) = pending.pop() {
        let (i, j, len) = longest_match(&a, &b, (alo, ahi), (blo, bhi));
        if len == 0 {
            continue;
        }
        matched += len;
        if alo < i && blo < j {
            pending.push(((alo, i), (blo, j)));
        }
        if i + len < ahi && j + len < bhi {
            pending.push(((i + len, ahi), (j + len, bhi)));
        }
    }
    2.0 * matched as f64 / total as f64
}

/// Character-level similarity in `[0, 1]` between two normalized strings.
pub fn similarity(metric: SimilarityMetric, a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let score = match metric {
        SimilarityMetric::Ratio => sequence_ratio(a, b),
        SimilarityMetric::Levenshtein => strsim::normalized_levenshtein(a, b),
        SimilarityMetric::JaroWinkler => strsim::jaro_winkler(a, b),
    };
    score.clamp(0.0, 1.0)
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
