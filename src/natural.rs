use std::cmp::Ordering;

/// Compares two path fragments treating embedded integer runs numerically.
///
/// Each string is split into alternating text and digit runs, always
/// starting and ending with a (possibly empty) text run, so runs at the same
/// position are of the same kind. Text runs compare lexicographically, digit
/// runs by value. Strings that compare equal run-by-run (for instance
/// `"part.01"` and `"part.1"`) fall back to plain comparison.
///
/// ```
/// use std::cmp::Ordering;
/// use geoparcel::natural_cmp;
///
/// assert_eq!(natural_cmp("part.2.parquet", "part.10.parquet"), Ordering::Less);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = runs(a);
    let right = runs(b);
    for (idx, (l, r)) in left.iter().zip(right.iter()).enumerate() {
        let ord = if idx % 2 == 1 {
            cmp_digits(l, r)
        } else {
            l.cmp(r)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

/// Sorts `paths` in place with [`natural_cmp`].
pub fn sort_naturally<S: AsRef<str>>(paths: &mut [S]) {
    paths.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

fn runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut rest = s;
    loop {
        let text_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        runs.push(&rest[..text_end]);
        rest = &rest[text_end..];
        if rest.is_empty() {
            return runs;
        }
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        runs.push(&rest[..digits_end]);
        rest = &rest[digits_end..];
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
