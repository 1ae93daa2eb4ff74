//! Redis-style glob matching and escaping.

/// Match `text` against a glob `pattern`.
///
/// Supports `*`, `?`, character classes (`[abc]`, `[a-z]`, `[^x]`) and
/// backslash escapes. An unterminated `[` matches itself.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // (pattern index after the last `*`, text index it is currently absorbing up to)
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi + 1, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => match match_class(&p, pi, t[ti]) {
                    Some((true, next)) => {
                        pi = next;
                        ti += 1;
                        continue;
                    }
                    Some((false, _)) => {}
                    None => {
                        if t[ti] == '[' {
                            pi += 1;
                            ti += 1;
                            continue;
                        }
                    }
                },
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((after_star, absorbed)) => {
                pi = after_star;
                ti = absorbed + 1;
                star = Some((after_star, absorbed + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Evaluate the class starting at `p[start] == '['` against `ch`.
///
/// Returns `(matched, index after the closing bracket)`, or `None` when the
/// class is unterminated.
fn match_class(p: &[char], start: usize, ch: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = p.get(i) == Some(&'^');
    if negate {
        i += 1;
    }
    let mut matched = false;
    while i < p.len() {
        match p[i] {
            ']' => return Some((matched != negate, i + 1)),
            '\\' if i + 1 < p.len() => {
                if p[i + 1] == ch {
                    matched = true;
                }
                i += 2;
            }
            lo if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' => {
                let hi = p[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                if lo <= ch && ch <= hi {
                    matched = true;
                }
                i += 3;
            }
            c => {
                if c == ch {
                    matched = true;
                }
                i += 1;
            }
        }
    }
    None
}

/// Escape glob metacharacters so `literal` only matches itself.
pub fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Pattern matching every key that starts with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    format!("{}*", escape(prefix))
}
