//! Base-62 fractional indexing (spec §4.5/§9): a lexicographically
//! ordered string key generator so that an insertion between two
//! neighbours only has to move the one or two adjacent indices, not
//! renumber an entire window.
//!
//! The alphabet is ordered so that plain byte/string comparison equals
//! numeric base-62 comparison: digits, then uppercase, then lowercase.

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u32 = 62;

fn digit_value(c: u8) -> u32 {
    ALPHABET.iter().position(|&b| b == c).unwrap() as u32
}

fn digit_char(v: u32) -> u8 {
    ALPHABET[v as usize]
}

/// Returns a string that sorts strictly between `a` and `b` (either bound
/// may be absent, meaning "no lower/upper neighbour"). Panics if `a >=
/// b` when both are given — callers (top-K) never ask for that.
#[must_use]
pub fn between(a: Option<&str>, b: Option<&str>) -> String {
    match (a, b) {
        (None, None) => midpoint_str("", &repeat_max(1)),
        (Some(a), None) => increment(a),
        (None, Some(b)) => decrement(b),
        (Some(a), Some(b)) => {
            assert!(a < b, "between() requires a < b, got {a:?} >= {b:?}");
            midpoint_str(a, b)
        }
    }
}

fn repeat_max(n: usize) -> String {
    std::iter::repeat(digit_char(BASE - 1) as char).take(n).collect()
}

/// Produce a string strictly between `a` and `b` by extending the shorter
/// one with its natural next value and averaging digit-by-digit, falling
/// back to appending a midpoint digit when a byte-for-byte average rounds
/// to one of the bounds.
fn midpoint_str(a: &str, b: &str) -> String {
    let len = a.len().max(b.len()) + 1;
    let av = pad_digits(a, len);
    let bv = pad_digits(b, len);

    loop {
        let mid = digits_midpoint(&av, &bv);
        let candidate = digits_to_string(&mid);
        let trimmed = trim_trailing_zero_digit(&candidate);
        if trimmed.as_str() > a && trimmed.as_str() < b {
            return trimmed;
        }
        // Extremely unlikely with the padding above, but fall back to
        // one more digit of precision rather than loop forever.
        return format!("{trimmed}{}", digit_char(BASE / 2));
    }
}

fn pad_digits(s: &str, len: usize) -> Vec<u32> {
    let mut v: Vec<u32> = s.bytes().map(digit_value).collect();
    v.resize(len, 0);
    v
}

fn digits_midpoint(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut carry = 0i64;
    let mut sum = vec![0i64; a.len()];
    for i in (0..a.len()).rev() {
        let s = a[i] as i64 + b[i] as i64 + carry;
        sum[i] = s % BASE as i64;
        carry = s / BASE as i64;
    }
    if carry > 0 {
        sum.insert(0, carry);
    }
    // divide by two
    let mut out = vec![0u32; sum.len()];
    let mut rem = 0i64;
    for i in 0..sum.len() {
        let cur = rem * BASE as i64 + sum[i];
        out[i] = (cur / 2) as u32;
        rem = cur % 2;
    }
    out
}

fn digits_to_string(digits: &[u32]) -> String {
    digits.iter().map(|&d| digit_char(d) as char).collect()
}

fn trim_trailing_zero_digit(s: &str) -> String {
    let trimmed = s.trim_end_matches(digit_char(0) as char);
    if trimmed.is_empty() {
        digit_char(0).to_string()
    } else {
        trimmed.to_string()
    }
}

fn increment(a: &str) -> String {
    format!("{a}{}", digit_char(BASE / 2))
}

fn decrement(b: &str) -> String {
    let mut bytes = b.as_bytes().to_vec();
    if let Some(last) = bytes.last_mut() {
        let v = digit_value(*last);
        if v > 0 {
            *last = digit_char(v - 1);
            return String::from_utf8(bytes).expect("ascii alphabet");
        }
    }
    format!("{}{}", digit_char(0), decrement(&b[..b.len().saturating_sub(1)]))
}
