//! Natural ordering for file and folder names.
//!
//! Splits strings into alternating runs of digits and non-digits and compares
//! run by run: digit runs by numeric value (`file2` before `file10`),
//! everything else case-insensitively. When all shared runs compare equal the
//! shorter string sorts first, and a final case-sensitive pass breaks any
//! remaining tie so the comparator is a total order and safe as a sort key.

use std::cmp::Ordering;

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Number(&'a str),
    Text(&'a str),
}

struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let first = self.rest.chars().next()?;
        let numeric = first.is_ascii_digit();
        let split = self
            .rest
            .find(|c: char| c.is_ascii_digit() != numeric)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(split);
        self.rest = rest;
        Some(if numeric { Token::Number(run) } else { Token::Text(run) })
    }
}

/// Compare two strings in natural order.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = Tokens { rest: a };
    let mut right = Tokens { rest: b };
    loop {
        match (left.next(), right.next()) {
            // All shared tokens equal: shorter first, then a case- and
            // zero-padding-sensitive tiebreak to keep the order total.
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match compare_token(&x, &y) {
                Ordering::Equal => continue,
                decided => return decided,
            },
        }
    }
}

fn compare_token(a: &Token, b: &Token) -> Ordering {
    match (a, b) {
        (Token::Number(x), Token::Number(y)) => compare_numeric(x, y),
        (Token::Text(x), Token::Text(y)) => compare_caseless(x, y),
        // A digit run sorts before a text run, matching the raw byte order
        // of ASCII digits vs letters.
        (Token::Number(_), Token::Text(_)) => Ordering::Less,
        (Token::Text(_), Token::Number(_)) => Ordering::Greater,
    }
}

/// Compare two digit runs by value without parsing into an integer, so
/// arbitrarily long runs can't overflow: strip leading zeros, then a longer
/// run is a bigger number, and equal-length runs compare lexicographically.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_caseless(a: &str, b: &str) -> Ordering {
    let left = a.chars().flat_map(char::to_lowercase);
    let right = b.chars().flat_map(char::to_lowercase);
    left.cmp(right)
}
