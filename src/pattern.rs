//! Shell-style exclusion patterns for tar entry names.
//!
//! A set of glob patterns is translated into regular expressions and compiled into a single
//! multi-pattern lazy DFA, so deciding whether an entry is excluded costs one anchored search no
//! matter how many patterns there are.  The output pattern ID of a match is the index of the
//! (first) glob that matched.
//!
//! Supported syntax, matched against the whole entry name:
//!
//!  - `*` matches any sequence of characters other than `/`
//!  - `?` matches any single character other than `/`, or a single byte that is not valid UTF-8
//!  - `[abc]`, `[a-z]` match one character from the class; `[^...]` or `[!...]` negate it
//!  - `\c` matches the character `c` literally
//!
//! Matching is case-sensitive.  Names are bytes, not text: the wildcards also cover bytes that
//! are not valid UTF-8.

use regex_automata::{hybrid::dfa, util::syntax, Anchored, Input};

use crate::error::{ArchiveError, Result};

/// One name character for `?` and `*`: a UTF-8 scalar other than `/`, or any non-ASCII byte.
const ANY_CHAR: &str = r"(?:[^/]|(?-u:[\x80-\xFF]))";

fn syntax_config() -> syntax::Config {
    syntax::Config::new().utf8(false)
}

/// The outcome of checking one entry name against an [`ExclusionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No pattern matched: the entry is copied to the output.
    Keep,
    /// The pattern at this index matched: the entry is dropped.
    Exclude { pattern: usize },
}

#[derive(Debug)]
struct Matcher {
    dfa: dfa::DFA,
    cache: dfa::Cache,
}

/// A compiled, reusable set of exclusion patterns.
#[derive(Debug)]
pub struct ExclusionSet {
    patterns: Vec<String>,
    // None for the empty set, which never excludes anything
    matcher: Option<Matcher>,
}

fn is_meta(c: char) -> bool {
    matches!(
        c,
        '\\' | '.'
            | '+'
            | '*'
            | '?'
            | '('
            | ')'
            | '|'
            | '['
            | ']'
            | '{'
            | '}'
            | '^'
            | '$'
            | '#'
            | '&'
            | '-'
            | '~'
    )
}

fn push_literal(regex: &mut String, c: char) {
    if is_meta(c) {
        regex.push('\\');
    }
    regex.push(c);
}

/// Reads one bracket-expression character, resolving a `\` escape.
fn class_char(chars: &mut std::str::Chars) -> std::result::Result<char, String> {
    match chars.next() {
        None => Err("unterminated bracket expression".into()),
        Some('\\') => chars
            .next()
            .ok_or_else(|| "unterminated bracket expression".into()),
        Some(c) => Ok(c),
    }
}

/// Translates the body of a bracket expression, with the opening `[` already consumed.
fn translate_class(
    chars: &mut std::str::Chars,
    regex: &mut String,
) -> std::result::Result<(), String> {
    regex.push('[');

    let mut peek = chars.clone();
    if let Some('^' | '!') = peek.next() {
        chars.next();
        regex.push('^');
    }

    let mut members = 0;
    loop {
        let mut peek = chars.clone();
        match peek.next() {
            None => return Err("unterminated bracket expression".into()),
            Some(']') if members > 0 => {
                chars.next();
                break;
            }
            Some(']') => return Err("empty bracket expression".into()),
            Some('-') => return Err("unescaped '-' in bracket expression".into()),
            Some(_) => {}
        }

        let lo = class_char(chars)?;
        push_literal(regex, lo);

        let mut peek = chars.clone();
        if peek.next() == Some('-') {
            chars.next();
            let mut peek = chars.clone();
            if let Some(']') = peek.next() {
                return Err(format!("range {lo:?}- has no upper bound"));
            }
            let hi = class_char(chars)?;
            if hi < lo {
                return Err(format!("invalid range {lo:?}-{hi:?}"));
            }
            regex.push('-');
            push_literal(regex, hi);
        }
        members += 1;
    }

    regex.push(']');
    Ok(())
}

/// Translates a glob into an anchored regular expression over the whole name.
fn glob_to_regex(glob: &str) -> std::result::Result<String, String> {
    let mut regex = String::from("^(?:");
    let mut chars = glob.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                regex.push_str(ANY_CHAR);
                regex.push('*');
            }
            '?' => regex.push_str(ANY_CHAR),
            '[' => translate_class(&mut chars, &mut regex)?,
            '\\' => match chars.next() {
                Some(escaped) => push_literal(&mut regex, escaped),
                None => return Err("trailing backslash".into()),
            },
            c => push_literal(&mut regex, c),
        }
    }

    regex.push_str(")$");
    Ok(regex)
}

impl ExclusionSet {
    /// Compiles a set of glob patterns.
    ///
    /// Fails with [`ArchiveError::Pattern`] naming the first malformed pattern.  An empty input
    /// produces a set that keeps every entry.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();

        if patterns.is_empty() {
            return Ok(Self::empty());
        }

        let mut regexps = Vec::with_capacity(patterns.len());
        for pattern in &patterns {
            let regex =
                glob_to_regex(pattern).map_err(|reason| ArchiveError::pattern(pattern, reason))?;
            syntax::parse_with(&regex, &syntax_config())
                .map_err(|err| ArchiveError::pattern(pattern, err.to_string()))?;
            regexps.push(regex);
        }

        let dfa = dfa::Builder::new()
            .syntax(syntax_config())
            .build_many(&regexps)
            .map_err(|err| ArchiveError::pattern(patterns.join(", "), err.to_string()))?;
        let cache = dfa.create_cache();

        log::trace!("compiled {} exclusion patterns", patterns.len());

        Ok(Self {
            patterns,
            matcher: Some(Matcher { dfa, cache }),
        })
    }

    /// A set that excludes nothing.
    pub fn empty() -> Self {
        Self {
            patterns: vec![],
            matcher: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Decides whether the entry called `name` is kept or excluded.
    ///
    /// When several patterns match, the one that appears first in the set is reported.
    // mut because it touches the cache
    pub fn decide(&mut self, name: &[u8]) -> Result<Decision> {
        let Some(Matcher { dfa, cache }) = &mut self.matcher else {
            return Ok(Decision::Keep);
        };

        let input = Input::new(name).anchored(Anchored::Yes);
        match dfa.try_search_fwd(cache, &input) {
            Ok(Some(halfmatch)) => Ok(Decision::Exclude {
                pattern: halfmatch.pattern().as_usize(),
            }),
            Ok(None) => Ok(Decision::Keep),
            Err(err) => Err(ArchiveError::pattern(
                self.patterns.join(", "),
                format!(
                    "matching {:?} failed: {err}",
                    String::from_utf8_lossy(name)
                ),
            )),
        }
    }
}
