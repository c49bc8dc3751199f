//! Token patterns.
//!
//! A rule's `Match` (and each of its guards) compiles into a [`Pattern`]: a
//! sequence of [`Element`]s matched position by position against a slice of
//! [`Token`]s. The set of matchable expressions is closed, so the matcher can
//! dispatch exhaustively:
//!
//! ```text
//! Pattern  = '^'? Element* '$'?
//! Element  = Token(TokenPattern) quantifier?         <word~pos>  {kind}
//!          | Alternation(Vec<Vec<Element>>) quantifier?   (a|b c)
//! TokenPattern = Any | Word(re) | Pos(re) | Tagged(kind?) | All(conjunction)
//! ```
//!
//! Matching is backtracking with greedy quantifiers and declared alternation
//! order; the first complete match found at a start position wins. Repetition
//! is expanded iteratively, so stack depth follows the pattern, not the
//! sentence length.

use crate::error::PatternError;
use crate::{Range, Token};
use regex::Regex;
use std::fmt;

/// Predicate over a single token.
#[derive(Debug, Clone)]
pub enum TokenPattern {
    /// Matches any token.
    Any,
    /// Token text fully matches the regex.
    Word(Regex),
    /// Token part-of-speech label fully matches the regex.
    Pos(Regex),
    /// Token already carries a tag of this kind (`None`: any tag).
    Tagged(Option<String>),
    /// Every inner pattern matches.
    All(Vec<TokenPattern>),
}

impl TokenPattern {
    pub fn matches(&self, token: &Token) -> bool {
        match self {
            TokenPattern::Any => true,
            TokenPattern::Word(re) => re.is_match(&token.text),
            TokenPattern::Pos(re) => re.is_match(&token.pos),
            TokenPattern::Tagged(None) => !token.tags.is_empty(),
            TokenPattern::Tagged(Some(kind)) => token.tags.iter().any(|t| &t.kind == kind),
            TokenPattern::All(parts) => parts.iter().all(|p| p.matches(token)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    One,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug, Clone)]
pub enum Element {
    Token { pattern: TokenPattern, quantifier: Quantifier },
    Alternation { branches: Vec<Vec<Element>>, quantifier: Quantifier },
}

impl Element {
    fn quantifier(&self) -> Quantifier {
        match self {
            Element::Token { quantifier, .. } | Element::Alternation { quantifier, .. } => *quantifier,
        }
    }

    fn set_quantifier(&mut self, q: Quantifier) {
        match self {
            Element::Token { quantifier, .. } | Element::Alternation { quantifier, .. } => *quantifier = q,
        }
    }

    /// Every end position of one repetition starting at `pos`, in the order
    /// [`match_once`](Self::match_once) would try them.
    fn ends(&self, tokens: &[Token], pos: usize) -> Vec<usize> {
        let mut ends = Vec::new();
        self.match_once(tokens, pos, &mut |p| {
            if !ends.contains(&p) {
                ends.push(p);
            }
            false
        });
        ends
    }

    /// Match exactly one repetition of this element at `pos`, handing every
    /// possible end position to `next` until it accepts.
    fn match_once(&self, tokens: &[Token], pos: usize, next: &mut dyn FnMut(usize) -> bool) -> bool {
        match self {
            Element::Token { pattern, .. } => match tokens.get(pos) {
                Some(token) if pattern.matches(token) => next(pos + 1),
                _ => false,
            },
            Element::Alternation { branches, .. } => {
                branches.iter().any(|branch| match_seq(branch, tokens, pos, &mut *next))
            }
        }
    }
}

fn match_seq(elems: &[Element], tokens: &[Token], pos: usize, accept: &mut dyn FnMut(usize) -> bool) -> bool {
    let Some((first, rest)) = elems.split_first() else {
        return accept(pos);
    };
    let mut next = |p: usize| match_seq(rest, tokens, p, &mut *accept);

    match first.quantifier() {
        Quantifier::One => first.match_once(tokens, pos, &mut next),
        Quantifier::Optional => {
            let taken = first.match_once(tokens, pos, &mut next);
            taken || next(pos)
        }
        Quantifier::ZeroOrMore => repeat(first, tokens, pos, true, &mut next),
        Quantifier::OneOrMore => repeat(first, tokens, pos, false, &mut next),
    }
}

/// Greedy repetition without recursing per repetition: collect every
/// position reachable by one or more rounds (each round must consume
/// something), then hand them to `next` longest first, with zero rounds last
/// when allowed.
fn repeat(elem: &Element, tokens: &[Token], pos: usize, allow_zero: bool, next: &mut dyn FnMut(usize) -> bool) -> bool {
    let mut seen = vec![false; tokens.len() + 1];
    let mut reached = Vec::new();
    let mut frontier = vec![pos];
    while let Some(from) = frontier.pop() {
        for end in elem.ends(tokens, from) {
            if end > from && !seen[end] {
                seen[end] = true;
                reached.push(end);
                frontier.push(end);
            }
        }
    }
    reached.sort_unstable_by(|a, b| b.cmp(a));
    if allow_zero {
        reached.push(pos);
    }
    reached.into_iter().any(|end| next(end))
}

/// A compiled token pattern.
#[derive(Clone)]
pub struct Pattern {
    pub elements: Vec<Element>,
    pub anchor_start: bool,
    pub anchor_end: bool,
    source: String,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Pattern {
    /// Compile `source`. Word regexes are case-insensitive unless
    /// `case_sensitive` is set; POS regexes are always case-sensitive.
    pub fn parse(source: &str, case_sensitive: bool) -> Result<Pattern, PatternError> {
        PatternParser { src: source, pos: 0, case_sensitive }.parse()
    }

    /// The text this pattern was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// End of the first match starting exactly at `start`, if any.
    pub fn match_at(&self, tokens: &[Token], start: usize) -> Option<usize> {
        if start > tokens.len() || (self.anchor_start && start != 0) {
            return None;
        }
        let len = tokens.len();
        let anchor_end = self.anchor_end;
        let mut end = None;
        match_seq(&self.elements, tokens, start, &mut |p| {
            if anchor_end && p != len {
                return false;
            }
            end = Some(p);
            true
        });
        end
    }

    /// Leftmost, non-overlapping, non-empty matches in `tokens`.
    ///
    /// ```text
    /// tokens:  [on] [Friday] [or] [Friday]
    /// <Friday> ->     1..2          3..4
    /// ```
    pub fn find_iter(&self, tokens: &[Token]) -> Vec<Range> {
        let mut found = Vec::new();
        let mut pos = 0;
        while pos < tokens.len() {
            match self.match_at(tokens, pos) {
                Some(end) if end > pos => {
                    found.push(Range::new(pos, end));
                    pos = end;
                }
                _ => pos += 1,
            }
            if self.anchor_start {
                break;
            }
        }
        found
    }

    /// Tag kinds this pattern looks at through `{kind}` elements; `None`
    /// stands for `{}` (any tag).
    pub fn tag_kinds(&self) -> Vec<Option<&str>> {
        fn walk<'p>(elements: &'p [Element], out: &mut Vec<Option<&'p str>>) {
            for element in elements {
                match element {
                    Element::Token { pattern, .. } => token_kinds(pattern, out),
                    Element::Alternation { branches, .. } => branches.iter().for_each(|b| walk(b, out)),
                }
            }
        }
        fn token_kinds<'p>(pattern: &'p TokenPattern, out: &mut Vec<Option<&'p str>>) {
            match pattern {
                TokenPattern::Tagged(kind) => {
                    let kind = kind.as_deref();
                    if !out.contains(&kind) {
                        out.push(kind);
                    }
                }
                TokenPattern::All(parts) => parts.iter().for_each(|p| token_kinds(p, out)),
                TokenPattern::Any | TokenPattern::Word(_) | TokenPattern::Pos(_) => {}
            }
        }

        let mut kinds = Vec::new();
        walk(&self.elements, &mut kinds);
        kinds
    }

    /// True when the pattern matches anywhere in `tokens`, empty matches
    /// included. Used for guards.
    pub fn occurs_in(&self, tokens: &[Token]) -> bool {
        let last = if self.anchor_start { 0 } else { tokens.len() };
        (0..=last).any(|start| self.match_at(tokens, start).is_some())
    }
}

// --- Pattern syntax ------------------------------------------------------------

struct PatternParser<'a> {
    src: &'a str,
    pos: usize,
    case_sensitive: bool,
}

impl PatternParser<'_> {
    fn parse(mut self) -> Result<Pattern, PatternError> {
        self.skip_ws();
        let anchor_start = self.eat('^');
        let elements = self.parse_seq(false)?;
        self.skip_ws();
        let anchor_end = self.eat('$');
        self.skip_ws();
        if let Some(c) = self.peek() {
            return Err(PatternError::Unexpected { found: c, offset: self.pos });
        }
        if elements.is_empty() {
            return Err(PatternError::Empty);
        }
        Ok(Pattern { elements, anchor_start, anchor_end, source: self.src.trim().to_string() })
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    /// Parse elements until end of input, `$`, or (inside a group) `|`/`)`.
    fn parse_seq(&mut self, in_group: bool) -> Result<Vec<Element>, PatternError> {
        let mut elements = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some('$') => break,
                Some('|') | Some(')') if in_group => break,
                Some(_) => {
                    let mut element = self.parse_element()?;
                    if let Some(q) = self.parse_quantifier() {
                        element.set_quantifier(q);
                    }
                    elements.push(element);
                }
            }
        }
        Ok(elements)
    }

    fn parse_quantifier(&mut self) -> Option<Quantifier> {
        let q = match self.peek()? {
            '?' => Quantifier::Optional,
            '*' => Quantifier::ZeroOrMore,
            '+' => Quantifier::OneOrMore,
            _ => return None,
        };
        self.pos += 1;
        Some(q)
    }

    fn parse_element(&mut self) -> Result<Element, PatternError> {
        let offset = self.pos;
        match self.bump() {
            Some('<') => {
                let body = self.take_until('<', '>', offset)?;
                Ok(Element::Token { pattern: self.token_pattern(&body)?, quantifier: Quantifier::One })
            }
            Some('{') => {
                let body = self.take_until('{', '}', offset)?;
                let kind = body.trim();
                let kind = if kind.is_empty() { None } else { Some(kind.to_string()) };
                Ok(Element::Token { pattern: TokenPattern::Tagged(kind), quantifier: Quantifier::One })
            }
            Some('(') => {
                let mut branches = Vec::new();
                loop {
                    let branch = self.parse_seq(true)?;
                    if branch.is_empty() {
                        return Err(match self.peek() {
                            Some(c) => PatternError::Unexpected { found: c, offset: self.pos },
                            None => PatternError::Unterminated { open: '(', offset },
                        });
                    }
                    branches.push(branch);
                    match self.bump() {
                        Some('|') => continue,
                        Some(')') => break,
                        _ => return Err(PatternError::Unterminated { open: '(', offset }),
                    }
                }
                Ok(Element::Alternation { branches, quantifier: Quantifier::One })
            }
            Some(found) => Err(PatternError::Unexpected { found, offset }),
            None => Err(PatternError::Empty),
        }
    }

    /// Read up to the closing delimiter. `\>` (or `\}`) stands for a literal
    /// delimiter inside the body.
    fn take_until(&mut self, open: char, close: char, offset: usize) -> Result<String, PatternError> {
        let mut body = String::new();
        loop {
            match self.bump() {
                None => return Err(PatternError::Unterminated { open, offset }),
                Some('\\') if self.peek() == Some(close) => {
                    self.pos += close.len_utf8();
                    body.push(close);
                }
                Some(c) if c == close => return Ok(body),
                Some(c) => body.push(c),
            }
        }
    }

    fn token_pattern(&self, body: &str) -> Result<TokenPattern, PatternError> {
        let (word, pos) = body.split_once('~').unwrap_or((body, ""));
        let mut parts = Vec::new();
        if !word.is_empty() {
            let flags = if self.case_sensitive { "" } else { "(?i)" };
            parts.push(TokenPattern::Word(compile_full(word, flags)?));
        }
        if !pos.is_empty() {
            parts.push(TokenPattern::Pos(compile_full(pos, "")?));
        }
        Ok(match parts.len() {
            0 => TokenPattern::Any,
            1 => parts.remove(0),
            _ => TokenPattern::All(parts),
        })
    }
}

fn compile_full(expr: &str, flags: &str) -> Result<Regex, PatternError> {
    Regex::new(&format!("{flags}^(?:{expr})$"))
        .map_err(|error| PatternError::Regex { source_text: expr.to_string(), error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tag, sentence};

    fn words(text: &str) -> Vec<Token> {
        text.split_whitespace().map(|w| Token::new(w, "NN")).collect()
    }

    #[test]
    fn literal_word_is_case_insensitive_by_default() {
        let p = Pattern::parse("<friday>", false).unwrap();
        assert_eq!(p.find_iter(&words("We went shopping on Friday")), vec![Range::new(4, 5)]);

        let strict = Pattern::parse("<friday>", true).unwrap();
        assert!(strict.find_iter(&words("on Friday")).is_empty());
    }

    #[test]
    fn word_and_pos_form_a_conjunction() {
        let p = Pattern::parse("<Friday~NNP>", false).unwrap();
        let tokens = sentence(&[("Friday", "NNP"), ("Friday", "NN")]);
        assert_eq!(p.find_iter(&tokens), vec![Range::new(0, 1)]);

        let pos_only = Pattern::parse("<~NN.*>", false).unwrap();
        assert_eq!(pos_only.find_iter(&tokens), vec![Range::new(0, 2)]);
    }

    #[test]
    fn regex_must_match_the_whole_token() {
        let p = Pattern::parse("<Fri>", false).unwrap();
        assert!(p.find_iter(&words("Friday")).is_empty());
    }

    #[test]
    fn quantifiers_are_greedy() {
        let p = Pattern::parse("<very>* <late> <night>?", false).unwrap();
        let tokens = words("a very very late night");
        assert_eq!(p.find_iter(&tokens), vec![Range::new(1, 5)]);

        let plus = Pattern::parse("<very>+", false).unwrap();
        assert_eq!(plus.find_iter(&tokens), vec![Range::new(1, 3)]);
    }

    #[test]
    fn optional_element_backtracks() {
        // `<last>?` greedily takes "last" but the rest still has to match.
        let p = Pattern::parse("<last>? <last> <week>", false).unwrap();
        assert_eq!(p.find_iter(&words("last week")), vec![Range::new(0, 2)]);
    }

    #[test]
    fn alternation_tries_branches_in_order() {
        let p = Pattern::parse("(<next> <week>|<next>) <Monday>?", false).unwrap();
        assert_eq!(p.find_iter(&words("next week Monday")), vec![Range::new(0, 3)]);
        assert_eq!(p.find_iter(&words("next Monday")), vec![Range::new(0, 2)]);
    }

    #[test]
    fn anchors_restrict_the_span() {
        let start = Pattern::parse("^<on>", false).unwrap();
        assert_eq!(start.find_iter(&words("on Friday")), vec![Range::new(0, 1)]);
        assert!(start.find_iter(&words("later on")).is_empty());

        let end = Pattern::parse("<on>$", false).unwrap();
        assert!(end.occurs_in(&words("shopping on")));
        assert!(!end.occurs_in(&words("on shopping")));
    }

    #[test]
    fn tagged_element_sees_existing_annotations() {
        let mut tokens = words("last Friday");
        tokens[1].tags.insert(Tag::new("date", Range::new(1, 2)));

        let p = Pattern::parse("<last> {date}", false).unwrap();
        assert_eq!(p.find_iter(&tokens), vec![Range::new(0, 2)]);
        assert!(Pattern::parse("<last> {time}", false).unwrap().find_iter(&tokens).is_empty());
        assert!(!Pattern::parse("<last> {}", false).unwrap().find_iter(&tokens).is_empty());
    }

    #[test]
    fn long_repetition_does_not_grow_the_stack() {
        let mut tokens = words(&"x ".repeat(50_000));
        tokens.push(Token::new("y", "NN"));

        let p = Pattern::parse("<x>+ <y>", false).unwrap();
        assert_eq!(p.find_iter(&tokens), vec![Range::new(0, 50_001)]);
        assert_eq!(Pattern::parse("(<x>|<z>)* <y>$", false).unwrap().match_at(&tokens, 0), Some(50_001));
    }

    #[test]
    fn repetition_gives_back_tokens_when_needed() {
        let p = Pattern::parse("<x>* <x> <y>", false).unwrap();
        assert_eq!(p.find_iter(&words("x x x y")), vec![Range::new(0, 4)]);
        assert!(p.find_iter(&words("y")).is_empty());
    }

    #[test]
    fn tag_kinds_lists_every_tagged_element() {
        let p = Pattern::parse("{date} (<of> {year}|{}) {date}", false).unwrap();
        assert_eq!(p.tag_kinds(), vec![Some("date"), Some("year"), None]);
        assert!(Pattern::parse("<last> <Friday>", false).unwrap().tag_kinds().is_empty());
    }

    #[test]
    fn matches_do_not_overlap() {
        let p = Pattern::parse("<x> <x>", false).unwrap();
        assert_eq!(p.find_iter(&words("x x x x x")), vec![Range::new(0, 2), Range::new(2, 4)]);
    }

    #[test]
    fn escaped_delimiter_is_literal() {
        let p = Pattern::parse(r"<a\>b>", false).unwrap();
        assert_eq!(p.find_iter(&words("a>b")), vec![Range::new(0, 1)]);
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(matches!(Pattern::parse("", false), Err(PatternError::Empty)));
        assert!(matches!(Pattern::parse("<Friday~POS", false), Err(PatternError::Unterminated { open: '<', .. })));
        assert!(matches!(Pattern::parse("(<a>|<b>", false), Err(PatternError::Unterminated { open: '(', .. })));
        assert!(matches!(Pattern::parse("Friday", false), Err(PatternError::Unexpected { found: 'F', .. })));
        assert!(matches!(Pattern::parse("<Fri(day>", false), Err(PatternError::Regex { .. })));
        assert!(matches!(Pattern::parse("<a> $ <b>", false), Err(PatternError::Unexpected { .. })));
    }
}
