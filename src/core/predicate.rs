// where clause risk - is it missing, always true, or actually filtering rows
// purely structural: a missed tautology is fine, a false alarm is not

use std::cmp::Ordering;

use serde::Serialize;
use sqlparser::tokenizer::Token;

use super::classify::is_word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateShape {
    Absent,
    Tautological,
    Selective,
}

/// The tokens between WHERE and the end of the clause.
#[derive(Debug, Clone)]
pub struct Predicate {
    text: String,
    tokens: Vec<Token>,
}

impl Predicate {
    pub(crate) fn new(text: String, tokens: Vec<Token>) -> Self {
        Self { text, tokens }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

pub fn analyze(predicate: Option<&Predicate>) -> PredicateShape {
    match predicate {
        None => PredicateShape::Absent,
        Some(p) if p.tokens.is_empty() => PredicateShape::Absent,
        Some(p) if always_true(&p.tokens) => PredicateShape::Tautological,
        Some(_) => PredicateShape::Selective,
    }
}

fn always_true(tokens: &[Token]) -> bool {
    let tokens = strip_parens(tokens);

    let disjuncts = split_on(tokens, "OR");
    if disjuncts.len() > 1 {
        return disjuncts.into_iter().any(always_true);
    }

    let conjuncts = split_on(tokens, "AND");
    if conjuncts.len() > 1 {
        return conjuncts.into_iter().all(always_true);
    }

    atom(tokens)
}

fn atom(tokens: &[Token]) -> bool {
    if tokens.first().is_some_and(|t| is_word(t, "NOT")) {
        return always_false(&tokens[1..]);
    }

    let Some((left, used)) = literal(tokens) else {
        return false;
    };
    let rest = &tokens[used..];
    if rest.is_empty() {
        return left.truthy();
    }

    let Some((op, used)) = operator(rest) else {
        return false;
    };
    let rest = &rest[used..];
    match literal(rest) {
        Some((right, used)) if used == rest.len() => op.holds(&left, &right),
        _ => false,
    }
}

fn always_false(tokens: &[Token]) -> bool {
    let tokens = strip_parens(tokens);
    matches!(literal(tokens), Some((lit, used)) if used == tokens.len() && lit.falsy())
}

fn strip_parens(mut tokens: &[Token]) -> &[Token] {
    while let [Token::LParen, inner @ .., Token::RParen] = tokens {
        if !balanced(inner) {
            break;
        }
        tokens = inner;
    }
    tokens
}

fn balanced(tokens: &[Token]) -> bool {
    let mut depth = 0i32;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

// splits on a top-level keyword; parens and CASE..END nest, and the AND
// belonging to a BETWEEN is not a conjunction
fn split_on<'t>(tokens: &'t [Token], keyword: &str) -> Vec<&'t [Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut between = false;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ if is_word(token, "CASE") => depth += 1,
            _ if is_word(token, "END") => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_word(token, "BETWEEN") => between = true,
            _ if depth == 0 && is_word(token, keyword) => {
                if keyword == "AND" && between {
                    between = false;
                } else {
                    parts.push(&tokens[start..i]);
                    start = i + 1;
                }
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);

    parts
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Literal {
    fn truthy(&self) -> bool {
        match self {
            Self::Integer(n) => *n != 0,
            Self::Real(n) => *n != 0.0,
            _ => false,
        }
    }

    fn falsy(&self) -> bool {
        match self {
            Self::Integer(n) => *n == 0,
            Self::Real(n) => *n == 0.0,
            _ => false,
        }
    }

    fn negate(self) -> Option<Self> {
        match self {
            Self::Integer(n) => n.checked_neg().map(Self::Integer),
            Self::Real(n) => Some(Self::Real(-n)),
            _ => None,
        }
    }
}

// TRUE and FALSE are taken as the constants 1 and 0. sqlite resolves them to a
// column instead when the table has one by that name; such deletes still go
// through the shadow check, so the label is the only thing that is off
fn literal(tokens: &[Token]) -> Option<(Literal, usize)> {
    match tokens {
        [Token::Minus, Token::Number(n, _), ..] => number(n)?.negate().map(|v| (v, 2)),
        [Token::Plus, Token::Number(n, _), ..] => number(n).map(|v| (v, 2)),
        [Token::Number(n, _), ..] => number(n).map(|v| (v, 1)),
        [Token::SingleQuotedString(s), ..] => Some((Literal::Text(s.clone()), 1)),
        [t, ..] if is_word(t, "TRUE") => Some((Literal::Integer(1), 1)),
        [t, ..] if is_word(t, "FALSE") => Some((Literal::Integer(0), 1)),
        [t, ..] if is_word(t, "NULL") => Some((Literal::Null, 1)),
        _ => None,
    }
}

// integers that overflow i64 are reals, as in sqlite
fn number(text: &str) -> Option<Literal> {
    if text.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = text.parse::<i64>() {
            return Some(Literal::Integer(n));
        }
    }
    text.parse::<f64>().ok().map(Literal::Real)
}

// exact comparison of an integer with a real, no rounding through f64
fn compare_mixed(int: i64, real: f64) -> Option<Ordering> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63

    if real.is_nan() {
        return None;
    }
    if real >= LIMIT {
        return Some(Ordering::Less);
    }
    if real < -LIMIT {
        return Some(Ordering::Greater);
    }

    let whole = real.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&real),
        ordering => Some(ordering),
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Is,
    IsNot,
}

fn operator(tokens: &[Token]) -> Option<(Op, usize)> {
    let op = match tokens.first()? {
        Token::Eq | Token::DoubleEq => Op::Eq,
        Token::Neq => Op::Ne,
        Token::Lt => Op::Lt,
        Token::Gt => Op::Gt,
        Token::LtEq => Op::Le,
        Token::GtEq => Op::Ge,
        t if is_word(t, "IS") => {
            if tokens.get(1).is_some_and(|t| is_word(t, "NOT")) {
                return Some((Op::IsNot, 2));
            }
            Op::Is
        }
        _ => return None,
    };
    Some((op, 1))
}

impl Op {
    fn holds(self, left: &Literal, right: &Literal) -> bool {
        match (left, right) {
            (Literal::Null, Literal::Null) => matches!(self, Op::Is),
            (Literal::Null, _) | (_, Literal::Null) => matches!(self, Op::IsNot),
            (Literal::Integer(a), Literal::Integer(b)) => self.test(Some(a.cmp(b))),
            (Literal::Real(a), Literal::Real(b)) => self.test(a.partial_cmp(b)),
            (Literal::Integer(a), Literal::Real(b)) => self.test(compare_mixed(*a, *b)),
            (Literal::Real(a), Literal::Integer(b)) => {
                self.test(compare_mixed(*b, *a).map(Ordering::reverse))
            }
            // raw text keeps its escapes, so only equality is meaningful
            (Literal::Text(a), Literal::Text(b)) => match self {
                Op::Eq | Op::Is => a == b,
                Op::Ne | Op::IsNot => a != b,
                _ => false,
            },
            _ => false,
        }
    }

    fn test(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            Op::Eq | Op::Is => ordering == Ordering::Equal,
            Op::Ne | Op::IsNot => ordering != Ordering::Equal,
            Op::Lt => ordering == Ordering::Less,
            Op::Gt => ordering == Ordering::Greater,
            Op::Le => ordering != Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
        }
    }
}
