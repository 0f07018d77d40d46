// statement classification - kind, target table and where clause
// runs on the sqlparser tokenizer so strings and comments never fool it

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer};

use super::predicate::{self, Predicate, PredicateShape};
use crate::Error;

// words that can never be a table name in target position
const RESERVED: &[&str] = &[
    "WHERE",
    "RETURNING",
    "ORDER",
    "LIMIT",
    "SELECT",
    "FROM",
    "AS",
    "INDEXED",
    "NOT",
    "SET",
    "VALUES",
];

// words that may follow a table in a FROM list; anything else there is an alias
const CLAUSE_WORDS: &[&str] = &[
    "WHERE",
    "ON",
    "USING",
    "JOIN",
    "INNER",
    "LEFT",
    "RIGHT",
    "FULL",
    "CROSS",
    "NATURAL",
    "GROUP",
    "HAVING",
    "WINDOW",
    "ORDER",
    "LIMIT",
    "UNION",
    "EXCEPT",
    "INTERSECT",
    "INDEXED",
    "NOT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Create,
    Alter,
    Other,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Drop => "DROP",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Other => "OTHER",
        }
    }

    // only these ever write rows, so only these report rows affected
    pub fn mutates_rows(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    fn from_verb(verb: &str) -> Self {
        match verb {
            "SELECT" => Self::Select,
            "INSERT" | "REPLACE" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "DROP" => Self::Drop,
            "CREATE" => Self::Create,
            "ALTER" => Self::Alter,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "OTHER" => Ok(Self::Other),
            verb => match Self::from_verb(verb) {
                Self::Other => Err(format!("unknown statement kind: {s}")),
                kind => Ok(kind),
            },
        }
    }
}

/// Table (or other object) a DELETE or DROP points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub schema: Option<String>,
    pub name: String,
    text: String,
    span: Range<usize>,
}

impl Target {
    /// The reference exactly as written in the statement, quotes included.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One statement with everything the policy needs to know about it.
#[derive(Debug, Clone)]
pub struct Classified {
    sql: String,
    kind: StatementKind,
    target: Option<Target>,
    predicate: Option<Predicate>,
    shape: Option<PredicateShape>,
    placeholders: usize,
    // `users.id` style references to the target, rewritten with it
    qualifiers: Vec<Range<usize>>,
}

impl Classified {
    fn empty() -> Self {
        Self {
            sql: String::new(),
            kind: StatementKind::Other,
            target: None,
            predicate: None,
            shape: None,
            placeholders: 0,
            qualifiers: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Shape of the WHERE clause; only set for DELETE and UPDATE.
    pub fn shape(&self) -> Option<PredicateShape> {
        self.shape
    }

    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Re-emits the statement with the target (and any column qualifier
    /// naming it) swapped for `relation`. Every other token is kept as written.
    pub fn retarget(&self, relation: &str) -> Option<String> {
        let target = self.target.as_ref()?;

        let mut spans: Vec<&Range<usize>> = self.qualifiers.iter().collect();
        spans.push(&target.span);
        spans.sort_by_key(|span| span.start);

        let mut out = String::with_capacity(self.sql.len() + relation.len());
        let mut at = 0;
        for span in spans {
            out.push_str(&self.sql[at..span.start]);
            out.push_str(relation);
            at = span.end;
        }
        out.push_str(&self.sql[at..]);

        Some(out)
    }
}

/// Classifies exactly one statement. More than one is an error; none at all
/// gives an empty classification that runs as a no-op.
pub fn classify(sql: &str) -> Result<Classified, Error> {
    let mut statements = split(sql)?;
    match statements.len() {
        0 => Ok(Classified::empty()),
        1 => Ok(statements.remove(0)),
        n => Err(Error::MultipleStatements(n)),
    }
}

/// Splits input into statements on top-level semicolons and classifies each.
pub fn split(sql: &str) -> Result<Vec<Classified>, Error> {
    let lexemes = lex(sql)?;

    let mut statements = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut first = true;
    let mut in_create = false;

    for (i, lexeme) in lexemes.iter().enumerate() {
        let token = &lexeme.token;
        if is_trivia(token) {
            continue;
        }

        if first {
            in_create = is_word(token, "CREATE");
            first = false;
        }

        match token {
            Token::SemiColon if depth == 0 => {
                statements.extend(segment(sql, &lexemes[start..i]));
                start = i + 1;
                first = true;
                in_create = false;
            }
            // trigger bodies carry their own semicolons
            _ if in_create && (is_word(token, "BEGIN") || is_word(token, "CASE")) => depth += 1,
            _ if in_create && is_word(token, "END") => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    statements.extend(segment(sql, &lexemes[start..]));

    Ok(statements)
}

pub fn is_drop_query(sql: &str) -> bool {
    match split(sql) {
        Ok(statements) => statements.iter().any(|s| s.kind == StatementKind::Drop),
        Err(_) => true,
    }
}

pub fn is_delete_without_where(sql: &str) -> bool {
    match split(sql) {
        Ok(statements) => statements
            .iter()
            .any(|s| s.kind == StatementKind::Delete && s.shape == Some(PredicateShape::Absent)),
        Err(_) => true,
    }
}

pub fn is_always_true_where(sql: &str) -> bool {
    match split(sql) {
        Ok(statements) => statements
            .iter()
            .any(|s| s.shape == Some(PredicateShape::Tautological)),
        Err(_) => false,
    }
}

/// A DELETE that would hit every row, or whose target can't be found.
pub fn is_dangerous_delete(sql: &str) -> bool {
    match split(sql) {
        Ok(statements) => statements.iter().any(|s| {
            s.kind == StatementKind::Delete
                && (s.target.is_none() || s.shape != Some(PredicateShape::Selective))
        }),
        Err(_) => true,
    }
}

pub(crate) fn is_word(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword))
}

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_))
}

#[derive(Debug, Clone)]
struct Lexeme {
    token: Token,
    span: Range<usize>,
}

fn lex(sql: &str) -> Result<Vec<Lexeme>, Error> {
    let dialect = SQLiteDialect {};
    let mut tokenizer = Tokenizer::new(&dialect, sql).with_unescape(false);
    let tokens = tokenizer
        .tokenize_with_location()
        .map_err(|e| Error::ClassificationAmbiguous(e.to_string()))?;

    let mut cursor = Cursor::new(sql);
    Ok(tokens
        .into_iter()
        .map(|t| {
            let start = cursor.seek(t.span.start);
            let end = cursor.seek(t.span.end);
            Lexeme {
                token: t.token,
                span: start..end,
            }
        })
        .collect())
}

// turns tokenizer line/column locations back into byte offsets.
// locations only move forward, so one pass over the text is enough
struct Cursor<'a> {
    src: &'a str,
    byte: usize,
    line: u64,
    column: u64,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            byte: 0,
            line: 1,
            column: 1,
        }
    }

    fn seek(&mut self, to: Location) -> usize {
        while (self.line, self.column) < (to.line, to.column) {
            let Some(ch) = self.src[self.byte..].chars().next() else {
                break;
            };
            self.byte += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.byte
    }
}

// one statement's worth of lexemes, trimmed of surrounding trivia
fn segment(sql: &str, lexemes: &[Lexeme]) -> Option<Classified> {
    let first = lexemes.iter().position(|l| !is_trivia(&l.token))?;
    let last = lexemes.iter().rposition(|l| !is_trivia(&l.token))?;

    let offset = lexemes[first].span.start;
    let end = lexemes[last].span.end;
    let text = sql[offset..end].to_string();

    let significant: Vec<Lexeme> = lexemes[first..=last]
        .iter()
        .filter(|l| !is_trivia(&l.token))
        .map(|l| Lexeme {
            token: l.token.clone(),
            span: l.span.start - offset..l.span.end - offset,
        })
        .collect();

    Some(build(text, &significant))
}

fn build(sql: String, lexemes: &[Lexeme]) -> Classified {
    let kind = statement_kind(lexemes);
    let placeholders = lexemes
        .iter()
        .filter(|l| matches!(l.token, Token::Placeholder(_)))
        .count();

    let (target, qualifiers) = match kind {
        StatementKind::Delete => delete_target(&sql, lexemes),
        StatementKind::Drop => (drop_target(&sql, lexemes), Vec::new()),
        _ => (None, Vec::new()),
    };

    let predicate = match kind {
        StatementKind::Delete | StatementKind::Update => where_clause(&sql, lexemes),
        _ => None,
    };
    let shape = matches!(kind, StatementKind::Delete | StatementKind::Update)
        .then(|| predicate::analyze(predicate.as_ref()));

    Classified {
        sql,
        kind,
        target,
        predicate,
        shape,
        placeholders,
        qualifiers,
    }
}

fn statement_kind(lexemes: &[Lexeme]) -> StatementKind {
    let Some(first) = lexemes.first().and_then(|l| word(&l.token)) else {
        return StatementKind::Other;
    };

    if first != "WITH" {
        return StatementKind::from_verb(&first);
    }

    // WITH ... classify by the first top-level verb after the cte list
    let mut depth = 0usize;
    for lexeme in &lexemes[1..] {
        match &lexeme.token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            token if depth == 0 => {
                if let Some(verb) = word(token) {
                    if matches!(
                        verb.as_str(),
                        "SELECT" | "INSERT" | "REPLACE" | "UPDATE" | "DELETE"
                    ) {
                        return StatementKind::from_verb(&verb);
                    }
                }
            }
            _ => {}
        }
    }
    StatementKind::Other
}

fn word(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_ascii_uppercase()),
        _ => None,
    }
}

// first top-level position where `accept` matches
fn top_level(lexemes: &[Lexeme], accept: impl Fn(&Token) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (i, lexeme) in lexemes.iter().enumerate() {
        match &lexeme.token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            token if depth == 0 && accept(token) => return Some(i),
            _ => {}
        }
    }
    None
}

fn delete_target(sql: &str, lexemes: &[Lexeme]) -> (Option<Target>, Vec<Range<usize>>) {
    let Some(from) = top_level(lexemes, |t| is_word(t, "FROM")) else {
        return (None, Vec::new());
    };
    let Some((target, used)) = qualified_name(sql, &lexemes[from + 1..]) else {
        return (None, Vec::new());
    };

    let qualifiers = qualifiers(lexemes, from + 1 + used, &target.name);
    (Some(target), qualifiers)
}

// `target.` references from `after` on that resolve to the outer target.
// inside a subquery that selects from the same table again, the name means
// the inner table and is left alone
fn qualifiers(lexemes: &[Lexeme], after: usize, name: &str) -> Vec<Range<usize>> {
    let names = |i: usize| {
        matches!(&lexemes[i].token, Token::Word(w) if w.value.eq_ignore_ascii_case(name))
            && !matches!(&lexemes[i - 1].token, Token::Period)
    };
    let dotted = |i: usize| matches!(lexemes.get(i + 1).map(|l| &l.token), Some(Token::Period));

    // scopes, keyed by their opening paren, that bring in their own copy of the table
    let mut open = Vec::new();
    let mut hiding = Vec::new();
    for i in after..lexemes.len() {
        match &lexemes[i].token {
            Token::LParen => open.push(i),
            Token::RParen => {
                open.pop();
            }
            _ if names(i) && !dotted(i) && declares_table(lexemes, i) => {
                if let Some(&scope) = open.last() {
                    hiding.push(scope);
                }
            }
            _ => {}
        }
    }

    let mut open = Vec::new();
    let mut spans = Vec::new();
    for i in after..lexemes.len() {
        match &lexemes[i].token {
            Token::LParen => open.push(i),
            Token::RParen => {
                open.pop();
            }
            _ if names(i) && dotted(i) && !open.iter().any(|s| hiding.contains(s)) => {
                spans.push(lexemes[i].span.clone());
            }
            _ => {}
        }
    }
    spans
}

// the name at `at` sits in a FROM / JOIN list without an alias, so it
// shadows the outer table for the rest of that scope
fn declares_table(lexemes: &[Lexeme], at: usize) -> bool {
    let source = matches!(&lexemes[at - 1].token, Token::Comma)
        || is_word(&lexemes[at - 1].token, "FROM")
        || is_word(&lexemes[at - 1].token, "JOIN");
    if !source {
        return false;
    }

    match lexemes.get(at + 1).map(|l| &l.token) {
        Some(token) if is_word(token, "AS") => false,
        Some(Token::Word(w)) if w.quote_style.is_some() => false,
        Some(Token::Word(w)) => CLAUSE_WORDS.iter().any(|kw| w.value.eq_ignore_ascii_case(kw)),
        _ => true,
    }
}

fn drop_target(sql: &str, lexemes: &[Lexeme]) -> Option<Target> {
    let object = lexemes.get(1)?;
    if !["TABLE", "VIEW", "INDEX", "TRIGGER"]
        .iter()
        .any(|kw| is_word(&object.token, kw))
    {
        return None;
    }

    let mut at = 2;
    if lexemes.get(at).is_some_and(|l| is_word(&l.token, "IF"))
        && lexemes.get(at + 1).is_some_and(|l| is_word(&l.token, "EXISTS"))
    {
        at += 2;
    }

    qualified_name(sql, lexemes.get(at..)?).map(|(target, _)| target)
}

// `name` or `schema.name`, returning how many lexemes it took
fn qualified_name(sql: &str, lexemes: &[Lexeme]) -> Option<(Target, usize)> {
    let first = lexemes.first()?;
    let head = identifier(&first.token)?;

    let dotted = matches!(lexemes.get(1).map(|l| &l.token), Some(Token::Period));
    if dotted {
        let last = lexemes.get(2)?;
        let name = identifier(&last.token)?;
        let span = first.span.start..last.span.end;
        return Some((
            Target {
                schema: Some(head),
                name,
                text: sql[span.clone()].to_string(),
                span,
            },
            3,
        ));
    }

    Some((
        Target {
            schema: None,
            name: head,
            text: sql[first.span.clone()].to_string(),
            span: first.span.clone(),
        },
        1,
    ))
}

fn identifier(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) if w.quote_style.is_some() => Some(w.value.clone()),
        Token::Word(w) if !RESERVED.iter().any(|kw| w.value.eq_ignore_ascii_case(kw)) => {
            Some(w.value.clone())
        }
        _ => None,
    }
}

fn where_clause(sql: &str, lexemes: &[Lexeme]) -> Option<Predicate> {
    let at = top_level(lexemes, |t| is_word(t, "WHERE"))?;
    let rest = &lexemes[at + 1..];
    let len = top_level(rest, |t| {
        ["RETURNING", "ORDER", "LIMIT"]
            .iter()
            .any(|kw| is_word(t, kw))
    })
    .unwrap_or(rest.len());
    let body = &rest[..len];

    let text = match (body.first(), body.last()) {
        (Some(first), Some(last)) => sql[first.span.start..last.span.end].to_string(),
        _ => String::new(),
    };

    Some(Predicate::new(
        text,
        body.iter().map(|l| l.token.clone()).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_survive_multibyte_text() {
        let c = classify("DELETE FROM \"naïve\" WHERE name = 'é'").unwrap();
        assert_eq!(c.target().unwrap().text(), "\"naïve\"");
        assert_eq!(c.predicate().unwrap().text(), "name = 'é'");
    }

    #[test]
    fn offsets_survive_newlines() {
        let c = classify("DELETE\n  FROM\n\tusers\nWHERE id = 1").unwrap();
        assert_eq!(c.target().unwrap().text(), "users");
        assert_eq!(c.predicate().unwrap().text(), "id = 1");
    }
}
