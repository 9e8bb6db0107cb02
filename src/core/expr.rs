//! SF-007: Activation expressions.
//!
//! A small, closed boolean language evaluated after placeholder substitution:
//! literals (numbers, quoted strings, `True`/`False`, `None`), list/set/tuple
//! literals, comparisons, `in` / `not in`, the subset operator `属于`, and
//! `and`/`or`/`not` (also `&&`, `||`, `!`). Nothing here can reach the host:
//! there are no names, calls or attribute lookups.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("type error: {0}")]
    Type(String),
}

pub type ExprResult<T> = Result<T, ExprError>;

// ============================================================================
// Values
// ============================================================================

/// Runtime value of an activation expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Val>),
}

impl Val {
    /// Python-style truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Number(n) => *n != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(items) => !items.is_empty(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Val::Number(n) => Some(*n),
            Val::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn loose_eq(&self, other: &Val) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self, other) {
                (Val::List(a), Val::List(b)) => {
                    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
                }
                _ => self == other,
            },
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "None",
            Val::Bool(_) => "bool",
            Val::Number(_) => "number",
            Val::Str(_) => "str",
            Val::List(_) => "list",
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => write!(f, "None"),
            Val::Bool(true) => write!(f, "True"),
            Val::Bool(false) => write!(f, "False"),
            Val::Number(n) => write!(f, "{}", n),
            Val::Str(s) => write!(f, "'{}'", s),
            Val::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Val),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    SubsetTest {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn evaluate(&self) -> ExprResult<Val> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::List(items) => Ok(Val::List(
                items.iter().map(Expr::evaluate).collect::<ExprResult<_>>()?,
            )),
            Expr::Neg(inner) => match inner.evaluate()? {
                Val::Number(n) => Ok(Val::Number(-n)),
                other => Err(ExprError::Type(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
            Expr::Compare { op, lhs, rhs } => {
                let (l, r) = (lhs.evaluate()?, rhs.evaluate()?);
                compare(*op, &l, &r).map(Val::Bool)
            }
            Expr::SubsetTest { lhs, rhs } => {
                let (l, r) = (lhs.evaluate()?, rhs.evaluate()?);
                subset(&l, &r).map(Val::Bool)
            }
            // `and`/`or` yield the deciding operand, not a bool
            Expr::And(terms) => {
                let mut last = Val::Bool(true);
                for term in terms {
                    last = term.evaluate()?;
                    if !last.truthy() {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Or(terms) => {
                let mut last = Val::Bool(false);
                for term in terms {
                    last = term.evaluate()?;
                    if last.truthy() {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Not(inner) => Ok(Val::Bool(!inner.evaluate()?.truthy())),
        }
    }
}

fn compare(op: CmpOp, l: &Val, r: &Val) -> ExprResult<bool> {
    match op {
        CmpOp::Eq => Ok(l.loose_eq(r)),
        CmpOp::Ne => Ok(!l.loose_eq(r)),
        CmpOp::In => contains(r, l),
        CmpOp::NotIn => contains(r, l).map(|b| !b),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ord = order(l, r)?;
            Ok(match op {
                CmpOp::Lt => ord.is_lt(),
                CmpOp::Le => ord.is_le(),
                CmpOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            })
        }
    }
}

fn order(l: &Val, r: &Val) -> ExprResult<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| ExprError::Type("cannot order NaN".to_string()));
    }
    match (l, r) {
        (Val::Str(a), Val::Str(b)) => Ok(a.cmp(b)),
        (Val::List(a), Val::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !x.loose_eq(y) {
                    return order(x, y);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => Err(ExprError::Type(format!(
            "'<' not supported between '{}' and '{}'",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn contains(container: &Val, item: &Val) -> ExprResult<bool> {
    match (container, item) {
        (Val::List(items), _) => Ok(items.iter().any(|v| v.loose_eq(item))),
        (Val::Str(haystack), Val::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        _ => Err(ExprError::Type(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

fn subset(l: &Val, r: &Val) -> ExprResult<bool> {
    match (l, r) {
        (Val::List(items), _) => {
            for item in items {
                if !contains(r, item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Err(ExprError::Type(format!(
            "'{}' has no subset relation",
            l.type_name()
        ))),
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Word(String),
    Cmp(CmpOp),
    AndSym,
    OrSym,
    Bang,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
}

fn syntax<T>(pos: usize, message: impl Into<String>) -> ExprResult<T> {
    Err(ExprError::Syntax {
        pos,
        message: message.into(),
    })
}

fn lex(source: &str) -> ExprResult<Vec<(usize, Token)>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two = |tok: Token, tokens: &mut Vec<(usize, Token)>| {
            tokens.push((pos, tok));
            2
        };
        let one = |tok: Token, tokens: &mut Vec<(usize, Token)>| {
            tokens.push((pos, tok));
            1
        };

        i += match (c, next) {
            ('=', Some('=')) => two(Token::Cmp(CmpOp::Eq), &mut tokens),
            ('!', Some('=')) => two(Token::Cmp(CmpOp::Ne), &mut tokens),
            ('<', Some('=')) => two(Token::Cmp(CmpOp::Le), &mut tokens),
            ('>', Some('=')) => two(Token::Cmp(CmpOp::Ge), &mut tokens),
            ('&', Some('&')) => two(Token::AndSym, &mut tokens),
            ('|', Some('|')) => two(Token::OrSym, &mut tokens),
            ('<', _) => one(Token::Cmp(CmpOp::Lt), &mut tokens),
            ('>', _) => one(Token::Cmp(CmpOp::Gt), &mut tokens),
            ('!', _) => one(Token::Bang, &mut tokens),
            ('-', _) => one(Token::Minus, &mut tokens),
            ('(', _) => one(Token::LParen, &mut tokens),
            (')', _) => one(Token::RParen, &mut tokens),
            ('[', _) => one(Token::LBracket, &mut tokens),
            (']', _) => one(Token::RBracket, &mut tokens),
            ('{', _) => one(Token::LBrace, &mut tokens),
            ('}', _) => one(Token::RBrace, &mut tokens),
            (',', _) => one(Token::Comma, &mut tokens),
            ('\'' | '"', _) => {
                let (text, used) = lex_string(&chars[i..], pos)?;
                tokens.push((pos, Token::Str(text)));
                used
            }
            (c, _) if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let (number, used) = lex_number(&chars[i..], pos)?;
                tokens.push((pos, Token::Number(number)));
                used
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let word: String = chars[i..]
                    .iter()
                    .map(|(_, c)| *c)
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                let used = word.chars().count();
                tokens.push((pos, Token::Word(word)));
                used
            }
            (c, _) => return syntax(pos, format!("unexpected character '{}'", c)),
        };
    }

    Ok(tokens)
}

fn lex_string(chars: &[(usize, char)], pos: usize) -> ExprResult<(String, usize)> {
    let quote = chars[0].1;
    let mut text = String::new();
    let mut i = 1;
    while let Some(&(_, c)) = chars.get(i) {
        match c {
            '\\' => {
                let escaped = match chars.get(i + 1).map(|(_, c)| *c) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some(other) => other,
                    None => break,
                };
                text.push(escaped);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    syntax(pos, "unterminated string literal")
}

fn lex_number(chars: &[(usize, char)], pos: usize) -> ExprResult<(f64, usize)> {
    let mut text = String::new();
    let mut i = 0;
    while let Some(&(_, c)) = chars.get(i) {
        let prev = text.chars().last();
        let accept = c.is_ascii_digit()
            || c == '.'
            || c == 'e'
            || c == 'E'
            || ((c == '+' || c == '-') && matches!(prev, Some('e' | 'E')));
        if !accept {
            break;
        }
        text.push(c);
        i += 1;
    }
    text.parse::<f64>()
        .map(|n| (n, i))
        .or_else(|_| syntax(pos, format!("invalid number '{}'", text)))
}

// ============================================================================
// Parser
// ============================================================================

/// Deepest nesting of brackets, `not` and unary minus a guard may use.
pub const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(p, _)| *p)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        tok
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == word)
    }

    fn expect(&mut self, want: Token) -> ExprResult<()> {
        let at = self.offset();
        match self.advance() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => syntax(at, format!("expected {:?}, found {:?}", want, tok)),
            None => syntax(at, format!("expected {:?}, found end of input", want)),
        }
    }

    /// Parse one level deeper, refusing input nested past [`MAX_DEPTH`].
    fn nested<T>(&mut self, at: usize, f: impl FnOnce(&mut Self) -> ExprResult<T>) -> ExprResult<T> {
        if self.depth >= MAX_DEPTH {
            return syntax(at, format!("nested deeper than {} levels", MAX_DEPTH));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn or_expr(&mut self) -> ExprResult<Expr> {
        let mut terms = vec![self.and_expr()?];
        while self.is_word("or") || self.peek() == Some(&Token::OrSym) {
            self.advance();
            terms.push(self.and_expr()?);
        }
        Ok(join(terms, Expr::Or))
    }

    fn and_expr(&mut self) -> ExprResult<Expr> {
        let mut terms = vec![self.not_expr()?];
        while self.is_word("and") || self.peek() == Some(&Token::AndSym) {
            self.advance();
            terms.push(self.not_expr()?);
        }
        Ok(join(terms, Expr::And))
    }

    fn not_expr(&mut self) -> ExprResult<Expr> {
        if self.is_word("not") || self.peek() == Some(&Token::Bang) {
            let at = self.offset();
            self.advance();
            let inner = self.nested(at, Self::not_expr)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    /// Python-style chaining: `a < b < c` means `a < b and b < c`.
    fn comparison(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.unary()?;
        let mut links: Vec<Expr> = Vec::new();

        while let Some(link) = self.link_operator() {
            let rhs = self.unary()?;
            links.push(link.build(lhs, rhs.clone()));
            lhs = rhs;
        }

        if links.is_empty() {
            return Ok(lhs);
        }
        Ok(join(links, Expr::And))
    }

    /// Consume a comparison-level operator, if one is next.
    fn link_operator(&mut self) -> Option<Link> {
        let not_in = self.is_word("not")
            && matches!(self.tokens.get(self.pos + 1), Some((_, Token::Word(w))) if w == "in");
        let (link, width) = match self.peek()? {
            Token::Cmp(op) => (Link::Cmp(*op), 1),
            Token::Word(w) if w == "in" => (Link::Cmp(CmpOp::In), 1),
            Token::Word(w) if w == "属于" => (Link::Subset, 1),
            _ if not_in => (Link::Cmp(CmpOp::NotIn), 2),
            _ => return None,
        };
        self.pos += width;
        Some(link)
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        if self.peek() == Some(&Token::Minus) {
            let at = self.offset();
            self.advance();
            return Ok(match self.nested(at, Self::unary)? {
                Expr::Literal(Val::Number(n)) => Expr::Literal(Val::Number(-n)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        let at = self.offset();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Val::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Val::Str(s))),
            Some(Token::Word(w)) => match w.as_str() {
                "True" | "true" => Ok(Expr::Literal(Val::Bool(true))),
                "False" | "false" => Ok(Expr::Literal(Val::Bool(false))),
                "None" | "null" => Ok(Expr::Literal(Val::Null)),
                _ => syntax(at, format!("unknown name '{}'", w)),
            },
            Some(Token::LParen) => {
                let (mut items, trailing_comma) =
                    self.nested(at, |p| p.sequence(Token::RParen))?;
                if items.len() == 1 && !trailing_comma {
                    return Ok(items.remove(0));
                }
                Ok(Expr::List(items))
            }
            Some(Token::LBracket) => {
                let (items, _) = self.nested(at, |p| p.sequence(Token::RBracket))?;
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let (items, _) = self.nested(at, |p| p.sequence(Token::RBrace))?;
                Ok(Expr::List(items))
            }
            Some(tok) => syntax(at, format!("unexpected token {:?}", tok)),
            None => syntax(at, "unexpected end of input"),
        }
    }

    /// Comma-separated expressions up to `close`. Reports a trailing comma.
    fn sequence(&mut self, close: Token) -> ExprResult<(Vec<Expr>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while self.peek() != Some(&close) {
            items.push(self.or_expr()?);
            trailing_comma = false;
            if self.peek() == Some(&Token::Comma) {
                self.advance();
                trailing_comma = true;
            } else {
                break;
            }
        }
        self.expect(close)?;
        Ok((items, trailing_comma))
    }
}

/// A lone term stands for itself; several are joined by `and`/`or`.
fn join(mut terms: Vec<Expr>, connective: fn(Vec<Expr>) -> Expr) -> Expr {
    if terms.len() == 1 {
        if let Some(only) = terms.pop() {
            return only;
        }
    }
    connective(terms)
}

enum Link {
    Cmp(CmpOp),
    Subset,
}

impl Link {
    fn build(self, lhs: Expr, rhs: Expr) -> Expr {
        match self {
            Link::Cmp(op) => Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Link::Subset => Expr::SubsetTest {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }
}

/// Parse an activation expression into an AST.
pub fn parse_expression(source: &str) -> ExprResult<Expr> {
    let tokens = lex(source)?;
    if tokens.is_empty() {
        return syntax(0, "empty expression");
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        depth: 0,
    };
    let expr = parser.or_expr()?;
    if parser.pos < parser.tokens.len() {
        let at = parser.offset();
        return syntax(at, "unexpected trailing input");
    }
    Ok(expr)
}

/// Evaluate an activation expression. Anything that fails to parse or
/// evaluate counts as `false`.
pub fn expression_engine(expression: &str) -> bool {
    let source = expression.replace(['\n', '\r'], "");
    match parse_expression(&source).and_then(|e| e.evaluate()) {
        Ok(value) => value.truthy(),
        Err(e) => {
            tracing::debug!("activation '{}' evaluated false: {}", source, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sf007_literals() {
        assert!(expression_engine("True"));
        assert!(expression_engine("true"));
        assert!(!expression_engine("False"));
        assert!(!expression_engine("None"));
        assert!(!expression_engine("0"));
        assert!(expression_engine("3.5"));
        assert!(!expression_engine("''"));
        assert!(expression_engine("'x'"));
        assert!(!expression_engine("[]"));
        assert!(expression_engine("[0]"));
    }

    #[test]
    fn test_sf007_comparisons() {
        assert!(!expression_engine("1 == 2"));
        assert!(expression_engine("1 != 2"));
        assert!(expression_engine("7 > 3"));
        assert!(expression_engine("3 >= 3"));
        assert!(expression_engine("2.5 < 10"));
        assert!(expression_engine("-1 <= 0"));
        assert!(expression_engine("'abc' < 'abd'"));
        assert!(expression_engine("\"yes\" == 'yes'"));
        assert!(expression_engine("1 == 1.0"));
        assert!(expression_engine("True == 1"));
    }

    #[test]
    fn test_sf007_chained_comparison() {
        assert!(expression_engine("1 < 2 < 3"));
        assert!(!expression_engine("1 < 3 < 2"));
    }

    #[test]
    fn test_sf007_membership() {
        assert!(expression_engine("'a' in ['a', 'b']"));
        assert!(expression_engine("'c' not in ('a', 'b')"));
        assert!(expression_engine("2 in {1, 2, 3}"));
        assert!(expression_engine("'ell' in 'hello'"));
        assert!(!expression_engine("'z' in 'hello'"));
    }

    #[test]
    fn test_sf007_subset() {
        assert!(expression_engine("{'a'} 属于 {'a', 'b'}"));
        assert!(expression_engine("['a', 'b'] 属于 ['b', 'a', 'c']"));
        assert!(!expression_engine("{'a', 'z'} 属于 {'a', 'b'}"));
        assert!(expression_engine("[] 属于 [1]"));
    }

    #[test]
    fn test_sf007_boolean_logic() {
        assert!(expression_engine("1 == 1 and 2 == 2"));
        assert!(!expression_engine("1 == 1 and 2 == 3"));
        assert!(expression_engine("1 == 2 or 2 == 2"));
        assert!(expression_engine("not 1 == 2"));
        assert!(expression_engine("1 == 1 && !(2 == 3)"));
        assert!(expression_engine("False || True"));
        assert!(expression_engine("(1 == 2 or 3 > 1) and 'x' in ['x']"));
    }

    #[test]
    fn test_sf007_precedence() {
        // and binds tighter than or
        assert!(expression_engine("True or False and False"));
        assert!(!expression_engine("(True or False) and False"));
        assert!(!expression_engine("not True == True"));
    }

    #[test]
    fn test_sf007_newlines_stripped() {
        assert!(expression_engine("7 >\n 3"));
    }

    #[test]
    fn test_sf007_fail_closed() {
        assert!(!expression_engine(""));
        assert!(!expression_engine("no value > 3"));
        assert!(!expression_engine("__import__('os')"));
        assert!(!expression_engine("open('x')"));
        assert!(!expression_engine("1 =="));
        assert!(!expression_engine("'unterminated"));
        assert!(!expression_engine("'a' < 1"));
        assert!(!expression_engine("-'a'"));
        assert!(!expression_engine("1 in 2"));
        assert!(!expression_engine("(1, 2"));
        assert!(!expression_engine("1 2"));
    }

    #[test]
    fn test_sf007_parse_errors_are_typed() {
        let err = parse_expression("x == 1").unwrap_err();
        assert!(matches!(err, ExprError::Syntax { pos: 0, .. }));
        let err = parse_expression("1 @ 2").unwrap_err();
        assert!(matches!(err, ExprError::Syntax { pos: 2, .. }));
        let err = parse_expression("'a' < 1").unwrap().evaluate().unwrap_err();
        assert!(matches!(err, ExprError::Type(_)));
    }

    #[test]
    fn test_sf007_and_or_yield_operands() {
        let v = parse_expression("0 or 'fallback'").unwrap().evaluate().unwrap();
        assert_eq!(v, Val::Str("fallback".to_string()));
        let v = parse_expression("[] and 5").unwrap().evaluate().unwrap();
        assert_eq!(v, Val::List(vec![]));
    }

    #[test]
    fn test_sf007_tuples_and_grouping() {
        assert_eq!(
            parse_expression("(1)").unwrap(),
            Expr::Literal(Val::Number(1.0))
        );
        assert_eq!(
            parse_expression("(1,)").unwrap().evaluate().unwrap(),
            Val::List(vec![Val::Number(1.0)])
        );
        assert_eq!(parse_expression("()").unwrap().evaluate().unwrap(), Val::List(vec![]));
    }

    #[test]
    fn test_sf007_numbers() {
        assert!(expression_engine("1e3 == 1000"));
        assert!(expression_engine(".5 == 0.5"));
        assert!(expression_engine("-(2) == -2"));
        assert!(!expression_engine("1.2.3 == 1"));
    }

    #[test]
    fn test_sf007_display() {
        let v = parse_expression("[1, 'a', None, True]").unwrap().evaluate().unwrap();
        assert_eq!(v.to_string(), "[1, 'a', None, True]");
    }

    #[test]
    fn test_sf007_deep_nesting_fails_closed() {
        let deep = [
            "(".repeat(100_000),
            format!("{}1 == 1", "(".repeat(100_000)),
            format!("{}1", "not ".repeat(100_000)),
            format!("{}1", "!".repeat(100_000)),
            format!("{}1", "- ".repeat(100_000)),
            format!("{}1", "[".repeat(100_000)),
        ];
        for source in &deep {
            assert!(!expression_engine(source));
            assert!(matches!(
                parse_expression(source),
                Err(ExprError::Syntax { .. })
            ));
        }

        let limit = MAX_DEPTH - 1;
        let ok = format!("{}1{} == 1", "(".repeat(limit), ")".repeat(limit));
        assert!(expression_engine(&ok));
        let over = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(parse_expression(&over).is_err());
    }

    #[test]
    fn test_sf007_long_flat_chains() {
        let all = format!("{}1", "1 and ".repeat(50_000));
        assert!(expression_engine(&all));
        let any = format!("{}True", "0 or ".repeat(50_000));
        assert!(expression_engine(&any));
        let chain = (0..20_000).map(|i| i.to_string()).collect::<Vec<_>>().join(" < ");
        assert!(expression_engine(&chain));
    }

    proptest! {
        #[test]
        fn prop_sf007_never_panics(s in "\\PC{0,40}") {
            let _ = expression_engine(&s);
        }

        #[test]
        fn prop_sf007_integer_ordering(a in -1000i64..1000, b in -1000i64..1000) {
            prop_assert_eq!(expression_engine(&format!("{a} < {b}")), a < b);
            prop_assert_eq!(expression_engine(&format!("{a} == {b}")), a == b);
        }
    }
}
