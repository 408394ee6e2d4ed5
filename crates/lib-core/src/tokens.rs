use std::fmt::Display;
use std::ops::Range;

use smol_str::SmolStr;

/// A half-open byte range into the original source, plus the 1-based line and
/// column of its start.
///
/// Locations are cheap to copy; the source string they index into must
/// outlive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// A zero-width location, used for synthesized tokens and nodes.
    pub fn point(at: usize, line: usize, column: usize) -> Self {
        Self::new(at, at, line, column)
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The smallest location enclosing both `self` and `other`.
    pub fn spanning(&self, other: Location) -> Location {
        let (line, column) = if other.start < self.start {
            (other.line, other.column)
        } else {
            (self.line, self.column)
        };
        Location {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            column,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new(0, 0, 1, 1)
    }
}

/// SQL keywords, matched case-insensitively.
///
/// The set covers the SQLite grammar implemented by the parser plus the
/// `DEFINE QUERY` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Keyword {
    Abort,
    Action,
    Add,
    After,
    All,
    Alter,
    Always,
    And,
    As,
    Asc,
    Autoincrement,
    Before,
    Begin,
    Between,
    By,
    Cascade,
    Case,
    Cast,
    Check,
    Collate,
    Column,
    Conflict,
    Constraint,
    Create,
    Cross,
    CurrentDate,
    CurrentTime,
    CurrentTimestamp,
    Default,
    Deferrable,
    Deferred,
    Define,
    Delete,
    Desc,
    Distinct,
    Do,
    Drop,
    Each,
    Else,
    End,
    Escape,
    Except,
    Exists,
    Fail,
    False,
    Filter,
    First,
    For,
    Foreign,
    From,
    Full,
    Generated,
    Glob,
    Group,
    Having,
    If,
    Ignore,
    Immediate,
    In,
    Index,
    Indexed,
    Initially,
    Inner,
    Insert,
    Instead,
    Intersect,
    Into,
    Is,
    Isnull,
    Join,
    Key,
    Last,
    Left,
    Like,
    Limit,
    Match,
    Materialized,
    Natural,
    No,
    Not,
    Nothing,
    Notnull,
    Null,
    Nulls,
    Of,
    Offset,
    On,
    Or,
    Order,
    Outer,
    Over,
    Partition,
    Pragma,
    Primary,
    Query,
    Raise,
    Recursive,
    References,
    Regexp,
    Reindex,
    Rename,
    Replace,
    Restrict,
    Returning,
    Right,
    Rollback,
    Row,
    Rows,
    Select,
    Set,
    Stored,
    Strict,
    Table,
    Temp,
    Temporary,
    Then,
    To,
    Trigger,
    True,
    Union,
    Unique,
    Update,
    Using,
    Values,
    View,
    Virtual,
    When,
    Where,
    Window,
    With,
    Without,
}

/// The spelled form of a bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `?`
    Anonymous,
    /// `?N`
    Numbered(i64),
    /// `:name`
    Colon(SmolStr),
    /// `@name`
    At(SmolStr),
    /// `$name`, optionally `$ns::name(suffix)`
    Tcl(SmolStr),
}

impl Placeholder {
    /// The textual name shared between repeated uses, if this form has one.
    pub fn name(&self) -> Option<&SmolStr> {
        match self {
            Placeholder::Anonymous | Placeholder::Numbered(_) => None,
            Placeholder::Colon(name) | Placeholder::At(name) | Placeholder::Tcl(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(SmolStr),
    Int(i64),
    HexInt(i64),
    Double(f64),
    String(SmolStr),
    Blob(SmolStr),
    Placeholder(Placeholder),

    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Ampersand,
    Pipe,
    PipePipe,
    LessThan,
    LessEquals,
    LessLess,
    GreaterThan,
    GreaterEquals,
    GreaterGreater,
    Equals,
    EqualsEquals,
    BangEquals,
    LessGreater,
    Tilde,
    Arrow,
    LongArrow,

    Eof,
}

impl TokenKind {
    /// Whether two kinds match for the purposes of `consume`/`take_if`.
    ///
    /// Payload-carrying kinds match on the variant alone, except keywords,
    /// which must be the same keyword.
    pub fn matches(&self, other: &TokenKind) -> bool {
        match (self, other) {
            (TokenKind::Keyword(a), TokenKind::Keyword(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Keyword(kw) => write!(f, "{}", kw.as_ref()),
            TokenKind::Identifier(name) => write!(f, "identifier '{name}'"),
            TokenKind::Int(value) => write!(f, "{value}"),
            TokenKind::HexInt(value) => write!(f, "0x{value:x}"),
            TokenKind::Double(value) => write!(f, "{value}"),
            TokenKind::String(_) => write!(f, "string literal"),
            TokenKind::Blob(_) => write!(f, "blob literal"),
            TokenKind::Placeholder(_) => write!(f, "bind parameter"),
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::Ampersand => write!(f, "'&'"),
            TokenKind::Pipe => write!(f, "'|'"),
            TokenKind::PipePipe => write!(f, "'||'"),
            TokenKind::LessThan => write!(f, "'<'"),
            TokenKind::LessEquals => write!(f, "'<='"),
            TokenKind::LessLess => write!(f, "'<<'"),
            TokenKind::GreaterThan => write!(f, "'>'"),
            TokenKind::GreaterEquals => write!(f, "'>='"),
            TokenKind::GreaterGreater => write!(f, "'>>'"),
            TokenKind::Equals => write!(f, "'='"),
            TokenKind::EqualsEquals => write!(f, "'=='"),
            TokenKind::BangEquals => write!(f, "'!='"),
            TokenKind::LessGreater => write!(f, "'<>'"),
            TokenKind::Tilde => write!(f, "'~'"),
            TokenKind::Arrow => write!(f, "'->'"),
            TokenKind::LongArrow => write!(f, "'->>'"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.kind, TokenKind::Keyword(kw) if *kw == keyword)
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_keyword_lookup_is_case_insensitive() {
        assert_eq!(Keyword::from_str("select"), Ok(Keyword::Select));
        assert_eq!(Keyword::from_str("SELECT"), Ok(Keyword::Select));
        assert_eq!(Keyword::from_str("SeLeCt"), Ok(Keyword::Select));
        assert_eq!(Keyword::from_str("current_date"), Ok(Keyword::CurrentDate));
        assert!(Keyword::from_str("selec").is_err());
    }

    #[test]
    fn test_location_spanning() {
        let a = Location::new(4, 10, 1, 5);
        let b = Location::new(12, 20, 2, 3);
        assert_eq!(a.spanning(b), Location::new(4, 20, 1, 5));
        assert_eq!(b.spanning(a), Location::new(4, 20, 1, 5));
    }

    #[test]
    fn test_token_kind_matching() {
        let a = TokenKind::Identifier("foo".into());
        let b = TokenKind::Identifier("bar".into());
        assert!(a.matches(&b));
        assert!(!TokenKind::Keyword(Keyword::Select).matches(&TokenKind::Keyword(Keyword::From)));
        assert!(TokenKind::Keyword(Keyword::Select).matches(&TokenKind::Keyword(Keyword::Select)));
        assert!(!a.matches(&TokenKind::Eof));
    }
}
