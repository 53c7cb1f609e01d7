use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumDiscriminants};

/// A parsed top-level (or nested) statement together with its position in the
/// sequence it was split from. Failed statements keep their syntax error so that
/// callers can report them without aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub index: usize,
    pub line: u32,
    pub result: Result<Statement, SyntaxError>,
}

impl ParsedStatement {
    pub fn statement(&self) -> Option<&Statement> {
        self.result.as_ref().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ident {
    pub value: String,
    pub quoted: bool,
}

impl Ident {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            quoted: false,
        }
    }

    /// Case-insensitive, trimmed key used for every name comparison.
    pub fn normalized(&self) -> String {
        self.value.trim().to_lowercase()
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectName {
    pub parts: Vec<Ident>,
}

impl ObjectName {
    pub fn normalized(&self) -> String {
        self.parts
            .iter()
            .map(|part| part.normalized())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn last(&self) -> Option<&Ident> {
        self.parts.last()
    }

    /// Every part but the last one, e.g. the table qualifier of a column reference.
    pub fn qualifier(&self) -> Option<ObjectName> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(ObjectName {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        })
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = self
            .parts
            .iter()
            .map(|part| part.value.as_str())
            .collect::<Vec<_>>();
        write!(f, "{}", parts.join("."))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Query(QueryStatement),
    Insert(Box<InsertStatement>),
    Update(Box<UpdateStatement>),
    Delete(Box<DeleteStatement>),
    Merge(Box<MergeStatement>),
    CreateTable(Box<CreateTableStatement>),
    CreateView(Box<CreateViewStatement>),
    CreateProcedure(Box<CreateProcedureStatement>),
    Call(CallStatement),
    Block(StatementsBlock),
    If(IfStatement),
    DeclareVar(DeclareVarStatement),
    SetVar(SetVarStatement),
    Drop(DropStatement),
    Truncate(TruncateStatement),
    Unsupported(UnsupportedStatement),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStatement {
    pub query: Query,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertStatement {
    pub with: Option<With>,
    pub overwrite: bool,
    pub table: ObjectName,
    pub partition: Vec<Ident>,
    pub columns: Option<Vec<Ident>>,
    pub source: InsertSource,
    pub on_conflict: Option<OnConflict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InsertSource {
    Query(Box<Query>),
    DefaultValues,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnConflict {
    pub target: Vec<Ident>,
    pub action: OnConflictAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OnConflictAction {
    DoNothing,
    DoUpdate {
        items: Vec<UpdateItem>,
        r#where: Option<Expr>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItem {
    pub column: ObjectName,
    pub expr: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub with: Option<With>,
    pub table: ObjectName,
    pub alias: Option<Ident>,
    pub items: Vec<UpdateItem>,
    pub from: Option<FromExpr>,
    pub r#where: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub table: ObjectName,
    pub alias: Option<Ident>,
    pub using: Option<FromExpr>,
    pub r#where: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeStatement {
    pub with: Option<With>,
    pub target: ObjectName,
    pub target_alias: Option<Ident>,
    pub source: MergeSource,
    pub source_alias: Option<Ident>,
    pub condition: Expr,
    pub whens: Vec<When>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MergeSource {
    Table(ObjectName),
    Subquery(Box<Query>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhenKind {
    Matched,
    NotMatchedByTarget,
    NotMatchedBySource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct When {
    pub kind: WhenKind,
    pub condition: Option<Expr>,
    pub action: MergeAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MergeAction {
    Update(Vec<UpdateItem>),
    Insert {
        columns: Option<Vec<Ident>>,
        values: Vec<Expr>,
    },
    InsertRow,
    Delete,
    DoNothing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: Ident,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableStatement {
    pub replace: bool,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub name: ObjectName,
    pub columns: Vec<ColumnDef>,
    pub query: Option<Box<Query>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateViewStatement {
    pub replace: bool,
    pub materialized: bool,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub name: ObjectName,
    pub columns: Vec<Ident>,
    pub query: Box<Query>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureParameter {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProcedureStatement {
    pub replace: bool,
    pub name: ObjectName,
    pub parameters: Vec<ProcedureParameter>,
    /// Variables declared in a `DECLARE` section preceding the body block.
    pub declarations: Vec<String>,
    pub body: Vec<ParsedStatement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStatement {
    pub procedure: ObjectName,
    pub arguments: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementsBlock {
    pub statements: Vec<ParsedStatement>,
    pub exception_statements: Vec<ParsedStatement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfBranch {
    pub condition: Expr,
    pub statements: Vec<ParsedStatement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfStatement {
    pub branches: Vec<IfBranch>,
    pub r#else: Vec<ParsedStatement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclareVarStatement {
    pub names: Vec<String>,
    pub data_type: Option<String>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetVarStatement {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropStatement {
    pub object_kind: String,
    pub if_exists: bool,
    pub names: Vec<ObjectName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateStatement {
    pub table: ObjectName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsupportedStatement {
    pub keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub with: Option<With>,
    pub body: SetExpr,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct With {
    pub recursive: bool,
    pub ctes: Vec<Cte>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cte {
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub query: Box<Query>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SetOperator {
    #[strum(to_string = "UNION")]
    Union,
    #[strum(to_string = "INTERSECT")]
    Intersect,
    #[strum(to_string = "EXCEPT")]
    Except,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SetExpr {
    Select(Box<Select>),
    Query(Box<Query>),
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Box<SetExpr>,
        right: Box<SetExpr>,
    },
    Values(Vec<Vec<Expr>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub top: Option<Expr>,
    pub projection: Vec<SelectItem>,
    pub into: Option<SelectInto>,
    pub from: Option<FromExpr>,
    pub r#where: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub qualify: Option<Expr>,
    pub window: Vec<NamedWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectInto {
    pub temporary: bool,
    pub targets: Vec<ObjectName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SelectItem {
    Expr {
        expr: Expr,
        alias: Option<Ident>,
    },
    Wildcard {
        except: Vec<Ident>,
    },
    QualifiedWildcard {
        qualifier: ObjectName,
        except: Vec<Ident>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedWindow {
    pub name: Ident,
    pub spec: WindowSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableAlias {
    pub name: Ident,
    pub columns: Vec<Ident>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FromExpr {
    Table(TableFactor),
    Derived(DerivedTable),
    Function(TableFunction),
    Join(JoinExpr),
    Grouping(Box<FromExpr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFactor {
    pub name: ObjectName,
    pub alias: Option<TableAlias>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedTable {
    pub lateral: bool,
    pub query: Box<Query>,
    pub alias: Option<TableAlias>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFunction {
    pub name: ObjectName,
    pub args: Vec<FunctionArg>,
    pub alias: Option<TableAlias>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<Ident>),
    Natural,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinExpr {
    pub kind: JoinKind,
    pub left: Box<FromExpr>,
    pub right: Box<FromExpr>,
    pub constraint: JoinConstraint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub direction: Option<SortDirection>,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    pub name: Option<Ident>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
    /// Frame clause kept as normalized text, e.g. `ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW`.
    pub frame: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum BinaryOperator {
    #[strum(to_string = "OR")]
    Or,
    #[strum(to_string = "AND")]
    And,
    #[strum(to_string = "=")]
    Equal,
    #[strum(to_string = "<>")]
    NotEqual,
    #[strum(to_string = "<")]
    Less,
    #[strum(to_string = "<=")]
    LessEqual,
    #[strum(to_string = ">")]
    Greater,
    #[strum(to_string = ">=")]
    GreaterEqual,
    #[strum(to_string = "+")]
    Plus,
    #[strum(to_string = "-")]
    Minus,
    #[strum(to_string = "*")]
    Multiply,
    #[strum(to_string = "/")]
    Divide,
    #[strum(to_string = "%")]
    Modulo,
    #[strum(to_string = "||")]
    Concat,
    #[strum(to_string = "|")]
    BitwiseOr,
    #[strum(to_string = "&")]
    BitwiseAnd,
    #[strum(to_string = "^")]
    BitwiseXor,
    #[strum(to_string = "->")]
    Arrow,
    #[strum(to_string = "->>")]
    LongArrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum UnaryOperator {
    #[strum(to_string = "NOT")]
    Not,
    #[strum(to_string = "-")]
    Minus,
    #[strum(to_string = "+")]
    Plus,
    #[strum(to_string = "~")]
    BitwiseNot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub operator: BinaryOperator,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub operator: UnaryOperator,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IsCheck {
    Null,
    True,
    False,
    DistinctFrom(Box<Expr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseExpr {
    pub operand: Option<Box<Expr>>,
    pub when_thens: Vec<(Expr, Expr)>,
    pub r#else: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum CastKind {
    #[strum(to_string = "CAST")]
    Cast,
    #[strum(to_string = "TRY_CAST")]
    TryCast,
    #[strum(to_string = "SAFE_CAST")]
    SafeCast,
    /// Postfix `expr::type`, rendered as `CAST`.
    #[strum(to_string = "CAST")]
    DoubleColon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastExpr {
    pub kind: CastKind,
    pub expr: Box<Expr>,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionArg {
    /// Keyword introducing the argument, e.g. `FROM` in `SUBSTRING(x FROM 2)` or `BOTH` in `TRIM`.
    pub keyword: Option<String>,
    pub expr: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub name: ObjectName,
    pub distinct: bool,
    pub args: Vec<FunctionArg>,
    pub order_by: Vec<OrderByExpr>,
    pub within_group: Vec<OrderByExpr>,
    pub filter: Option<Box<Expr>>,
    pub null_treatment: Option<String>,
    pub over: Option<WindowSpec>,
    /// False for niladic calls written without parentheses (`CURRENT_DATE`).
    pub parens: bool,
}

impl FunctionExpr {
    pub fn lower_name(&self) -> String {
        self.name
            .last()
            .map(|ident| ident.normalized())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Column(ObjectName),
    Variable(String),
    String(String),
    Number(String),
    Bool(bool),
    Null,
    Star,
    TypedString {
        data_type: String,
        value: String,
    },
    Interval {
        value: Box<Expr>,
        unit: Option<String>,
    },
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Grouping(Box<Expr>),
    Tuple(Vec<Expr>),
    Is {
        expr: Box<Expr>,
        negated: bool,
        check: IsCheck,
    },
    InList {
        expr: Box<Expr>,
        negated: bool,
        list: Vec<Expr>,
    },
    InSubquery {
        expr: Box<Expr>,
        negated: bool,
        query: Box<Query>,
    },
    Between {
        expr: Box<Expr>,
        negated: bool,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        negated: bool,
        case_insensitive: bool,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
    },
    Exists {
        negated: bool,
        query: Box<Query>,
    },
    Subquery(Box<Query>),
    Case(CaseExpr),
    Cast(CastExpr),
    Extract {
        field: String,
        expr: Box<Expr>,
    },
    Function(FunctionExpr),
}

#[derive(PartialEq, Clone, Debug, EnumDiscriminants, Serialize, Deserialize)]
#[strum_discriminants(name(TokenTypeVariant))]
pub enum TokenType {
    LeftParen,
    RightParen,
    LeftSquare,
    RightSquare,
    Comma,
    Dot,
    Minus,
    Plus,
    Slash,
    Star,
    Percent,
    Colon,
    DoubleColon,
    ColonEqual,
    Semicolon,
    ConcatOperator,
    Arrow,
    LongArrow,
    BitwiseNot,
    BitwiseOr,
    BitwiseAnd,
    BitwiseXor,
    Bang,
    BangEqual,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    QuotedIdentifier(String),
    Identifier(String),
    String(String),
    Number(String),
    DollarQuoted(String),
    Variable(String),
    /// Lexically invalid input; the message is reported when a statement reaches it.
    Invalid(String),
    Eof,

    // Reserved Keywords
    All,
    And,
    As,
    Asc,
    Between,
    By,
    Case,
    Cast,
    Create,
    Cross,
    Desc,
    Distinct,
    Else,
    End,
    Except,
    Exists,
    Extract,
    False,
    From,
    Full,
    Group,
    Having,
    Ilike,
    In,
    Inner,
    Intersect,
    Into,
    Is,
    Join,
    Lateral,
    Left,
    Like,
    Limit,
    Merge,
    Natural,
    Not,
    Null,
    Nulls,
    On,
    Or,
    Order,
    Outer,
    Over,
    Partition,
    Qualify,
    Recursive,
    Right,
    Select,
    Set,
    Then,
    True,
    Union,
    Using,
    When,
    Where,
    Window,
    With,
    Within,
}

impl TokenTypeVariant {
    /// Source text of punctuation, upper-case name of keywords and literal classes.
    pub(crate) fn variant_str(&self) -> Cow<'static, str> {
        match self {
            TokenTypeVariant::LeftParen => Cow::Borrowed("("),
            TokenTypeVariant::RightParen => Cow::Borrowed(")"),
            TokenTypeVariant::LeftSquare => Cow::Borrowed("["),
            TokenTypeVariant::RightSquare => Cow::Borrowed("]"),
            TokenTypeVariant::Comma => Cow::Borrowed(","),
            TokenTypeVariant::Dot => Cow::Borrowed("."),
            TokenTypeVariant::Minus => Cow::Borrowed("-"),
            TokenTypeVariant::Plus => Cow::Borrowed("+"),
            TokenTypeVariant::Slash => Cow::Borrowed("/"),
            TokenTypeVariant::Star => Cow::Borrowed("*"),
            TokenTypeVariant::Percent => Cow::Borrowed("%"),
            TokenTypeVariant::Colon => Cow::Borrowed(":"),
            TokenTypeVariant::DoubleColon => Cow::Borrowed("::"),
            TokenTypeVariant::ColonEqual => Cow::Borrowed(":="),
            TokenTypeVariant::Semicolon => Cow::Borrowed(";"),
            TokenTypeVariant::ConcatOperator => Cow::Borrowed("||"),
            TokenTypeVariant::Arrow => Cow::Borrowed("->"),
            TokenTypeVariant::LongArrow => Cow::Borrowed("->>"),
            TokenTypeVariant::BitwiseNot => Cow::Borrowed("~"),
            TokenTypeVariant::BitwiseOr => Cow::Borrowed("|"),
            TokenTypeVariant::BitwiseAnd => Cow::Borrowed("&"),
            TokenTypeVariant::BitwiseXor => Cow::Borrowed("^"),
            TokenTypeVariant::Bang => Cow::Borrowed("!"),
            TokenTypeVariant::BangEqual => Cow::Borrowed("!="),
            TokenTypeVariant::Equal => Cow::Borrowed("="),
            TokenTypeVariant::NotEqual => Cow::Borrowed("<>"),
            TokenTypeVariant::Greater => Cow::Borrowed(">"),
            TokenTypeVariant::GreaterEqual => Cow::Borrowed(">="),
            TokenTypeVariant::Less => Cow::Borrowed("<"),
            TokenTypeVariant::LessEqual => Cow::Borrowed("<="),
            TokenTypeVariant::Eof => Cow::Borrowed("EOF"),
            _ => Cow::Owned(format!("{:?}", self).to_uppercase()),
        }
    }
}

impl TokenType {
    /// Reserved keywords, which can never be used as bare identifiers.
    pub(crate) fn is_keyword(&self) -> bool {
        !matches!(
            self,
            TokenType::LeftParen
                | TokenType::RightParen
                | TokenType::LeftSquare
                | TokenType::RightSquare
                | TokenType::Comma
                | TokenType::Dot
                | TokenType::Minus
                | TokenType::Plus
                | TokenType::Slash
                | TokenType::Star
                | TokenType::Percent
                | TokenType::Colon
                | TokenType::DoubleColon
                | TokenType::ColonEqual
                | TokenType::Semicolon
                | TokenType::ConcatOperator
                | TokenType::Arrow
                | TokenType::LongArrow
                | TokenType::BitwiseNot
                | TokenType::BitwiseOr
                | TokenType::BitwiseAnd
                | TokenType::BitwiseXor
                | TokenType::Bang
                | TokenType::BangEqual
                | TokenType::Equal
                | TokenType::NotEqual
                | TokenType::Greater
                | TokenType::GreaterEqual
                | TokenType::Less
                | TokenType::LessEqual
                | TokenType::QuotedIdentifier(_)
                | TokenType::Identifier(_)
                | TokenType::String(_)
                | TokenType::Number(_)
                | TokenType::DollarQuoted(_)
                | TokenType::Variable(_)
                | TokenType::Invalid(_)
                | TokenType::Eof
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenType,
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
}

impl Token {
    /// Lower-cased text of an unquoted identifier or keyword, used for non-reserved
    /// keyword checks.
    pub(crate) fn word(&self) -> Option<String> {
        match &self.kind {
            TokenType::Identifier(ident) => Some(ident.to_lowercase()),
            kind if kind.is_keyword() => Some(self.lexeme.to_lowercase()),
            _ => None,
        }
    }
}
