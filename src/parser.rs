use std::ops::Range;

use anyhow::anyhow;
use strum::IntoDiscriminant;

use crate::ast::{
    BinaryExpr, BinaryOperator, CallStatement, CaseExpr, CastExpr, CastKind, ColumnDef,
    CreateProcedureStatement, CreateTableStatement, CreateViewStatement, Cte, DeclareVarStatement,
    DeleteStatement, DerivedTable, DropStatement, Expr, FromExpr, FunctionArg, FunctionExpr, Ident,
    IfBranch, IfStatement, InsertSource, InsertStatement, IsCheck, JoinConstraint, JoinExpr,
    JoinKind, MergeAction, MergeSource, MergeStatement, NamedWindow, NullsOrder, ObjectName,
    OnConflict, OnConflictAction, OrderByExpr, ParsedStatement, ProcedureParameter, Query,
    QueryStatement, Select, SelectInto, SelectItem, SetExpr, SetOperator, SetVarStatement,
    SortDirection, Statement, StatementsBlock, SyntaxError, TableAlias, TableFactor,
    TableFunction, Token, TokenType, TokenTypeVariant, TruncateStatement, UnaryExpr,
    UnaryOperator, UnsupportedStatement, UpdateItem, UpdateStatement, When, WhenKind, WindowSpec,
    With,
};
use crate::dialect::Dialect;
use crate::scanner::Scanner;
use crate::splitter::{find_top_level, is_statement_start, is_word, split_statements};

/// Words that end an expression or a table reference instead of being read as an
/// implicit alias.
const NON_ALIAS_KEYWORDS: &[&str] = &[
    "apply",
    "at",
    "begin",
    "call",
    "collate",
    "declare",
    "default",
    "delete",
    "do",
    "drop",
    "escape",
    "exclude",
    "exec",
    "execute",
    "fetch",
    "for",
    "glob",
    "if",
    "insert",
    "language",
    "loop",
    "minus",
    "offset",
    "only",
    "option",
    "output",
    "overriding",
    "overwrite",
    "print",
    "raise",
    "regexp",
    "return",
    "returning",
    "returns",
    "rlike",
    "rows",
    "similar",
    "tablesample",
    "top",
    "truncate",
    "update",
    "values",
    "while",
];

/// Deepest nesting of expressions and subqueries accepted within one statement.
const MAX_NESTING_DEPTH: usize = 20;

/// Statement keywords skipped without structural parsing.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "alter",
    "analyze",
    "close",
    "cluster",
    "comment",
    "commit",
    "continue",
    "copy",
    "deallocate",
    "describe",
    "exit",
    "explain",
    "fetch",
    "get",
    "go",
    "grant",
    "listen",
    "lock",
    "notify",
    "open",
    "perform",
    "prepare",
    "print",
    "raise",
    "raiserror",
    "refresh",
    "reindex",
    "release",
    "return",
    "revoke",
    "rollback",
    "savepoint",
    "show",
    "start",
    "throw",
    "use",
    "vacuum",
    "waitfor",
];

const NILADIC_FUNCTIONS: &[&str] = &[
    "current_date",
    "current_time",
    "current_timestamp",
    "current_user",
    "localtime",
    "localtimestamp",
    "session_user",
    "sysdate",
    "systimestamp",
];

const TYPED_LITERALS: &[&str] = &["date", "time", "timestamp", "datetime", "timestamptz"];

const INTERVAL_UNITS: &[&str] = &[
    "year", "years", "quarter", "month", "months", "week", "weeks", "day", "days", "hour",
    "hours", "minute", "minutes", "second", "seconds", "millisecond", "microsecond",
];

pub struct Parser<'a> {
    source_tokens: &'a [Token],
    eof: Token,
    curr: usize,
    dialect: Dialect,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], dialect: Dialect) -> Parser<'a> {
        let eof = match tokens.last() {
            Some(last) => Token {
                kind: TokenType::Eof,
                lexeme: String::from("eof"),
                line: last.line,
                col: last.col + last.lexeme.chars().count() as u32,
            },
            None => Token {
                kind: TokenType::Eof,
                lexeme: String::from("eof"),
                line: 1,
                col: 1,
            },
        };
        Self {
            source_tokens: tokens,
            eof,
            curr: 0,
            dialect,
            depth: 0,
        }
    }

    /// Parses exactly one statement spanning the whole token slice.
    pub fn parse(&mut self) -> anyhow::Result<Statement> {
        let statement = self.parse_statement()?;
        self.consume(TokenTypeVariant::Eof)?;
        Ok(statement)
    }

    fn peek_prev(&self) -> &Token {
        self.curr
            .checked_sub(1)
            .and_then(|idx| self.source_tokens.get(idx))
            .unwrap_or(&self.eof)
    }

    fn peek(&self) -> &Token {
        self.source_tokens.get(self.curr).unwrap_or(&self.eof)
    }

    fn peek_next_i(&self, i: usize) -> &Token {
        self.source_tokens.get(self.curr + i).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            // Do not advance if we peek Eof
            self.curr += 1;
        }
        self.peek_prev()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenType::Eof
    }

    /// Tokens not consumed yet.
    fn remaining(&self) -> &'a [Token] {
        let source_tokens: &'a [Token] = self.source_tokens;
        &source_tokens[self.curr.min(source_tokens.len())..]
    }

    fn skip_to_end(&mut self) {
        self.curr = self.source_tokens.len();
    }

    fn check_token_type(&self, token_type: TokenTypeVariant) -> bool {
        self.peek().kind.discriminant() == token_type
    }

    fn check_next_token_type(&self, i: usize, token_type: TokenTypeVariant) -> bool {
        self.peek_next_i(i).kind.discriminant() == token_type
    }

    fn match_token_type(&mut self, token_type: TokenTypeVariant) -> bool {
        if self.check_token_type(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_token_types(&mut self, token_types: &[TokenTypeVariant]) -> bool {
        for tok in token_types {
            if self.check_token_type(*tok) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check_non_reserved_keyword(&self, value: &str) -> bool {
        self.check_next_non_reserved_keyword(0, value)
    }

    fn check_next_non_reserved_keyword(&self, i: usize, value: &str) -> bool {
        match &self.peek_next_i(i).kind {
            TokenType::Identifier(ident) => ident.to_lowercase() == value,
            _ => false,
        }
    }

    fn check_identifier(&self) -> bool {
        self.check_token_type(TokenTypeVariant::Identifier)
            || self.check_token_type(TokenTypeVariant::QuotedIdentifier)
    }

    fn match_non_reserved_keyword(&mut self, value: &str) -> bool {
        if self.check_non_reserved_keyword(value) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_non_reserved_keyword(&mut self, value: &str) -> anyhow::Result<&Token> {
        if self.check_non_reserved_keyword(value) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", value.to_uppercase());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn consume_one_of_non_reserved_keywords(&mut self, values: &[&str]) -> anyhow::Result<&Token> {
        for value in values {
            if self.check_non_reserved_keyword(value) {
                return Ok(self.advance());
            }
        }
        let err_msg = values
            .iter()
            .map(|el| format!("`{}`", el.to_uppercase()))
            .collect::<Vec<String>>()
            .join(" or ");
        Err(anyhow!(self.error(
            self.peek(),
            &format!("Expected one of: {}.", err_msg)
        )))
    }

    fn consume(&mut self, token_type: TokenTypeVariant) -> anyhow::Result<&Token> {
        if self.check_token_type(token_type) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", token_type.variant_str());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn consume_one_of(&mut self, token_types: &[TokenTypeVariant]) -> anyhow::Result<&Token> {
        for token_type in token_types {
            if self.check_token_type(*token_type) {
                return Ok(self.advance());
            }
        }
        let err_msg = token_types
            .iter()
            .map(|el| format!("`{}`", el.variant_str()))
            .collect::<Vec<String>>()
            .join(" or ");
        Err(anyhow!(self.error(
            self.peek(),
            &format!("Expected one of: {}.", err_msg)
        )))
    }

    /// Runs `rule` one nesting level deeper, failing the statement once expressions or
    /// subqueries nest past [`MAX_NESTING_DEPTH`].
    fn nested<T>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(anyhow!(self.error(self.peek(), "Maximum nesting depth exceeded.")));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    fn error(&self, token: &Token, message: &str) -> String {
        format!(
            "[line {}, col {}] Error {}: {}",
            token.line,
            token.col,
            &format!("at '{}'", token.lexeme),
            message
        )
    }

    fn check_query_start(&self, i: usize) -> bool {
        let token = self.peek_next_i(i);
        matches!(token.kind, TokenType::Select | TokenType::With)
            || is_word(token, "values")
            || (token.kind == TokenType::LeftParen && self.check_query_start(i + 1))
    }

    fn token_ident(token: &Token) -> Option<Ident> {
        match &token.kind {
            TokenType::Identifier(value) | TokenType::Variable(value) => Some(Ident {
                value: value.clone(),
                quoted: false,
            }),
            TokenType::QuotedIdentifier(value) | TokenType::String(value) => Some(Ident {
                value: value.clone(),
                quoted: true,
            }),
            kind if kind.is_keyword() => Some(Ident {
                value: token.lexeme.clone(),
                quoted: false,
            }),
            _ => None,
        }
    }

    /// A backtick-quoted `project.dataset.table` is one token but several name parts.
    fn name_parts(token: &Token, ident: Ident) -> Vec<Ident> {
        if token.lexeme.starts_with('`') && ident.value.contains('.') {
            ident
                .value
                .split('.')
                .map(|part| Ident {
                    value: part.to_owned(),
                    quoted: true,
                })
                .collect()
        } else {
            vec![ident]
        }
    }

    // identifier -> "Identifier" | "QuotedIdentifier"
    fn parse_ident(&mut self) -> anyhow::Result<Ident> {
        let token = self
            .consume_one_of(&[
                TokenTypeVariant::Identifier,
                TokenTypeVariant::QuotedIdentifier,
            ])?
            .clone();
        Self::token_ident(&token).ok_or_else(|| anyhow!(self.error(&token, "Expected identifier.")))
    }

    // word -> identifier | keyword
    fn parse_word_ident(&mut self) -> anyhow::Result<Ident> {
        let token = self.peek().clone();
        match &token.kind {
            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) => {}
            kind if kind.is_keyword() => {}
            _ => return Err(anyhow!(self.error(&token, "Expected identifier."))),
        }
        self.advance();
        Self::token_ident(&token).ok_or_else(|| anyhow!(self.error(&token, "Expected identifier.")))
    }

    // variable_name -> "Variable" | identifier
    fn parse_variable_name(&mut self) -> anyhow::Result<String> {
        let token = self.peek().clone();
        match &token.kind {
            TokenType::Variable(name) => {
                self.advance();
                Ok(name.to_lowercase())
            }
            _ => Ok(self.parse_ident()?.normalized()),
        }
    }

    // object_name -> ("Identifier" | "QuotedIdentifier" | "Variable") ("." word)*
    fn parse_object_name(&mut self) -> anyhow::Result<ObjectName> {
        let first = self.peek().clone();
        let mut parts = match &first.kind {
            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) | TokenType::Variable(_) => {
                self.advance();
                match Self::token_ident(&first) {
                    Some(ident) => Self::name_parts(&first, ident),
                    None => vec![],
                }
            }
            _ => return Err(anyhow!(self.error(&first, "Expected object name."))),
        };

        while self.check_token_type(TokenTypeVariant::Dot)
            && !self.check_next_token_type(1, TokenTypeVariant::Star)
        {
            self.advance();
            let token = self.peek().clone();
            let ident = self.parse_word_ident()?;
            parts.extend(Self::name_parts(&token, ident));
        }

        Ok(ObjectName { parts })
    }

    fn parse_ident_list(&mut self) -> anyhow::Result<Vec<Ident>> {
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut idents = vec![];
        loop {
            idents.push(self.parse_word_ident()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(idents)
    }

    /// Skips a balanced parenthesized group starting at the current `(`.
    fn skip_parens(&mut self) -> anyhow::Result<()> {
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut depth = 1;
        while depth > 0 {
            if self.is_at_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
            }
            match self.advance().kind {
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// Collects the text of a balanced parenthesized group (without the outer parens).
    fn paren_text(&mut self) -> anyhow::Result<String> {
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut depth = 1;
        let mut text = String::new();
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
            }
            let token = self.advance().clone();
            match token.kind {
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            text.push_str(&token.lexeme.to_uppercase());
        }
        Ok(text)
    }

    // statement ->
    // query_statement | insert_statement | update_statement | delete_statement
    // | merge_statement | create_statement | call_statement | statements_block
    // | if_statement | loop_statement | declare_var_statement | set_var_statement
    // | drop_statement | truncate_statement | unsupported_statement
    fn parse_statement(&mut self) -> anyhow::Result<Statement> {
        let peek = self.peek().clone();

        let statement = match &peek.kind {
            TokenType::Select | TokenType::LeftParen => self.parse_query_statement(None)?,
            TokenType::With => self.parse_with_statement()?,
            TokenType::Create => self.parse_create_statement()?,
            TokenType::Merge => self.parse_merge_statement(None)?,
            TokenType::Set => self.parse_set_var_statement()?,
            TokenType::Null => self.parse_unsupported_statement(),
            TokenType::Identifier(non_reserved_keyword) => {
                let keyword = non_reserved_keyword.to_lowercase();
                match keyword.as_str() {
                    "insert" => self.parse_insert_statement(None)?,
                    "delete" => self.parse_delete_statement()?,
                    "update" => self.parse_update_statement(None)?,
                    "truncate" => self.parse_truncate_statement()?,
                    "declare" => self.parse_declare_var_statement()?,
                    "drop" => self.parse_drop_statement()?,
                    "call" | "exec" | "execute" => self.parse_call_statement()?,
                    "values" => self.parse_query_statement(None)?,
                    "if" => self.parse_if_statement()?,
                    "while" | "for" | "loop" => self.parse_loop_statement()?,
                    "begin" => {
                        if self.check_next_token_type(1, TokenTypeVariant::Eof)
                            || ["transaction", "tran", "work", "isolation"]
                                .iter()
                                .any(|word| self.check_next_non_reserved_keyword(1, word))
                        {
                            self.parse_unsupported_statement()
                        } else {
                            self.parse_statements_block()?
                        }
                    }
                    _ if UNSUPPORTED_KEYWORDS.contains(&keyword.as_str())
                        || self.check_next_token_type(1, TokenTypeVariant::ColonEqual) =>
                    {
                        self.parse_unsupported_statement()
                    }
                    _ => {
                        return Err(anyhow!(self.error(
                            &peek,
                            &format!(
                                "Unexpected non reserved keyword: `{}`.",
                                non_reserved_keyword
                            ),
                        )));
                    }
                }
            }
            TokenType::Variable(_)
                if self.check_next_token_type(1, TokenTypeVariant::ColonEqual) =>
            {
                self.parse_unsupported_statement()
            }
            _ => {
                return Err(anyhow!(self.error(&peek, "Expected statement.")));
            }
        };
        Ok(statement)
    }

    // unsupported_statement -> keyword any*
    fn parse_unsupported_statement(&mut self) -> Statement {
        let keyword = self.peek().lexeme.to_uppercase();
        log::debug!(
            "Skipping unsupported statement `{}` at line {}.",
            keyword,
            self.peek().line
        );
        self.skip_to_end();
        Statement::Unsupported(UnsupportedStatement { keyword })
    }

    // with_statement -> with (query_expr | insert_statement | update_statement | merge_statement)
    fn parse_with_statement(&mut self) -> anyhow::Result<Statement> {
        let with = self.parse_with()?;
        let peek = self.peek().clone();
        match &peek.kind {
            TokenType::Merge => self.parse_merge_statement(Some(with)),
            TokenType::Identifier(ident) if ident.to_lowercase() == "insert" => {
                self.parse_insert_statement(Some(with))
            }
            TokenType::Identifier(ident) if ident.to_lowercase() == "update" => {
                self.parse_update_statement(Some(with))
            }
            _ => self.parse_query_statement(Some(with)),
        }
    }

    // query_statement -> query_expr
    fn parse_query_statement(&mut self, with: Option<With>) -> anyhow::Result<Statement> {
        let mut query = self.parse_query_expr()?;
        if with.is_some() {
            query.with = with;
        }
        self.skip_query_trailer();
        Ok(Statement::Query(QueryStatement { query }))
    }

    /// `FOR UPDATE`, T-SQL `OPTION (...)` and similar locking/hint suffixes.
    fn skip_query_trailer(&mut self) {
        if self.check_non_reserved_keyword("for") || self.check_non_reserved_keyword("option") {
            self.skip_to_end();
        }
    }

    // statements_block -> "BEGIN" ["TRY" | "ATOMIC"] statement* ["EXCEPTION" handler*] "END" [label]
    // ["BEGIN" "CATCH" statement* "END" ["CATCH"]]
    fn parse_statements_block(&mut self) -> anyhow::Result<Statement> {
        let mut statements = vec![];
        let mut exception_statements = vec![];
        loop {
            self.consume_non_reserved_keyword("begin")?;
            let is_catch = self.match_non_reserved_keyword("catch");
            if !is_catch {
                self.match_non_reserved_keyword("try");
                self.match_non_reserved_keyword("atomic");
            }

            let (body, handlers) = self.parse_block_body()?;
            if is_catch {
                exception_statements.extend(body);
            } else {
                statements.extend(body);
            }
            exception_statements.extend(handlers);

            // END TRY / END CATCH / END label
            if self.check_identifier() && !self.check_non_reserved_keyword("begin") {
                self.advance();
            }
            if !self.check_non_reserved_keyword("begin") {
                break;
            }
        }

        Ok(Statement::Block(StatementsBlock {
            statements: reindex(statements),
            exception_statements: reindex(exception_statements),
        }))
    }

    /// Parses the body of a block whose opening keyword was already consumed, up to and
    /// including the closing `END`.
    fn parse_block_body(&mut self) -> anyhow::Result<(Vec<ParsedStatement>, Vec<ParsedStatement>)> {
        let remaining = self.remaining();
        let end = find_top_level(remaining, self.dialect, |tokens, idx| {
            tokens[idx].kind == TokenType::End
        })
        .ok_or_else(|| anyhow!(self.error(self.peek(), "Expected `END`.")))?;

        let (statements, handlers) = block_statements(&remaining[..end], self.dialect);
        self.curr += end + 1;
        Ok((statements, handlers))
    }

    // if_statement ->
    // "IF" expr "THEN" statement* (("ELSIF" | "ELSEIF") expr "THEN" statement*)* ["ELSE" statement*] "END" "IF"
    // | "IF" expr statement ["ELSE" statement]   (T-SQL)
    fn parse_if_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("if")?;
        let dialect = self.dialect;

        if dialect == Dialect::Tsql {
            let condition = self.parse_expr()?;
            let remaining = self.remaining();
            let else_idx = find_top_level(remaining, dialect, |tokens, idx| {
                tokens[idx].kind == TokenType::Else
            });
            let (then_tokens, else_tokens) = match else_idx {
                Some(idx) => (&remaining[..idx], &remaining[idx + 1..]),
                None => (remaining, &remaining[remaining.len()..]),
            };
            self.skip_to_end();
            return Ok(Statement::If(IfStatement {
                branches: vec![IfBranch {
                    condition,
                    statements: parse_statement_sequence(then_tokens, dialect),
                }],
                r#else: parse_statement_sequence(else_tokens, dialect),
            }));
        }

        let mut branches = vec![];
        let mut r#else = vec![];
        loop {
            let condition = self.parse_expr()?;
            self.consume(TokenTypeVariant::Then)?;
            let remaining = self.remaining();
            let stop = find_top_level(remaining, dialect, |tokens, idx| {
                let token = &tokens[idx];
                matches!(token.kind, TokenType::Else | TokenType::End)
                    || is_word(token, "elsif")
                    || is_word(token, "elseif")
            })
            .ok_or_else(|| anyhow!(self.error(self.peek(), "Expected `END IF`.")))?;
            branches.push(IfBranch {
                condition,
                statements: parse_statement_sequence(&remaining[..stop], dialect),
            });
            self.curr += stop;

            if self.match_non_reserved_keyword("elsif") || self.match_non_reserved_keyword("elseif")
            {
                continue;
            }
            if self.match_token_type(TokenTypeVariant::Else) {
                let remaining = self.remaining();
                let stop = find_top_level(remaining, dialect, |tokens, idx| {
                    tokens[idx].kind == TokenType::End
                })
                .ok_or_else(|| anyhow!(self.error(self.peek(), "Expected `END IF`.")))?;
                r#else = parse_statement_sequence(&remaining[..stop], dialect);
                self.curr += stop;
            }
            self.consume(TokenTypeVariant::End)?;
            self.consume_non_reserved_keyword("if")?;
            break;
        }

        Ok(Statement::If(IfStatement { branches, r#else }))
    }

    // loop_statement -> ["WHILE" expr | "FOR" ... ] ("LOOP" statement* "END" "LOOP" | statements_block)
    fn parse_loop_statement(&mut self) -> anyhow::Result<Statement> {
        let dialect = self.dialect;
        let remaining = self.remaining();
        if let Some(loop_idx) =
            find_top_level(remaining, dialect, |tokens, idx| is_word(&tokens[idx], "loop"))
        {
            self.curr += loop_idx + 1;
            let remaining = self.remaining();
            let stop = find_top_level(remaining, dialect, |tokens, idx| {
                tokens[idx].kind == TokenType::End
            })
            .ok_or_else(|| anyhow!(self.error(self.peek(), "Expected `END LOOP`.")))?;
            let statements = parse_statement_sequence(&remaining[..stop], dialect);
            self.curr += stop;
            self.consume(TokenTypeVariant::End)?;
            self.consume_non_reserved_keyword("loop")?;
            return Ok(Statement::Block(StatementsBlock {
                statements,
                exception_statements: vec![],
            }));
        }

        let begin_idx = find_top_level(remaining, dialect, |tokens, idx| {
            is_word(&tokens[idx], "begin")
        })
        .ok_or_else(|| anyhow!(self.error(self.peek(), "Expected `LOOP` or `BEGIN`.")))?;
        self.curr += begin_idx;
        self.parse_statements_block()
    }

    // create_statement ->
    // "CREATE" ["OR" "REPLACE"] [temporary] ["MATERIALIZED"]
    // ("TABLE" create_table | "VIEW" create_view | ("PROCEDURE" | "FUNCTION") create_procedure)
    fn parse_create_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume(TokenTypeVariant::Create)?;
        let replace = self.match_token_type(TokenTypeVariant::Or);
        if replace {
            self.consume_non_reserved_keyword("replace")?;
        }

        let mut temporary = false;
        let mut materialized = false;
        loop {
            if self.match_non_reserved_keyword("temp")
                || self.match_non_reserved_keyword("temporary")
                || self.match_non_reserved_keyword("volatile")
            {
                temporary = true;
            } else if self.match_non_reserved_keyword("materialized") {
                materialized = true;
            } else if !["global", "local", "unlogged", "transient", "secure", "external"]
                .iter()
                .any(|word| self.match_non_reserved_keyword(word))
            {
                break;
            }
        }

        let peek = self.peek().clone();
        match &peek.kind {
            TokenType::Identifier(object_kind) => match object_kind.to_lowercase().as_str() {
                "table" => self.parse_create_table_statement(replace, temporary),
                "view" => self.parse_create_view_statement(replace, materialized, temporary),
                "procedure" | "proc" | "function" => self.parse_create_procedure_statement(replace),
                _ => Ok(self.parse_unsupported_statement()),
            },
            _ => Err(anyhow!(self.error(&peek, "Expected object kind."))),
        }
    }

    fn parse_if_not_exists(&mut self) -> anyhow::Result<bool> {
        if self.check_non_reserved_keyword("if") {
            self.advance();
            self.consume(TokenTypeVariant::Not)?;
            self.consume(TokenTypeVariant::Exists)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Skips table/view options until `AS query` or the end of the statement. Returns
    /// whether an `AS query` follows.
    fn skip_to_as_query(&mut self) -> anyhow::Result<bool> {
        loop {
            if self.is_at_end() {
                return Ok(false);
            }
            if self.check_token_type(TokenTypeVariant::As) && self.check_query_start(1) {
                self.advance();
                return Ok(true);
            }
            if self.check_token_type(TokenTypeVariant::LeftParen) {
                self.skip_parens()?;
            } else {
                self.advance();
            }
        }
    }

    // create_table -> "TABLE" ["IF" "NOT" "EXISTS"] object_name ["(" table_element ("," table_element)* ")"]
    // table_options ["AS" query_expr]
    fn parse_create_table_statement(
        &mut self,
        replace: bool,
        temporary: bool,
    ) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("table")?;
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_object_name()?;

        let mut columns = vec![];
        if self.check_token_type(TokenTypeVariant::LeftParen) && !self.check_query_start(1) {
            self.advance();
            loop {
                if let Some(column) = self.parse_table_element()? {
                    columns.push(column);
                }
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
        }

        let query = if self.check_query_start(0) || self.skip_to_as_query()? {
            let query = self.parse_query_expr()?;
            self.skip_with_data();
            Some(Box::new(query))
        } else {
            None
        };

        Ok(Statement::CreateTable(Box::new(CreateTableStatement {
            replace,
            temporary: temporary || name.normalized().starts_with('#'),
            if_not_exists,
            name,
            columns,
            query,
        })))
    }

    // table_element -> column_name data_type column_constraint* | table_constraint
    fn parse_table_element(&mut self) -> anyhow::Result<Option<ColumnDef>> {
        let is_constraint = ["constraint", "primary", "unique", "foreign", "check", "index", "key"]
            .iter()
            .any(|word| self.check_non_reserved_keyword(word));

        let column = if is_constraint {
            None
        } else {
            let name = self.parse_word_ident()?;
            let data_type = if self.check_token_type(TokenTypeVariant::Comma)
                || self.check_token_type(TokenTypeVariant::RightParen)
            {
                String::new()
            } else {
                self.parse_data_type()?
            };
            Some(ColumnDef { name, data_type })
        };

        // constraints, defaults, generated expressions
        while !self.check_token_type(TokenTypeVariant::Comma)
            && !self.check_token_type(TokenTypeVariant::RightParen)
        {
            if self.is_at_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
            }
            if self.check_token_type(TokenTypeVariant::LeftParen) {
                self.skip_parens()?;
            } else {
                self.advance();
            }
        }

        Ok(column)
    }

    fn skip_with_data(&mut self) {
        if self.check_token_type(TokenTypeVariant::With)
            && (self.check_next_non_reserved_keyword(1, "data")
                || self.check_next_non_reserved_keyword(1, "no"))
        {
            self.skip_to_end();
        }
    }

    // create_view -> "VIEW" ["IF" "NOT" "EXISTS"] object_name ["(" column ("," column)* ")"] view_options "AS" query_expr
    fn parse_create_view_statement(
        &mut self,
        replace: bool,
        materialized: bool,
        temporary: bool,
    ) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("view")?;
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_object_name()?;

        let columns = if self.check_token_type(TokenTypeVariant::LeftParen) {
            self.parse_ident_list()?
        } else {
            vec![]
        };

        if !self.skip_to_as_query()? {
            return Err(anyhow!(self.error(self.peek(), "Expected `AS`.")));
        }
        let query = self.parse_query_expr()?;
        self.skip_with_data();

        Ok(Statement::CreateView(Box::new(CreateViewStatement {
            replace,
            materialized,
            temporary,
            if_not_exists,
            name,
            columns,
            query: Box::new(query),
        })))
    }

    // create_procedure -> ("PROCEDURE" | "FUNCTION") object_name [parameters] routine_options
    // ("$$" body "$$" | "AS" "String" | ["DECLARE" declaration*] "BEGIN" statement* "END")
    fn parse_create_procedure_statement(&mut self, replace: bool) -> anyhow::Result<Statement> {
        self.advance();
        let name = self.parse_object_name()?;
        let parameters = self.parse_procedure_parameters()?;

        let dialect = self.dialect;
        let mut declarations = vec![];
        let mut body = vec![];
        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenType::Eof => break,
                TokenType::DollarQuoted(source) => {
                    self.advance();
                    (declarations, body) = procedure_source(source, token.line, dialect);
                    break;
                }
                TokenType::String(source) if matches!(self.peek_prev().kind, TokenType::As) => {
                    self.advance();
                    (declarations, body) = procedure_source(source, token.line, dialect);
                    break;
                }
                TokenType::Identifier(word)
                    if matches!(word.to_lowercase().as_str(), "begin" | "declare")
                        || matches!(self.peek_prev().kind, TokenType::As) =>
                {
                    (declarations, body) = procedure_body(self.remaining(), dialect);
                    break;
                }
                TokenType::Select | TokenType::With | TokenType::Merge | TokenType::Set
                    if matches!(self.peek_prev().kind, TokenType::As) =>
                {
                    (declarations, body) = procedure_body(self.remaining(), dialect);
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
        self.skip_to_end();

        Ok(Statement::CreateProcedure(Box::new(CreateProcedureStatement {
            replace,
            name,
            parameters,
            declarations,
            body,
        })))
    }

    // parameters -> "(" [parameter ("," parameter)*] ")" | parameter ("," parameter)*
    // parameter -> ["IN" | "OUT" | "INOUT"] name data_type ["DEFAULT" expr | "=" expr]
    fn parse_procedure_parameters(&mut self) -> anyhow::Result<Vec<ProcedureParameter>> {
        let mut parameters = vec![];
        let parenthesized = self.match_token_type(TokenTypeVariant::LeftParen);
        if parenthesized && self.match_token_type(TokenTypeVariant::RightParen) {
            return Ok(parameters);
        }
        if !parenthesized && !self.check_token_type(TokenTypeVariant::Variable) {
            return Ok(parameters);
        }

        loop {
            if !self.match_token_type(TokenTypeVariant::In) {
                self.match_non_reserved_keyword("out");
                self.match_non_reserved_keyword("inout");
            }
            let name = self.parse_variable_name()?;
            let mut data_type = vec![];
            let mut in_default = false;
            loop {
                if self.is_at_end()
                    || self.check_token_type(TokenTypeVariant::Comma)
                    || self.check_token_type(TokenTypeVariant::RightParen)
                    || (!parenthesized && self.check_token_type(TokenTypeVariant::As))
                {
                    break;
                }
                if self.check_non_reserved_keyword("default")
                    || self.check_token_type(TokenTypeVariant::Equal)
                {
                    in_default = true;
                }
                if self.check_token_type(TokenTypeVariant::LeftParen) {
                    let text = self.paren_text()?;
                    if !in_default {
                        data_type.push(format!("({})", text));
                    }
                    continue;
                }
                let token = self.advance().clone();
                if !in_default {
                    data_type.push(token.lexeme.to_uppercase());
                }
            }
            parameters.push(ProcedureParameter {
                name,
                data_type: data_type.join(" ").replace(" (", "("),
            });
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        if parenthesized {
            self.consume(TokenTypeVariant::RightParen)?;
        }
        Ok(parameters)
    }

    // call_statement -> ("CALL" | "EXEC" | "EXECUTE") object_name ["(" [expr ("," expr)*] ")" | expr ("," expr)*]
    fn parse_call_statement(&mut self) -> anyhow::Result<Statement> {
        self.advance();
        if self.check_token_type(TokenTypeVariant::LeftParen)
            || self.check_token_type(TokenTypeVariant::String)
            || self.check_non_reserved_keyword("immediate")
        {
            // dynamic SQL
            return Ok(self.parse_unsupported_statement());
        }
        let procedure = self.parse_object_name()?;

        let mut arguments = vec![];
        if self.match_token_type(TokenTypeVariant::LeftParen) {
            if !self.match_token_type(TokenTypeVariant::RightParen) {
                loop {
                    arguments.push(self.parse_expr()?);
                    if !self.match_token_type(TokenTypeVariant::Comma) {
                        break;
                    }
                }
                self.consume(TokenTypeVariant::RightParen)?;
            }
        } else if !self.is_at_end() {
            loop {
                arguments.push(self.parse_expr()?);
                // EXEC proc @p = @v OUTPUT
                self.match_non_reserved_keyword("output");
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
        }

        Ok(Statement::Call(CallStatement {
            procedure,
            arguments,
        }))
    }

    // declare_var_statement -> "DECLARE" name [data_type] ["DEFAULT" expr | "=" expr | ":=" expr] ("," ...)*
    fn parse_declare_var_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("declare")?;
        let mut names = vec![];
        let mut data_type = None;
        let mut default = None;

        loop {
            names.push(self.parse_variable_name()?);

            let mut type_tokens = vec![];
            loop {
                if self.is_at_end()
                    || self.check_token_type(TokenTypeVariant::Comma)
                    || self.check_token_type(TokenTypeVariant::Equal)
                    || self.check_token_type(TokenTypeVariant::ColonEqual)
                    || self.check_non_reserved_keyword("default")
                {
                    break;
                }
                if self.check_non_reserved_keyword("cursor") {
                    // DECLARE c CURSOR FOR query
                    self.skip_to_end();
                    type_tokens.push(String::from("CURSOR"));
                    break;
                }
                if self.check_token_type(TokenTypeVariant::LeftParen) {
                    let text = self.paren_text()?;
                    type_tokens.push(format!("({})", text));
                    continue;
                }
                type_tokens.push(self.advance().lexeme.to_uppercase());
            }
            if !type_tokens.is_empty() {
                data_type = Some(type_tokens.join(" ").replace(" (", "("));
            }

            if self.match_token_types(&[TokenTypeVariant::Equal, TokenTypeVariant::ColonEqual])
                || self.match_non_reserved_keyword("default")
            {
                default = Some(self.parse_expr()?);
            }

            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        Ok(Statement::DeclareVar(DeclareVarStatement {
            names,
            data_type,
            default,
        }))
    }

    // set_var_statement -> "SET" name ("=" | ":=") expr
    fn parse_set_var_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume(TokenTypeVariant::Set)?;
        let is_assignment = (self.check_token_type(TokenTypeVariant::Variable)
            || self.check_identifier())
            && (self.check_next_token_type(1, TokenTypeVariant::Equal)
                || self.check_next_token_type(1, TokenTypeVariant::ColonEqual));
        if !is_assignment {
            // SET search_path TO ..., SET NOCOUNT ON, SET (a, b) = ...
            self.curr -= 1;
            return Ok(self.parse_unsupported_statement());
        }

        let name = self.parse_variable_name()?;
        self.advance();
        let value = self.parse_expr()?;
        Ok(Statement::SetVar(SetVarStatement { name, value }))
    }

    // drop_statement -> "DROP" ["MATERIALIZED"] object_kind ["IF" "EXISTS"] object_name ("," object_name)* any*
    fn parse_drop_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("drop")?;
        self.match_non_reserved_keyword("materialized");
        let object_kind = self.parse_word_ident()?.normalized();
        let if_exists = if self.check_non_reserved_keyword("if") {
            self.advance();
            self.consume(TokenTypeVariant::Exists)?;
            true
        } else {
            false
        };

        let mut names = vec![];
        loop {
            names.push(self.parse_object_name()?);
            if self.check_token_type(TokenTypeVariant::LeftParen) {
                // DROP FUNCTION f(int)
                self.skip_parens()?;
            }
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        // CASCADE / RESTRICT
        self.skip_to_end();

        Ok(Statement::Drop(DropStatement {
            object_kind,
            if_exists,
            names,
        }))
    }

    // truncate_statement -> "TRUNCATE" ["TABLE"] object_name
    fn parse_truncate_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("truncate")?;
        self.match_non_reserved_keyword("table");
        let table = self.parse_object_name()?;
        self.skip_to_end();
        Ok(Statement::Truncate(TruncateStatement { table }))
    }

    // insert_statement ->
    // "INSERT" ["INTO" | "OVERWRITE"] ["TABLE"] object_name ["PARTITION" "(" partition_item ("," partition_item)* ")"]
    // ["(" column ("," column)* ")"] (query_expr | "DEFAULT" "VALUES") [on_conflict] ["RETURNING" any*]
    fn parse_insert_statement(&mut self, with: Option<With>) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("insert")?;
        let overwrite = self.match_non_reserved_keyword("overwrite");
        if !overwrite {
            self.match_token_type(TokenTypeVariant::Into);
        }
        self.match_non_reserved_keyword("table");
        let table = self.parse_object_name()?;

        let mut partition = vec![];
        let mut columns = None;
        loop {
            if self.match_token_type(TokenTypeVariant::Partition) {
                self.consume(TokenTypeVariant::LeftParen)?;
                loop {
                    partition.push(self.parse_word_ident()?);
                    if self.match_token_type(TokenTypeVariant::Equal) {
                        self.parse_expr()?;
                    }
                    if !self.match_token_type(TokenTypeVariant::Comma) {
                        break;
                    }
                }
                self.consume(TokenTypeVariant::RightParen)?;
            } else if columns.is_none()
                && self.check_token_type(TokenTypeVariant::LeftParen)
                && !self.check_query_start(1)
            {
                columns = Some(self.parse_ident_list()?);
            } else {
                break;
            }
        }

        if self.match_non_reserved_keyword("overriding") {
            self.consume_one_of_non_reserved_keywords(&["system", "user"])?;
            self.consume_non_reserved_keyword("value")?;
        }

        let source = if self.check_non_reserved_keyword("default")
            && self.check_next_non_reserved_keyword(1, "values")
        {
            self.advance();
            self.advance();
            InsertSource::DefaultValues
        } else {
            InsertSource::Query(Box::new(self.parse_query_expr()?))
        };

        let on_conflict = self.parse_on_conflict()?;

        if self.match_non_reserved_keyword("returning") {
            self.skip_to_end();
        }

        Ok(Statement::Insert(Box::new(InsertStatement {
            with,
            overwrite,
            table,
            partition,
            columns,
            source,
            on_conflict,
        })))
    }

    // on_conflict ->
    // "ON" "CONFLICT" ["(" column ("," column)* ")" | "ON" "CONSTRAINT" name] ["WHERE" expr]
    //   "DO" ("NOTHING" | "UPDATE" "SET" update_item ("," update_item)* ["WHERE" expr])
    // | "ON" "DUPLICATE" "KEY" "UPDATE" update_item ("," update_item)*
    fn parse_on_conflict(&mut self) -> anyhow::Result<Option<OnConflict>> {
        if !self.check_token_type(TokenTypeVariant::On) {
            return Ok(None);
        }

        if self.check_next_non_reserved_keyword(1, "duplicate") {
            self.advance();
            self.advance();
            self.consume_non_reserved_keyword("key")?;
            self.consume_non_reserved_keyword("update")?;
            let items = self.parse_update_items()?;
            return Ok(Some(OnConflict {
                target: vec![],
                action: OnConflictAction::DoUpdate {
                    items,
                    r#where: None,
                },
            }));
        }

        self.advance();
        self.consume_non_reserved_keyword("conflict")?;
        let mut target = vec![];
        if self.check_token_type(TokenTypeVariant::LeftParen) {
            target = self.parse_ident_list()?;
        } else if self.match_token_type(TokenTypeVariant::On) {
            self.consume_non_reserved_keyword("constraint")?;
            self.parse_word_ident()?;
        }
        if self.match_token_type(TokenTypeVariant::Where) {
            self.parse_expr()?;
        }

        self.consume_non_reserved_keyword("do")?;
        let action = if self.match_non_reserved_keyword("nothing") {
            OnConflictAction::DoNothing
        } else {
            self.consume_non_reserved_keyword("update")?;
            self.consume(TokenTypeVariant::Set)?;
            let items = self.parse_update_items()?;
            let r#where = if self.match_token_type(TokenTypeVariant::Where) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            OnConflictAction::DoUpdate { items, r#where }
        };

        Ok(Some(OnConflict { target, action }))
    }

    // update_item -> object_name "=" expr
    fn parse_update_items(&mut self) -> anyhow::Result<Vec<UpdateItem>> {
        let mut items = vec![];
        loop {
            let column = self.parse_object_name()?;
            self.consume(TokenTypeVariant::Equal)?;
            let expr = self.parse_expr()?;
            items.push(UpdateItem { column, expr });
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(items)
    }

    // update_statement -> "UPDATE" object_name [alias] "SET" update_item ("," update_item)* ["FROM" from_expr] ["WHERE" expr]
    fn parse_update_statement(&mut self, with: Option<With>) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("update")?;
        let table = self.parse_object_name()?;
        let alias = self.parse_table_alias(false)?.map(|alias| alias.name);
        self.consume(TokenTypeVariant::Set)?;
        let items = self.parse_update_items()?;

        let from = if self.match_token_type(TokenTypeVariant::From) {
            Some(self.parse_from_expr()?)
        } else {
            None
        };
        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if self.match_non_reserved_keyword("returning") {
            self.skip_to_end();
        }

        Ok(Statement::Update(Box::new(UpdateStatement {
            with,
            table,
            alias,
            items,
            from,
            r#where,
        })))
    }

    // delete_statement -> "DELETE" ["FROM"] object_name [alias] [("USING" | "FROM") from_expr] ["WHERE" expr]
    fn parse_delete_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("delete")?;
        self.match_token_type(TokenTypeVariant::From);
        let table = self.parse_object_name()?;
        let alias = self.parse_table_alias(false)?.map(|alias| alias.name);

        let using = if self.match_token_types(&[TokenTypeVariant::Using, TokenTypeVariant::From]) {
            Some(self.parse_from_expr()?)
        } else {
            None
        };
        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if self.match_non_reserved_keyword("returning") {
            self.skip_to_end();
        }

        Ok(Statement::Delete(Box::new(DeleteStatement {
            table,
            alias,
            using,
            r#where,
        })))
    }

    // merge_statement ->
    // "MERGE" ["INTO"] object_name [alias] "USING" (object_name | "(" query_expr ")") [alias]
    // "ON" expr when+
    fn parse_merge_statement(&mut self, with: Option<With>) -> anyhow::Result<Statement> {
        self.consume(TokenTypeVariant::Merge)?;
        self.match_token_type(TokenTypeVariant::Into);
        let target = self.parse_object_name()?;
        let target_alias = self.parse_table_alias(false)?.map(|alias| alias.name);

        self.consume(TokenTypeVariant::Using)?;
        let source = if self.match_token_type(TokenTypeVariant::LeftParen) {
            let query = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            MergeSource::Subquery(Box::new(query))
        } else {
            MergeSource::Table(self.parse_object_name()?)
        };
        let source_alias = self.parse_table_alias(false)?.map(|alias| alias.name);

        self.consume(TokenTypeVariant::On)?;
        let condition = self.parse_expr()?;

        let mut whens = vec![];
        while self.check_token_type(TokenTypeVariant::When) {
            whens.push(self.parse_merge_when()?);
        }
        if whens.is_empty() {
            return Err(anyhow!(self.error(self.peek(), "Expected `WHEN`.")));
        }
        if self.match_non_reserved_keyword("output") {
            self.skip_to_end();
        }

        Ok(Statement::Merge(Box::new(MergeStatement {
            with,
            target,
            target_alias,
            source,
            source_alias,
            condition,
            whens,
        })))
    }

    // when ->
    // "WHEN" ["NOT"] "MATCHED" ["BY" ("TARGET" | "SOURCE")] ["AND" expr] "THEN"
    // ("UPDATE" "SET" update_item ("," update_item)* | "DELETE" | merge_insert | "DO" "NOTHING")
    fn parse_merge_when(&mut self) -> anyhow::Result<When> {
        self.consume(TokenTypeVariant::When)?;
        let not = self.match_token_type(TokenTypeVariant::Not);
        self.consume_non_reserved_keyword("matched")?;
        let kind = if self.match_token_type(TokenTypeVariant::By) {
            let by = self
                .consume_one_of_non_reserved_keywords(&["target", "source"])?
                .lexeme
                .to_lowercase();
            if by == "source" {
                WhenKind::NotMatchedBySource
            } else {
                WhenKind::NotMatchedByTarget
            }
        } else if not {
            WhenKind::NotMatchedByTarget
        } else {
            WhenKind::Matched
        };

        let condition = if self.match_token_type(TokenTypeVariant::And) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.consume(TokenTypeVariant::Then)?;

        let action = if self.match_non_reserved_keyword("update") {
            self.consume(TokenTypeVariant::Set)?;
            MergeAction::Update(self.parse_update_items()?)
        } else if self.match_non_reserved_keyword("delete") {
            MergeAction::Delete
        } else if self.match_non_reserved_keyword("do") {
            self.consume_non_reserved_keyword("nothing")?;
            MergeAction::DoNothing
        } else {
            self.parse_merge_insert()?
        };

        Ok(When {
            kind,
            condition,
            action,
        })
    }

    // merge_insert -> "INSERT" ["(" column ("," column)* ")"] ("VALUES" "(" expr ("," expr)* ")" | "ROW" | "DEFAULT" "VALUES")
    fn parse_merge_insert(&mut self) -> anyhow::Result<MergeAction> {
        self.consume_non_reserved_keyword("insert")?;
        let columns = if self.check_token_type(TokenTypeVariant::LeftParen) {
            Some(self.parse_ident_list()?)
        } else {
            None
        };

        if self.match_non_reserved_keyword("row") {
            return Ok(MergeAction::InsertRow);
        }
        if self.match_non_reserved_keyword("default") {
            self.consume_non_reserved_keyword("values")?;
            return Ok(MergeAction::Insert {
                columns,
                values: vec![],
            });
        }

        self.consume_non_reserved_keyword("values")?;
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut values = vec![];
        loop {
            values.push(self.parse_expr()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;

        Ok(MergeAction::Insert { columns, values })
    }

    // query_expr -> [with] set_expr ["ORDER" "BY" order_by_expr ("," order_by_expr)*] [limit]
    fn parse_query_expr(&mut self) -> anyhow::Result<Query> {
        self.nested(Self::parse_query_expr_body)
    }

    fn parse_query_expr_body(&mut self) -> anyhow::Result<Query> {
        let with = if self.check_token_type(TokenTypeVariant::With) {
            Some(self.parse_with()?)
        } else {
            None
        };

        let body = self.parse_set_expr()?;

        let order_by = if self.match_token_type(TokenTypeVariant::Order) {
            self.consume(TokenTypeVariant::By)?;
            self.parse_order_by_exprs()?
        } else {
            vec![]
        };

        let (limit, offset) = self.parse_limit()?;

        Ok(Query {
            with,
            body,
            order_by,
            limit,
            offset,
        })
    }

    // limit ->
    // "LIMIT" expr ["," expr] ["OFFSET" expr]
    // | "OFFSET" expr ["ROW" | "ROWS"] ["FETCH" ("FIRST" | "NEXT") expr ("ROW" | "ROWS") ("ONLY" | "WITH" "TIES")]
    fn parse_limit(&mut self) -> anyhow::Result<(Option<Expr>, Option<Expr>)> {
        let mut limit = None;
        let mut offset = None;
        loop {
            if self.match_token_type(TokenTypeVariant::Limit) {
                if self.match_token_type(TokenTypeVariant::All) {
                    continue;
                }
                let first = self.parse_expr()?;
                if self.match_token_type(TokenTypeVariant::Comma) {
                    // LIMIT offset, count
                    offset = Some(first);
                    limit = Some(self.parse_expr()?);
                } else {
                    limit = Some(first);
                }
            } else if self.match_non_reserved_keyword("offset") {
                offset = Some(self.parse_expr()?);
                if !self.match_non_reserved_keyword("rows") {
                    self.match_non_reserved_keyword("row");
                }
            } else if self.match_non_reserved_keyword("fetch") {
                self.consume_one_of_non_reserved_keywords(&["first", "next"])?;
                if !self.check_non_reserved_keyword("rows")
                    && !self.check_non_reserved_keyword("row")
                {
                    limit = Some(self.parse_expr()?);
                }
                self.consume_one_of_non_reserved_keywords(&["rows", "row"])?;
                if self.match_token_type(TokenTypeVariant::With) {
                    self.consume_non_reserved_keyword("ties")?;
                } else {
                    self.consume_non_reserved_keyword("only")?;
                }
            } else {
                break;
            }
        }
        Ok((limit, offset))
    }

    // with -> "WITH" ["RECURSIVE"] cte ("," cte)*
    fn parse_with(&mut self) -> anyhow::Result<With> {
        self.consume(TokenTypeVariant::With)?;
        let recursive = self.match_token_type(TokenTypeVariant::Recursive);
        let mut ctes = vec![];
        loop {
            ctes.push(self.parse_cte()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(With { recursive, ctes })
    }

    // cte -> identifier ["(" column ("," column)* ")"] "AS" ["NOT"] ["MATERIALIZED"] "(" query_expr ")"
    fn parse_cte(&mut self) -> anyhow::Result<Cte> {
        let name = self.parse_ident()?;
        let columns = if self.check_token_type(TokenTypeVariant::LeftParen) {
            self.parse_ident_list()?
        } else {
            vec![]
        };
        self.consume(TokenTypeVariant::As)?;
        self.match_token_type(TokenTypeVariant::Not);
        self.match_non_reserved_keyword("materialized");
        self.consume(TokenTypeVariant::LeftParen)?;
        let query = self.parse_query_expr()?;
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(Cte {
            name,
            columns,
            query: Box::new(query),
        })
    }

    // set_expr -> set_primary (("UNION" | "INTERSECT" | "EXCEPT" | "MINUS") ["ALL" | "DISTINCT"] set_primary)*
    fn parse_set_expr(&mut self) -> anyhow::Result<SetExpr> {
        let mut output = self.parse_set_primary()?;
        loop {
            let op = if self.match_token_type(TokenTypeVariant::Union) {
                SetOperator::Union
            } else if self.match_token_type(TokenTypeVariant::Intersect) {
                SetOperator::Intersect
            } else if self.match_token_type(TokenTypeVariant::Except)
                || self.match_non_reserved_keyword("minus")
            {
                SetOperator::Except
            } else {
                break;
            };
            let all = self.match_token_type(TokenTypeVariant::All);
            if !all {
                self.match_token_type(TokenTypeVariant::Distinct);
            }
            let right = self.parse_set_primary()?;
            output = SetExpr::SetOperation {
                op,
                all,
                left: Box::new(output),
                right: Box::new(right),
            };
        }
        Ok(output)
    }

    // set_primary -> select | "(" query_expr ")" | values
    fn parse_set_primary(&mut self) -> anyhow::Result<SetExpr> {
        if self.check_token_type(TokenTypeVariant::Select) {
            return Ok(SetExpr::Select(Box::new(self.parse_select()?)));
        }
        if self.check_non_reserved_keyword("values") {
            return self.parse_values();
        }
        if self.match_token_type(TokenTypeVariant::LeftParen) {
            let query = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            return Ok(SetExpr::Query(Box::new(query)));
        }
        Err(anyhow!(self.error(
            self.peek(),
            "Expected `SELECT` or `(` or `VALUES`."
        )))
    }

    // values -> "VALUES" "(" expr ("," expr)* ")" ("," "(" expr ("," expr)* ")")*
    fn parse_values(&mut self) -> anyhow::Result<SetExpr> {
        self.consume_non_reserved_keyword("values")?;
        let mut rows = vec![];
        loop {
            self.match_non_reserved_keyword("row");
            self.consume(TokenTypeVariant::LeftParen)?;
            let mut row = vec![];
            loop {
                row.push(self.parse_expr()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            rows.push(row);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(SetExpr::Values(rows))
    }

    // select ->
    // "SELECT" ["DISTINCT" ["ON" "(" expr ("," expr)* ")"] | "ALL"] ["TOP" expr ["PERCENT"] ["WITH" "TIES"]]
    // select_item ("," select_item)*
    // ["INTO" [temporary] ["TABLE"] object_name ("," object_name)*]
    // ["FROM" from_expr]
    // ["WHERE" expr]
    // ["GROUP" "BY" group_by_item ("," group_by_item)*]
    // ["HAVING" expr]
    // ["QUALIFY" expr]
    // ["WINDOW" named_window ("," named_window)*]
    fn parse_select(&mut self) -> anyhow::Result<Select> {
        self.consume(TokenTypeVariant::Select)?;

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        if distinct && self.match_token_type(TokenTypeVariant::On) {
            self.skip_parens()?;
        } else if !distinct {
            self.match_token_type(TokenTypeVariant::All);
        }

        let top = if self.match_non_reserved_keyword("top") {
            let top = self.parse_primary_expr()?;
            self.match_non_reserved_keyword("percent");
            if self.check_token_type(TokenTypeVariant::With)
                && self.check_next_non_reserved_keyword(1, "ties")
            {
                self.advance();
                self.advance();
            }
            Some(top)
        } else {
            None
        };

        let mut projection = vec![];
        loop {
            projection.push(self.parse_select_item()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
            // trailing comma
            if self.check_token_type(TokenTypeVariant::From) {
                break;
            }
        }

        let into = if self.match_token_type(TokenTypeVariant::Into) {
            let mut temporary = false;
            while self.match_non_reserved_keyword("temp")
                || self.match_non_reserved_keyword("temporary")
                || self.match_non_reserved_keyword("unlogged")
            {
                temporary = true;
            }
            self.match_non_reserved_keyword("table");
            let mut targets = vec![];
            loop {
                targets.push(self.parse_object_name()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            Some(SelectInto { temporary, targets })
        } else {
            None
        };

        let from = if self.match_token_type(TokenTypeVariant::From) {
            Some(self.parse_from_expr()?)
        } else {
            None
        };

        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.match_token_type(TokenTypeVariant::Group) {
            self.consume(TokenTypeVariant::By)?;
            self.parse_group_by_items()?
        } else {
            vec![]
        };

        let having = if self.match_token_type(TokenTypeVariant::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let qualify = if self.match_token_type(TokenTypeVariant::Qualify) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut window = vec![];
        if self.match_token_type(TokenTypeVariant::Window) {
            loop {
                let name = self.parse_ident()?;
                self.consume(TokenTypeVariant::As)?;
                let spec = self.parse_window_spec()?;
                window.push(NamedWindow { name, spec });
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
        }

        Ok(Select {
            distinct,
            top,
            projection,
            into,
            from,
            r#where,
            group_by,
            having,
            qualify,
            window,
        })
    }

    // group_by_item -> "ALL" | "GROUPING" "SETS" "(" expr ("," expr)* ")" | expr
    fn parse_group_by_items(&mut self) -> anyhow::Result<Vec<Expr>> {
        if self.match_token_type(TokenTypeVariant::All) {
            return Ok(vec![]);
        }
        let mut items = vec![];
        loop {
            if self.check_non_reserved_keyword("grouping")
                && self.check_next_non_reserved_keyword(1, "sets")
            {
                self.advance();
                self.advance();
                self.consume(TokenTypeVariant::LeftParen)?;
                loop {
                    items.push(self.parse_expr()?);
                    if !self.match_token_type(TokenTypeVariant::Comma) {
                        break;
                    }
                }
                self.consume(TokenTypeVariant::RightParen)?;
            } else {
                items.push(self.parse_expr()?);
            }
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn is_qualified_wildcard(&self) -> bool {
        let mut i = 0;
        loop {
            let token = self.peek_next_i(i);
            let is_name_part = matches!(
                token.kind,
                TokenType::Identifier(_) | TokenType::QuotedIdentifier(_)
            ) || (i > 0 && token.kind.is_keyword());
            if !is_name_part || !self.check_next_token_type(i + 1, TokenTypeVariant::Dot) {
                return false;
            }
            if self.check_next_token_type(i + 2, TokenTypeVariant::Star) {
                return true;
            }
            i += 2;
        }
    }

    // wildcard_except -> [("EXCEPT" | "EXCLUDE") ("(" column ("," column)* ")" | column)]
    fn parse_wildcard_except(&mut self) -> anyhow::Result<Vec<Ident>> {
        if self.match_token_type(TokenTypeVariant::Except)
            || self.match_non_reserved_keyword("exclude")
        {
            if self.check_token_type(TokenTypeVariant::LeftParen) {
                return self.parse_ident_list();
            }
            return Ok(vec![self.parse_ident()?]);
        }
        Ok(vec![])
    }

    // select_item ->
    // "*" wildcard_except
    // | object_name "." "*" wildcard_except
    // | identifier "=" expr    (T-SQL)
    // | expr [alias]
    fn parse_select_item(&mut self) -> anyhow::Result<SelectItem> {
        if self.match_token_type(TokenTypeVariant::Star) {
            let except = self.parse_wildcard_except()?;
            return Ok(SelectItem::Wildcard { except });
        }

        if self.is_qualified_wildcard() {
            let qualifier = self.parse_object_name()?;
            self.consume(TokenTypeVariant::Dot)?;
            self.consume(TokenTypeVariant::Star)?;
            let except = self.parse_wildcard_except()?;
            return Ok(SelectItem::QualifiedWildcard { qualifier, except });
        }

        if self.dialect == Dialect::Tsql
            && self.check_identifier()
            && self.check_next_token_type(1, TokenTypeVariant::Equal)
        {
            let alias = self.parse_ident()?;
            self.advance();
            let expr = self.parse_expr()?;
            return Ok(SelectItem::Expr {
                expr,
                alias: Some(alias),
            });
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    fn is_alias_word(word: &str) -> bool {
        !NON_ALIAS_KEYWORDS.contains(&word.to_lowercase().as_str())
    }

    // alias -> "AS" (word | "String") | identifier
    fn parse_alias(&mut self) -> anyhow::Result<Option<Ident>> {
        if self.match_token_type(TokenTypeVariant::As) {
            let token = self.peek().clone();
            if let TokenType::String(value) = &token.kind {
                self.advance();
                return Ok(Some(Ident {
                    value: value.clone(),
                    quoted: true,
                }));
            }
            return Ok(Some(self.parse_word_ident()?));
        }

        let token = self.peek().clone();
        match &token.kind {
            TokenType::Identifier(word) if Self::is_alias_word(word) => {
                self.advance();
                Ok(Self::token_ident(&token))
            }
            TokenType::QuotedIdentifier(_) => {
                self.advance();
                Ok(Self::token_ident(&token))
            }
            _ => Ok(None),
        }
    }

    // table_alias -> alias ["(" column ("," column)* ")"]
    fn parse_table_alias(&mut self, allow_columns: bool) -> anyhow::Result<Option<TableAlias>> {
        let Some(name) = self.parse_alias()? else {
            return Ok(None);
        };
        let columns = if allow_columns && self.check_token_type(TokenTypeVariant::LeftParen) {
            self.parse_ident_list()?
        } else {
            vec![]
        };
        Ok(Some(TableAlias { name, columns }))
    }

    // from_expr -> from_item (("," | join_operator) from_item [join_constraint])*
    // join_operator -> ["NATURAL"] ["INNER" | ("LEFT" | "RIGHT" | "FULL") ["OUTER"] | "CROSS"] "JOIN"
    //  | ("CROSS" | "OUTER") "APPLY"
    fn parse_from_expr(&mut self) -> anyhow::Result<FromExpr> {
        let mut output = self.parse_from_item()?;

        loop {
            if self.match_token_type(TokenTypeVariant::Comma) {
                let right = self.parse_from_item()?;
                output = FromExpr::Join(JoinExpr {
                    kind: JoinKind::Cross,
                    left: Box::new(output),
                    right: Box::new(right),
                    constraint: JoinConstraint::None,
                });
                continue;
            }

            if (self.check_token_type(TokenTypeVariant::Cross)
                || self.check_token_type(TokenTypeVariant::Outer))
                && self.check_next_non_reserved_keyword(1, "apply")
            {
                let kind = if self.check_token_type(TokenTypeVariant::Cross) {
                    JoinKind::Cross
                } else {
                    JoinKind::Left
                };
                self.advance();
                self.advance();
                let right = self.parse_from_item()?;
                output = FromExpr::Join(JoinExpr {
                    kind,
                    left: Box::new(output),
                    right: Box::new(right),
                    constraint: JoinConstraint::None,
                });
                continue;
            }

            let natural = self.match_token_type(TokenTypeVariant::Natural);
            let kind = if self.match_token_type(TokenTypeVariant::Inner) {
                JoinKind::Inner
            } else if self.match_token_type(TokenTypeVariant::Left) {
                self.match_token_type(TokenTypeVariant::Outer);
                JoinKind::Left
            } else if self.match_token_type(TokenTypeVariant::Right) {
                self.match_token_type(TokenTypeVariant::Outer);
                JoinKind::Right
            } else if self.match_token_type(TokenTypeVariant::Full) {
                self.match_token_type(TokenTypeVariant::Outer);
                JoinKind::Full
            } else if self.match_token_type(TokenTypeVariant::Cross) {
                JoinKind::Cross
            } else if self.check_token_type(TokenTypeVariant::Join) {
                JoinKind::Inner
            } else if natural {
                return Err(anyhow!(self.error(self.peek(), "Expected `JOIN`.")));
            } else {
                break;
            };
            self.consume(TokenTypeVariant::Join)?;

            let right = self.parse_from_item()?;
            let constraint = if natural {
                JoinConstraint::Natural
            } else if self.match_token_type(TokenTypeVariant::On) {
                JoinConstraint::On(self.parse_expr()?)
            } else if self.match_token_type(TokenTypeVariant::Using) {
                JoinConstraint::Using(self.parse_ident_list()?)
            } else {
                JoinConstraint::None
            };

            output = FromExpr::Join(JoinExpr {
                kind,
                left: Box::new(output),
                right: Box::new(right),
                constraint,
            });
        }

        Ok(output)
    }

    // from_item ->
    // ["LATERAL"] "(" query_expr ")" [table_alias]
    // | "(" from_expr ")"
    // | object_name "(" [function_arg ("," function_arg)*] ")" [table_alias]
    // | object_name [table_alias] [table_hints]
    fn parse_from_item(&mut self) -> anyhow::Result<FromExpr> {
        let lateral = self.match_token_type(TokenTypeVariant::Lateral);

        if self.check_token_type(TokenTypeVariant::LeftParen) {
            if self.check_query_start(1) {
                self.advance();
                let query = self.parse_query_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                let alias = self.parse_table_alias(true)?;
                return Ok(FromExpr::Derived(DerivedTable {
                    lateral,
                    query: Box::new(query),
                    alias,
                }));
            }
            self.advance();
            let inner = self.parse_from_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            self.parse_table_alias(true)?;
            return Ok(FromExpr::Grouping(Box::new(inner)));
        }

        let name = self.parse_object_name()?;

        if self.match_token_type(TokenTypeVariant::LeftParen) {
            let args = self.parse_function_args(&name)?;
            let alias = self.parse_table_alias(true)?;
            return Ok(FromExpr::Function(TableFunction { name, args, alias }));
        }

        let alias = self.parse_table_alias(true)?;

        // WITH (NOLOCK)
        if self.check_token_type(TokenTypeVariant::With)
            && self.check_next_token_type(1, TokenTypeVariant::LeftParen)
        {
            self.advance();
            self.skip_parens()?;
        }
        if self.match_non_reserved_keyword("tablesample") {
            self.match_non_reserved_keyword("system");
            self.match_non_reserved_keyword("bernoulli");
            self.skip_parens()?;
        }

        Ok(FromExpr::Table(TableFactor { name, alias }))
    }

    // order_by_expr -> expr ["ASC" | "DESC"] ["NULLS" ("FIRST" | "LAST")]
    fn parse_order_by_exprs(&mut self) -> anyhow::Result<Vec<OrderByExpr>> {
        let mut exprs = vec![];
        loop {
            let expr = self.parse_expr()?;
            let direction = if self.match_token_type(TokenTypeVariant::Asc) {
                Some(SortDirection::Asc)
            } else if self.match_token_type(TokenTypeVariant::Desc) {
                Some(SortDirection::Desc)
            } else {
                None
            };
            let nulls = if self.match_token_type(TokenTypeVariant::Nulls) {
                let tok = self
                    .consume_one_of_non_reserved_keywords(&["first", "last"])?
                    .lexeme
                    .to_lowercase();
                if tok == "first" {
                    Some(NullsOrder::First)
                } else {
                    Some(NullsOrder::Last)
                }
            } else {
                None
            };
            exprs.push(OrderByExpr {
                expr,
                direction,
                nulls,
            });
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(exprs)
    }

    // window_spec ->
    // "(" [identifier] ["PARTITION" "BY" expr ("," expr)*] ["ORDER" "BY" order_by_expr ("," order_by_expr)*]
    // [("ROWS" | "RANGE" | "GROUPS") frame_text] ")"
    fn parse_window_spec(&mut self) -> anyhow::Result<WindowSpec> {
        self.consume(TokenTypeVariant::LeftParen)?;

        let name = if self.check_identifier()
            && !["rows", "range", "groups"]
                .iter()
                .any(|word| self.check_non_reserved_keyword(word))
        {
            Some(self.parse_ident()?)
        } else {
            None
        };

        let mut partition_by = vec![];
        if self.match_token_type(TokenTypeVariant::Partition) {
            self.consume(TokenTypeVariant::By)?;
            loop {
                partition_by.push(self.parse_expr()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
        }

        let order_by = if self.match_token_type(TokenTypeVariant::Order) {
            self.consume(TokenTypeVariant::By)?;
            self.parse_order_by_exprs()?
        } else {
            vec![]
        };

        let mut frame_words = vec![];
        let mut depth = 0;
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
            }
            match self.peek().kind {
                TokenType::RightParen if depth == 0 => break,
                TokenType::RightParen => depth -= 1,
                TokenType::LeftParen => depth += 1,
                _ => {}
            }
            frame_words.push(self.advance().lexeme.to_uppercase());
        }
        self.consume(TokenTypeVariant::RightParen)?;

        Ok(WindowSpec {
            name,
            partition_by,
            order_by,
            frame: if frame_words.is_empty() {
                None
            } else {
                Some(frame_words.join(" "))
            },
        })
    }

    // data_type -> word+ ["(" any* ")"] ["<" any* ">"] ("[" "]")*
    fn parse_data_type(&mut self) -> anyhow::Result<String> {
        let first = self.parse_word_ident()?;
        let mut text = first.value.to_uppercase();

        loop {
            if ["precision", "varying", "unsigned", "signed"]
                .iter()
                .any(|word| self.check_non_reserved_keyword(word))
            {
                text.push(' ');
                text.push_str(&self.advance().lexeme.to_uppercase());
            } else if (self.check_token_type(TokenTypeVariant::With)
                || self.check_non_reserved_keyword("without"))
                && self.check_next_non_reserved_keyword(1, "time")
                && self.check_next_non_reserved_keyword(2, "zone")
            {
                for _ in 0..3 {
                    text.push(' ');
                    text.push_str(&self.advance().lexeme.to_uppercase());
                }
            } else {
                break;
            }
        }

        if self.check_token_type(TokenTypeVariant::LeftParen) {
            let params = self.paren_text()?;
            text.push('(');
            text.push_str(&params);
            text.push(')');
        }

        if self.check_token_type(TokenTypeVariant::Less) {
            let mut depth = 0;
            loop {
                if self.is_at_end() {
                    return Err(anyhow!(self.error(self.peek(), "Expected `>`.")));
                }
                let token = self.advance().clone();
                match token.kind {
                    TokenType::Less => depth += 1,
                    TokenType::Greater => depth -= 1,
                    _ => {}
                }
                let lexeme = token.lexeme.to_uppercase();
                let joins_words = text.ends_with(|c: char| c.is_alphanumeric() || c == '_')
                    && lexeme.starts_with(|c: char| c.is_alphanumeric() || c == '_');
                if joins_words {
                    text.push(' ');
                }
                text.push_str(&lexeme);
                if token.kind == TokenType::Comma {
                    text.push(' ');
                }
                if depth == 0 {
                    break;
                }
            }
        }

        while self.check_token_type(TokenTypeVariant::LeftSquare)
            && self.check_next_token_type(1, TokenTypeVariant::RightSquare)
        {
            self.advance();
            self.advance();
            text.push_str("[]");
        }

        Ok(text)
    }

    fn parse_expr(&mut self) -> anyhow::Result<Expr> {
        self.nested(Self::parse_or_expr)
    }

    /// Util function to parse a standard binary rule expression of kind
    ///
    /// `parse_rule -> parse_rule | next_parsing_rule ("T1" | "T2" | ... next_parsing_rule)*`
    fn parse_standard_binary_expr(
        &mut self,
        operators: &[(TokenTypeVariant, BinaryOperator)],
        next_parsing_rule_fn: impl Fn(&mut Self) -> anyhow::Result<Expr>,
    ) -> anyhow::Result<Expr> {
        let mut output = next_parsing_rule_fn(self)?;

        loop {
            let Some(operator) = operators
                .iter()
                .find(|(token_type, _)| self.check_token_type(*token_type))
                .map(|(_, operator)| *operator)
            else {
                break;
            };
            self.advance();
            let right = next_parsing_rule_fn(self)?;
            output = Expr::Binary(BinaryExpr {
                left: Box::new(output),
                operator,
                right: Box::new(right),
            });
        }

        Ok(output)
    }

    // or_expr -> and_expr ("OR" and_expr)*
    fn parse_or_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::Or, BinaryOperator::Or)],
            Self::parse_and_expr,
        )
    }

    // and_expr -> not_expr ("AND" not_expr)*
    fn parse_and_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::And, BinaryOperator::And)],
            Self::parse_not_expr,
        )
    }

    // not_expr -> "NOT" not_expr | comparison_expr
    fn parse_not_expr(&mut self) -> anyhow::Result<Expr> {
        if self.check_token_type(TokenTypeVariant::Not)
            && !self.check_next_token_type(1, TokenTypeVariant::Exists)
        {
            self.advance();
            return Ok(Expr::Unary(UnaryExpr {
                operator: UnaryOperator::Not,
                right: Box::new(self.nested(Self::parse_not_expr)?),
            }));
        }
        self.parse_comparison_expr()
    }

    // comparison_expr ->
    // bitwise_or_expr
    // | bitwise_or_expr (("=" | ">" | "<" | ">=" | "<=", | "!=", | "<>") bitwise_or_expr)*
    // | bitwise_or_expr "IS" ["NOT"] ("NULL" | "TRUE" | "FALSE" | "DISTINCT" "FROM" bitwise_or_expr)
    // | bitwise_or_expr ["NOT"] "IN" ("(" query_expr ")" | "(" expr ("," expr)* ")")
    // | bitwise_or_expr ["NOT"] "BETWEEN" bitwise_or_expr "AND" bitwise_or_expr
    // | bitwise_or_expr ["NOT"] ("LIKE" | "ILIKE" | "RLIKE" | "SIMILAR" "TO") bitwise_or_expr ["ESCAPE" primary_expr]
    fn parse_comparison_expr(&mut self) -> anyhow::Result<Expr> {
        let mut output = self.parse_bitwise_or_expr()?;

        loop {
            let curr_token = self.peek().clone();
            let comparison = match curr_token.kind {
                TokenType::Equal => Some(BinaryOperator::Equal),
                TokenType::NotEqual | TokenType::BangEqual => Some(BinaryOperator::NotEqual),
                TokenType::Greater => Some(BinaryOperator::Greater),
                TokenType::GreaterEqual => Some(BinaryOperator::GreaterEqual),
                TokenType::Less => Some(BinaryOperator::Less),
                TokenType::LessEqual => Some(BinaryOperator::LessEqual),
                _ => None,
            };
            if let Some(operator) = comparison {
                self.advance();
                let right = self.parse_bitwise_or_expr()?;
                output = Expr::Binary(BinaryExpr {
                    left: Box::new(output),
                    operator,
                    right: Box::new(right),
                });
                continue;
            }

            if self.match_token_type(TokenTypeVariant::Is) {
                let negated = self.match_token_type(TokenTypeVariant::Not);
                let check = if self.match_token_type(TokenTypeVariant::Null)
                    || self.match_non_reserved_keyword("unknown")
                {
                    IsCheck::Null
                } else if self.match_token_type(TokenTypeVariant::True) {
                    IsCheck::True
                } else if self.match_token_type(TokenTypeVariant::False) {
                    IsCheck::False
                } else {
                    self.consume(TokenTypeVariant::Distinct)?;
                    self.consume(TokenTypeVariant::From)?;
                    IsCheck::DistinctFrom(Box::new(self.parse_bitwise_or_expr()?))
                };
                output = Expr::Is {
                    expr: Box::new(output),
                    negated,
                    check,
                };
                continue;
            }

            let negated = self.check_token_type(TokenTypeVariant::Not)
                && (matches!(
                    self.peek_next_i(1).kind,
                    TokenType::In | TokenType::Between | TokenType::Like | TokenType::Ilike
                ) || ["rlike", "regexp", "similar"]
                    .iter()
                    .any(|word| self.check_next_non_reserved_keyword(1, word)));
            if negated {
                self.advance();
            }

            if self.match_token_type(TokenTypeVariant::In) {
                self.consume(TokenTypeVariant::LeftParen)?;
                if self.check_query_start(0) {
                    let query = self.parse_query_expr()?;
                    self.consume(TokenTypeVariant::RightParen)?;
                    output = Expr::InSubquery {
                        expr: Box::new(output),
                        negated,
                        query: Box::new(query),
                    };
                } else {
                    let mut list = vec![];
                    if !self.check_token_type(TokenTypeVariant::RightParen) {
                        loop {
                            list.push(self.parse_expr()?);
                            if !self.match_token_type(TokenTypeVariant::Comma) {
                                break;
                            }
                        }
                    }
                    self.consume(TokenTypeVariant::RightParen)?;
                    output = Expr::InList {
                        expr: Box::new(output),
                        negated,
                        list,
                    };
                }
                continue;
            }

            if self.match_token_type(TokenTypeVariant::Between) {
                let low = self.parse_bitwise_or_expr()?;
                self.consume(TokenTypeVariant::And)?;
                let high = self.parse_bitwise_or_expr()?;
                output = Expr::Between {
                    expr: Box::new(output),
                    negated,
                    low: Box::new(low),
                    high: Box::new(high),
                };
                continue;
            }

            let like = if self.match_token_type(TokenTypeVariant::Like)
                || self.match_non_reserved_keyword("rlike")
                || self.match_non_reserved_keyword("regexp")
            {
                Some(false)
            } else if self.match_token_type(TokenTypeVariant::Ilike) {
                Some(true)
            } else if self.match_non_reserved_keyword("similar") {
                self.consume_non_reserved_keyword("to")?;
                Some(false)
            } else {
                None
            };
            if let Some(case_insensitive) = like {
                let pattern = self.parse_bitwise_or_expr()?;
                let escape = if self.match_non_reserved_keyword("escape") {
                    Some(Box::new(self.parse_primary_expr()?))
                } else {
                    None
                };
                output = Expr::Like {
                    expr: Box::new(output),
                    negated,
                    case_insensitive,
                    pattern: Box::new(pattern),
                    escape,
                };
                continue;
            }

            if negated {
                return Err(anyhow!(self.error(
                    self.peek(),
                    "Expected `IN`, `BETWEEN` or `LIKE`."
                )));
            }
            break;
        }
        Ok(output)
    }

    // bitwise_or_expr -> bitwise_xor_expr ("|" bitwise_xor_expr)*
    fn parse_bitwise_or_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::BitwiseOr, BinaryOperator::BitwiseOr)],
            Self::parse_bitwise_xor_expr,
        )
    }

    // bitwise_xor_expr -> bitwise_and_expr ("^" bitwise_and_expr)*
    fn parse_bitwise_xor_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::BitwiseXor, BinaryOperator::BitwiseXor)],
            Self::parse_bitwise_and_expr,
        )
    }

    // bitwise_and_expr -> add_expr ("&" add_expr)*
    fn parse_bitwise_and_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::BitwiseAnd, BinaryOperator::BitwiseAnd)],
            Self::parse_add_expr,
        )
    }

    // add_expr -> mul_concat_expr (("+" | "-") mul_concat_expr)*
    fn parse_add_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[
                (TokenTypeVariant::Plus, BinaryOperator::Plus),
                (TokenTypeVariant::Minus, BinaryOperator::Minus),
            ],
            Self::parse_mul_concat_expr,
        )
    }

    // mul_concat_expr -> unary_expr (("*" | "/" | "%" | "||") unary_expr)*
    fn parse_mul_concat_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[
                (TokenTypeVariant::Star, BinaryOperator::Multiply),
                (TokenTypeVariant::Slash, BinaryOperator::Divide),
                (TokenTypeVariant::Percent, BinaryOperator::Modulo),
                (TokenTypeVariant::ConcatOperator, BinaryOperator::Concat),
            ],
            Self::parse_unary_expr,
        )
    }

    // unary_expr -> ("+" | "-" | "~") unary_expr | postfix_expr
    fn parse_unary_expr(&mut self) -> anyhow::Result<Expr> {
        let operator = match self.peek().kind {
            TokenType::Plus => Some(UnaryOperator::Plus),
            TokenType::Minus => Some(UnaryOperator::Minus),
            TokenType::BitwiseNot => Some(UnaryOperator::BitwiseNot),
            _ => None,
        };
        if let Some(operator) = operator {
            self.advance();
            return Ok(Expr::Unary(UnaryExpr {
                operator,
                right: Box::new(self.nested(Self::parse_unary_expr)?),
            }));
        }
        self.parse_postfix_expr()
    }

    // postfix_expr ->
    // primary_expr ("::" data_type | "[" expr [":" expr] "]" | ("->" | "->>") primary_expr
    // | "AT" "TIME" "ZONE" primary_expr | "COLLATE" word)*
    fn parse_postfix_expr(&mut self) -> anyhow::Result<Expr> {
        let mut output = self.parse_primary_expr()?;
        loop {
            if self.match_token_type(TokenTypeVariant::DoubleColon) {
                let data_type = self.parse_data_type()?;
                output = Expr::Cast(CastExpr {
                    kind: CastKind::DoubleColon,
                    expr: Box::new(output),
                    data_type,
                });
            } else if self.match_token_type(TokenTypeVariant::LeftSquare) {
                // element access keeps the lineage of the accessed column
                self.parse_expr()?;
                if self.match_token_type(TokenTypeVariant::Colon) {
                    self.parse_expr()?;
                }
                self.consume(TokenTypeVariant::RightSquare)?;
            } else if self.check_token_type(TokenTypeVariant::Arrow)
                || self.check_token_type(TokenTypeVariant::LongArrow)
            {
                let operator = if self.advance().kind == TokenType::Arrow {
                    BinaryOperator::Arrow
                } else {
                    BinaryOperator::LongArrow
                };
                let right = self.parse_primary_expr()?;
                output = Expr::Binary(BinaryExpr {
                    left: Box::new(output),
                    operator,
                    right: Box::new(right),
                });
            } else if self.check_non_reserved_keyword("at")
                && self.check_next_non_reserved_keyword(1, "time")
                && self.check_next_non_reserved_keyword(2, "zone")
            {
                self.advance();
                self.advance();
                self.advance();
                let zone = self.parse_primary_expr()?;
                output = Expr::Function(FunctionExpr {
                    name: ObjectName {
                        parts: vec![Ident::new("timezone")],
                    },
                    distinct: false,
                    args: vec![
                        FunctionArg {
                            keyword: None,
                            expr: zone,
                        },
                        FunctionArg {
                            keyword: None,
                            expr: output,
                        },
                    ],
                    order_by: vec![],
                    within_group: vec![],
                    filter: None,
                    null_treatment: None,
                    over: None,
                    parens: true,
                });
            } else if self.match_non_reserved_keyword("collate") {
                self.parse_word_ident()?;
            } else {
                break;
            }
        }
        Ok(output)
    }

    // function_args -> [("DISTINCT" | "ALL")] [function_arg ("," function_arg)*] ["ORDER" "BY" order_by_expr ("," order_by_expr)*]
    //  [("IGNORE" | "RESPECT") "NULLS"] ["LIMIT" expr] ")"
    // function_arg -> [keyword] ("*" | expr) [("FROM" | "FOR" | "IN" | "AS") expr]
    fn parse_function_args(&mut self, name: &ObjectName) -> anyhow::Result<Vec<FunctionArg>> {
        let (args, _, _, _) = self.parse_function_call_args(name)?;
        Ok(args)
    }

    fn parse_function_call_args(
        &mut self,
        name: &ObjectName,
    ) -> anyhow::Result<(Vec<FunctionArg>, bool, Vec<OrderByExpr>, Option<String>)> {
        let function_name = name
            .last()
            .map(|ident| ident.normalized())
            .unwrap_or_default();
        let mut args = vec![];
        let mut order_by = vec![];
        let mut null_treatment = None;

        if self.match_token_type(TokenTypeVariant::RightParen) {
            return Ok((args, false, order_by, null_treatment));
        }

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        if !distinct {
            self.match_token_type(TokenTypeVariant::All);
        }

        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
            }

            let keyword = if ["both", "leading", "trailing"]
                .iter()
                .any(|word| self.check_non_reserved_keyword(word))
            {
                Some(self.advance().lexeme.to_uppercase())
            } else {
                None
            };

            if keyword.is_some()
                && (self.check_token_type(TokenTypeVariant::From)
                    || self.check_token_type(TokenTypeVariant::Comma))
            {
                // TRIM(BOTH FROM x)
                args.push(FunctionArg {
                    keyword,
                    expr: Expr::Null,
                });
            } else if self.match_token_type(TokenTypeVariant::Star) {
                args.push(FunctionArg {
                    keyword,
                    expr: Expr::Star,
                });
            } else {
                let expr = if function_name == "position" {
                    self.parse_bitwise_or_expr()?
                } else {
                    self.parse_expr()?
                };
                args.push(FunctionArg { keyword, expr });
            }

            // SUBSTRING(x FROM 1 FOR 2), TRIM(' ' FROM x), POSITION(a IN b), CONVERT(x USING utf8)
            loop {
                let keyword = if self.match_token_type(TokenTypeVariant::From) {
                    "FROM"
                } else if self.match_token_type(TokenTypeVariant::In) {
                    "IN"
                } else if self.match_non_reserved_keyword("for") {
                    "FOR"
                } else if self.match_token_type(TokenTypeVariant::As) {
                    "AS"
                } else {
                    break;
                };
                let expr = self.parse_expr()?;
                args.push(FunctionArg {
                    keyword: Some(keyword.to_owned()),
                    expr,
                });
            }

            if self.match_token_type(TokenTypeVariant::Order) {
                self.consume(TokenTypeVariant::By)?;
                order_by = self.parse_order_by_exprs()?;
            }
            if self.check_non_reserved_keyword("ignore")
                || self.check_non_reserved_keyword("respect")
            {
                let treatment = self.advance().lexeme.to_uppercase();
                self.consume(TokenTypeVariant::Nulls)?;
                null_treatment = Some(format!("{} NULLS", treatment));
            }
            if self.match_token_type(TokenTypeVariant::Limit) {
                self.parse_expr()?;
            }

            if !self.match_token_type(TokenTypeVariant::Comma) {
                self.consume(TokenTypeVariant::RightParen)?;
                break;
            }
        }

        Ok((args, distinct, order_by, null_treatment))
    }

    // function_expr -> object_name "(" function_args
    //  ["WITHIN" "GROUP" "(" "ORDER" "BY" order_by_expr ("," order_by_expr)* ")"]
    //  ["FILTER" "(" "WHERE" expr ")"] [("IGNORE" | "RESPECT") "NULLS"] ["OVER" (window_spec | identifier)]
    fn parse_function_expr(&mut self, name: ObjectName) -> anyhow::Result<Expr> {
        self.consume(TokenTypeVariant::LeftParen)?;
        let (args, distinct, order_by, mut null_treatment) = self.parse_function_call_args(&name)?;

        let within_group = if self.match_token_type(TokenTypeVariant::Within) {
            self.consume(TokenTypeVariant::Group)?;
            self.consume(TokenTypeVariant::LeftParen)?;
            self.consume(TokenTypeVariant::Order)?;
            self.consume(TokenTypeVariant::By)?;
            let exprs = self.parse_order_by_exprs()?;
            self.consume(TokenTypeVariant::RightParen)?;
            exprs
        } else {
            vec![]
        };

        let filter = if self.check_non_reserved_keyword("filter")
            && self.check_next_token_type(1, TokenTypeVariant::LeftParen)
        {
            self.advance();
            self.advance();
            self.consume(TokenTypeVariant::Where)?;
            let expr = self.parse_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            Some(Box::new(expr))
        } else {
            None
        };

        if (self.check_non_reserved_keyword("ignore") || self.check_non_reserved_keyword("respect"))
            && self.check_next_token_type(1, TokenTypeVariant::Nulls)
        {
            let treatment = self.advance().lexeme.to_uppercase();
            self.advance();
            null_treatment = Some(format!("{} NULLS", treatment));
        }

        let over = if self.match_token_type(TokenTypeVariant::Over) {
            if self.check_token_type(TokenTypeVariant::LeftParen) {
                Some(self.parse_window_spec()?)
            } else {
                Some(WindowSpec {
                    name: Some(self.parse_ident()?),
                    partition_by: vec![],
                    order_by: vec![],
                    frame: None,
                })
            }
        } else {
            None
        };

        Ok(Expr::Function(FunctionExpr {
            name,
            distinct,
            args,
            order_by,
            within_group,
            filter,
            null_treatment,
            over,
            parens: true,
        }))
    }

    // case_expr -> "CASE" [expr] ("WHEN" expr "THEN" expr)+ ["ELSE" expr] "END"
    fn parse_case_expr(&mut self) -> anyhow::Result<Expr> {
        self.consume(TokenTypeVariant::Case)?;

        let operand = if self.check_token_type(TokenTypeVariant::When) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut when_thens = vec![];
        loop {
            self.consume(TokenTypeVariant::When)?;
            let when_expr = self.parse_expr()?;
            self.consume(TokenTypeVariant::Then)?;
            let then_expr = self.parse_expr()?;
            when_thens.push((when_expr, then_expr));
            if !self.check_token_type(TokenTypeVariant::When) {
                break;
            }
        }

        let r#else = if self.match_token_type(TokenTypeVariant::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.consume(TokenTypeVariant::End)?;

        Ok(Expr::Case(CaseExpr {
            operand,
            when_thens,
            r#else,
        }))
    }

    // cast_expr -> ("CAST" | "TRY_CAST" | "SAFE_CAST") "(" expr "AS" data_type ")"
    fn parse_cast_expr(&mut self, kind: CastKind) -> anyhow::Result<Expr> {
        self.advance();
        self.consume(TokenTypeVariant::LeftParen)?;
        let expr = self.parse_expr()?;
        self.consume(TokenTypeVariant::As)?;
        let data_type = self.parse_data_type()?;
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(Expr::Cast(CastExpr {
            kind,
            expr: Box::new(expr),
            data_type,
        }))
    }

    fn check_interval_unit(&self) -> bool {
        INTERVAL_UNITS
            .iter()
            .any(|unit| self.check_non_reserved_keyword(unit))
    }

    // interval_expr ->"INTERVAL" ("String" | ["-"] "Number" | "(" expr ")") [unit ["TO" unit]]
    fn parse_interval_expr(&mut self) -> anyhow::Result<Expr> {
        self.consume_non_reserved_keyword("interval")?;
        let value = self.parse_unary_expr()?;
        let unit = if self.check_interval_unit() {
            let mut unit = self.advance().lexeme.to_uppercase();
            if self.check_non_reserved_keyword("to") {
                self.advance();
                if self.check_interval_unit() {
                    unit = format!("{} TO {}", unit, self.advance().lexeme.to_uppercase());
                }
            }
            Some(unit)
        } else {
            None
        };
        Ok(Expr::Interval {
            value: Box::new(value),
            unit,
        })
    }

    // primary_expr ->
    // "True" | "False" | "Null" | "String" | "Number" | "Variable" | "*"
    // | typed_literal_name "String" | interval_expr
    // | case_expr | cast_expr | "EXTRACT" "(" word "FROM" expr ")"
    // | ["NOT"] "EXISTS" "(" query_expr ")"
    // | "(" query_expr ")" | "(" expr ("," expr)* ")"
    // | ("LEFT" | "RIGHT" | "ALL") "(" function_args
    // | "ARRAY" "[" [expr ("," expr)*] "]"
    // | object_name ["." "*"] | function_expr | niladic_function
    fn parse_primary_expr(&mut self) -> anyhow::Result<Expr> {
        let peek_token = self.peek().clone();
        let primary_expr = match &peek_token.kind {
            TokenType::True => {
                self.advance();
                Expr::Bool(true)
            }
            TokenType::False => {
                self.advance();
                Expr::Bool(false)
            }
            TokenType::Null => {
                self.advance();
                Expr::Null
            }
            TokenType::String(value) => {
                self.advance();
                Expr::String(value.clone())
            }
            TokenType::Number(value) => {
                self.advance();
                Expr::Number(value.clone())
            }
            TokenType::Variable(name) => {
                self.advance();
                Expr::Variable(name.to_lowercase())
            }
            TokenType::Star => {
                self.advance();
                Expr::Star
            }
            TokenType::Case => self.parse_case_expr()?,
            TokenType::Cast => self.parse_cast_expr(CastKind::Cast)?,
            TokenType::Extract => {
                self.advance();
                self.consume(TokenTypeVariant::LeftParen)?;
                let field = self.parse_word_ident()?.value.to_uppercase();
                self.consume_one_of(&[TokenTypeVariant::From, TokenTypeVariant::Comma])?;
                let expr = self.parse_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                Expr::Extract {
                    field,
                    expr: Box::new(expr),
                }
            }
            TokenType::Exists | TokenType::Not => {
                let negated = self.match_token_type(TokenTypeVariant::Not);
                self.consume(TokenTypeVariant::Exists)?;
                self.consume(TokenTypeVariant::LeftParen)?;
                let query = self.parse_query_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                Expr::Exists {
                    negated,
                    query: Box::new(query),
                }
            }
            TokenType::LeftParen => {
                if self.check_query_start(1) {
                    self.advance();
                    let query = self.parse_query_expr()?;
                    self.consume(TokenTypeVariant::RightParen)?;
                    Expr::Subquery(Box::new(query))
                } else {
                    self.advance();
                    let expr = self.parse_expr()?;
                    if self.match_token_type(TokenTypeVariant::Comma) {
                        let mut exprs = vec![expr];
                        loop {
                            exprs.push(self.parse_expr()?);
                            if !self.match_token_type(TokenTypeVariant::Comma) {
                                break;
                            }
                        }
                        self.consume(TokenTypeVariant::RightParen)?;
                        Expr::Tuple(exprs)
                    } else {
                        self.consume(TokenTypeVariant::RightParen)?;
                        Expr::Grouping(Box::new(expr))
                    }
                }
            }
            TokenType::Left | TokenType::Right | TokenType::All
                if self.check_next_token_type(1, TokenTypeVariant::LeftParen) =>
            {
                self.advance();
                let name = ObjectName {
                    parts: vec![Ident::new(&peek_token.lexeme)],
                };
                self.parse_function_expr(name)?
            }
            TokenType::Identifier(ident) => {
                let lower = ident.to_lowercase();
                let next = self.peek_next_i(1).clone();
                match lower.as_str() {
                    "try_cast" if next.kind == TokenType::LeftParen => {
                        self.parse_cast_expr(CastKind::TryCast)?
                    }
                    "safe_cast" if next.kind == TokenType::LeftParen => {
                        self.parse_cast_expr(CastKind::SafeCast)?
                    }
                    "interval"
                        if matches!(
                            next.kind,
                            TokenType::String(_)
                                | TokenType::Number(_)
                                | TokenType::Minus
                                | TokenType::LeftParen
                        ) =>
                    {
                        self.parse_interval_expr()?
                    }
                    "array" if next.kind == TokenType::LeftSquare => {
                        self.advance();
                        self.advance();
                        let mut args = vec![];
                        if !self.check_token_type(TokenTypeVariant::RightSquare) {
                            loop {
                                args.push(FunctionArg {
                                    keyword: None,
                                    expr: self.parse_expr()?,
                                });
                                if !self.match_token_type(TokenTypeVariant::Comma) {
                                    break;
                                }
                            }
                        }
                        self.consume(TokenTypeVariant::RightSquare)?;
                        Expr::Function(FunctionExpr {
                            name: ObjectName {
                                parts: vec![Ident::new("array")],
                            },
                            distinct: false,
                            args,
                            order_by: vec![],
                            within_group: vec![],
                            filter: None,
                            null_treatment: None,
                            over: None,
                            parens: true,
                        })
                    }
                    _ if TYPED_LITERALS.contains(&lower.as_str())
                        && matches!(next.kind, TokenType::String(_)) =>
                    {
                        self.advance();
                        let value = match &self.advance().kind {
                            TokenType::String(value) => value.clone(),
                            _ => String::new(),
                        };
                        Expr::TypedString {
                            data_type: lower.to_uppercase(),
                            value,
                        }
                    }
                    _ if NILADIC_FUNCTIONS.contains(&lower.as_str())
                        && next.kind != TokenType::LeftParen
                        && next.kind != TokenType::Dot =>
                    {
                        self.advance();
                        Expr::Function(FunctionExpr {
                            name: ObjectName {
                                parts: vec![Ident::new(&lower)],
                            },
                            distinct: false,
                            args: vec![],
                            order_by: vec![],
                            within_group: vec![],
                            filter: None,
                            null_treatment: None,
                            over: None,
                            parens: false,
                        })
                    }
                    _ => self.parse_name_expr()?,
                }
            }
            TokenType::QuotedIdentifier(_) => self.parse_name_expr()?,
            _ => {
                return Err(anyhow!(self.error(&peek_token, "Expected expression.")));
            }
        };

        Ok(primary_expr)
    }

    // name_expr -> object_name ["." "*"] | function_expr
    fn parse_name_expr(&mut self) -> anyhow::Result<Expr> {
        let name = self.parse_object_name()?;
        if self.check_token_type(TokenTypeVariant::LeftParen) {
            return self.parse_function_expr(name);
        }
        if self.check_token_type(TokenTypeVariant::Dot)
            && self.check_next_token_type(1, TokenTypeVariant::Star)
        {
            // COUNT(t.*)
            self.advance();
            self.advance();
            return Ok(Expr::Star);
        }
        Ok(Expr::Column(name))
    }
}

fn reindex(statements: Vec<ParsedStatement>) -> Vec<ParsedStatement> {
    statements
        .into_iter()
        .enumerate()
        .map(|(index, statement)| ParsedStatement { index, ..statement })
        .collect()
}

/// Statements of a block body (tokens between `BEGIN` and `END`), split into the main
/// statements and the statements of the `EXCEPTION` handlers.
fn block_statements(
    tokens: &[Token],
    dialect: Dialect,
) -> (Vec<ParsedStatement>, Vec<ParsedStatement>) {
    let exception = find_top_level(tokens, dialect, |tokens, idx| {
        is_word(&tokens[idx], "exception") && is_statement_start(tokens, idx)
    });
    let Some(exception_idx) = exception else {
        return (parse_statement_sequence(tokens, dialect), vec![]);
    };

    let statements = parse_statement_sequence(&tokens[..exception_idx], dialect);

    // WHEN condition THEN statement* (WHEN condition THEN statement*)*
    let handlers_tokens = &tokens[exception_idx + 1..];
    let mut handlers = vec![];
    let mut pos = 0;
    while pos < handlers_tokens.len() {
        let rest = &handlers_tokens[pos..];
        let Some(then_idx) =
            find_top_level(rest, dialect, |tokens, idx| tokens[idx].kind == TokenType::Then)
        else {
            break;
        };
        let body = &rest[then_idx + 1..];
        let next_when = find_top_level(body, dialect, |tokens, idx| {
            tokens[idx].kind == TokenType::When && idx > 0 && is_statement_start(tokens, idx)
        })
        .unwrap_or(body.len());
        handlers.extend(parse_statement_sequence(&body[..next_when], dialect));
        pos += then_idx + 1 + next_when;
    }

    (statements, reindex(handlers))
}

/// Declarations and statements of a procedure body given as tokens, e.g.
/// `DECLARE x INT; BEGIN ... END;` or a plain statement list.
fn procedure_body(tokens: &[Token], dialect: Dialect) -> (Vec<String>, Vec<ParsedStatement>) {
    let mut declarations = vec![];
    let mut start = 0;

    if tokens.first().is_some_and(|tok| is_word(tok, "declare")) {
        let begin = find_top_level(tokens, dialect, |tokens, idx| {
            is_word(&tokens[idx], "begin") && idx > 0 && is_statement_start(tokens, idx)
        })
        .unwrap_or(tokens.len());
        for range in split_statements(&tokens[1..begin], dialect) {
            let mut name_idx = 1 + range.start;
            if is_word(&tokens[name_idx], "declare") && name_idx + 1 < 1 + range.end {
                name_idx += 1;
            }
            let name = match &tokens[name_idx].kind {
                TokenType::Variable(name) | TokenType::Identifier(name) => name.to_lowercase(),
                TokenType::QuotedIdentifier(name) => name.to_lowercase(),
                _ => continue,
            };
            declarations.push(name);
        }
        start = begin;
    }

    let body = &tokens[start..];
    let is_block = body.first().is_some_and(|tok| is_word(tok, "begin"))
        && !body
            .get(1)
            .is_some_and(|tok| is_word(tok, "transaction") || tok.kind == TokenType::Semicolon);
    if !is_block {
        return (declarations, parse_statement_sequence(body, dialect));
    }

    let inner = &body[1..];
    let end = find_top_level(inner, dialect, |tokens, idx| {
        tokens[idx].kind == TokenType::End
    });
    match end {
        Some(end) => {
            let (mut statements, handlers) = block_statements(&inner[..end], dialect);
            statements.extend(handlers);
            (declarations, reindex(statements))
        }
        None => (declarations, parse_statement_sequence(inner, dialect)),
    }
}

/// Re-scans a procedure body given as a string literal or dollar-quoted text.
fn procedure_source(
    source: &str,
    first_line: u32,
    dialect: Dialect,
) -> (Vec<String>, Vec<ParsedStatement>) {
    let mut scanner = Scanner::with_line_offset(source, dialect, first_line);
    scanner.scan();
    let tokens = scanner.into_tokens();
    procedure_body(&tokens, dialect)
}

fn parse_statement_tokens(tokens: &[Token], dialect: Dialect) -> Result<Statement, SyntaxError> {
    let (line, col) = tokens
        .first()
        .map(|tok| (tok.line, tok.col))
        .unwrap_or((1, 1));

    if let Some(message) = tokens.iter().find_map(|tok| match &tok.kind {
        TokenType::Invalid(message) => Some(message.clone()),
        _ => None,
    }) {
        return Err(SyntaxError { line, col, message });
    }

    let mut parser = Parser::new(tokens, dialect);
    parser.parse().map_err(|err| SyntaxError {
        line,
        col,
        message: err.to_string(),
    })
}

fn parse_range(
    tokens: &[Token],
    range: Range<usize>,
    index: usize,
    dialect: Dialect,
) -> ParsedStatement {
    let statement_tokens = &tokens[range];
    let line = statement_tokens.first().map(|tok| tok.line).unwrap_or(1);
    let result = parse_statement_tokens(statement_tokens, dialect);
    match &result {
        Ok(_) => log::debug!("Parsed statement {} at line {}.", index, line),
        Err(err) => log::debug!("Statement {} at line {} failed: {}", index, line, err),
    }
    ParsedStatement {
        index,
        line,
        result,
    }
}

/// Splits and parses a nested token sequence (block and procedure bodies).
pub(crate) fn parse_statement_sequence(tokens: &[Token], dialect: Dialect) -> Vec<ParsedStatement> {
    split_statements(tokens, dialect)
        .into_iter()
        .enumerate()
        .map(|(index, range)| parse_range(tokens, range, index, dialect))
        .collect()
}

/// Lazy sequence of top-level statements. Splitting happens up front; every statement is
/// parsed only when the iterator reaches it, and a failing statement yields its syntax
/// error without affecting the following ones.
pub struct Statements {
    tokens: Vec<Token>,
    ranges: std::vec::IntoIter<Range<usize>>,
    dialect: Dialect,
    index: usize,
}

impl Iterator for Statements {
    type Item = ParsedStatement;

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.ranges.next()?;
        let parsed = parse_range(&self.tokens, range, self.index, self.dialect);
        self.index += 1;
        Some(parsed)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ranges.size_hint()
    }
}

impl ExactSizeIterator for Statements {}

pub fn parse_statements(sql: &str, dialect: Dialect) -> Statements {
    let mut scanner = Scanner::new(sql, dialect);
    scanner.scan();
    let tokens = scanner.into_tokens();
    log::debug!("Scanned {} tokens.", tokens.len());
    let ranges = split_statements(&tokens, dialect);
    Statements {
        tokens,
        ranges: ranges.into_iter(),
        dialect,
        index: 0,
    }
}

pub fn parse_sql(sql: &str) -> anyhow::Result<Vec<ParsedStatement>> {
    let statements = parse_statements(sql, Dialect::default());
    if statements.len() == 0 {
        return Err(anyhow!("Found empty SQL input."));
    }
    Ok(statements.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(sql: &str, dialect: Dialect) -> Statement {
        let mut statements = parse_statements(sql, dialect);
        let parsed = statements.next().expect("No statement parsed");
        parsed.result.expect("Cannot parse statement")
    }

    #[test]
    fn parses_cte_insert_select() {
        let statement = parse_one(
            "WITH a AS (SELECT id FROM src.t) INSERT INTO dst.t (id) SELECT id FROM a",
            Dialect::Postgres,
        );
        let Statement::Insert(insert) = statement else {
            panic!("Expected insert statement");
        };
        assert_eq!(insert.table.normalized(), "dst.t");
        assert!(insert.with.is_some());
        assert_eq!(insert.columns.map(|cols| cols.len()), Some(1));
    }

    #[test]
    fn parses_merge_whens() {
        let statement = parse_one(
            "MERGE INTO dim_store AS t USING (SELECT * FROM stg_store) s ON t.id = s.id \
             WHEN MATCHED AND t.name <> s.name THEN UPDATE SET name = s.name \
             WHEN NOT MATCHED THEN INSERT (id, name) VALUES (s.id, s.name)",
            Dialect::Ansi,
        );
        let Statement::Merge(merge) = statement else {
            panic!("Expected merge statement");
        };
        assert_eq!(merge.whens.len(), 2);
        assert_eq!(merge.whens[1].kind, WhenKind::NotMatchedByTarget);
        assert_eq!(merge.source_alias.map(|alias| alias.value), Some("s".to_owned()));
    }

    #[test]
    fn parses_procedure_with_dollar_body() {
        let sql = "CREATE OR REPLACE PROCEDURE load_sales(p_date DATE)\n\
                   LANGUAGE plpgsql AS $$\n\
                   DECLARE\n  v_count INT;\n\
                   BEGIN\n  INSERT INTO fact_sales SELECT * FROM stg_sales;\n\
                   \x20 SELECT COUNT(*) INTO v_count FROM fact_sales;\n\
                   END;\n$$;";
        let statement = parse_one(sql, Dialect::Postgres);
        let Statement::CreateProcedure(procedure) = statement else {
            panic!("Expected create procedure statement");
        };
        assert_eq!(procedure.parameters[0].name, "p_date");
        assert_eq!(procedure.declarations, vec!["v_count".to_owned()]);
        assert_eq!(procedure.body.len(), 2);
        assert_eq!(procedure.body[0].line, 6);
        assert!(procedure.body.iter().all(|stmt| stmt.result.is_ok()));
    }

    #[test]
    fn malformed_statement_does_not_stop_the_rest() {
        let statements: Vec<_> =
            parse_statements("SELECT 1; SELEC oops FROM; SELECT 2", Dialect::Ansi).collect();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].result.is_ok());
        assert!(statements[1].result.is_err());
        assert!(statements[2].result.is_ok());
    }

    #[test]
    fn parses_double_colon_cast_and_window() {
        let statement = parse_one(
            "SELECT ROW_NUMBER() OVER (PARTITION BY email ORDER BY created_at DESC) AS rn, \
             x::date FROM t",
            Dialect::Postgres,
        );
        let Statement::Query(query) = statement else {
            panic!("Expected query statement");
        };
        let SetExpr::Select(select) = query.query.body else {
            panic!("Expected select");
        };
        assert_eq!(select.projection.len(), 2);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_sql("  -- nothing here\n").is_err());
    }
}
