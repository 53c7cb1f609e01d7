use anyhow::anyhow;

use crate::{
    ast::{Token, TokenType},
    dialect::Dialect,
};

pub struct Scanner {
    source_chars: Vec<char>,
    tokens: Vec<Token>,
    dialect: Dialect,
    start: usize,
    current: usize,
    line: u32,
    col: u32,
    start_line: u32,
    start_col: u32,
    first_line: u32,
}

impl Scanner {
    pub fn new(source: &str, dialect: Dialect) -> Self {
        Self::with_line_offset(source, dialect, 1)
    }

    /// Scanner whose positions start at `first_line`, used to re-scan procedure bodies
    /// embedded in string literals so that errors point into the enclosing file.
    pub fn with_line_offset(source: &str, dialect: Dialect, first_line: u32) -> Self {
        Self {
            source_chars: source.chars().collect(),
            tokens: vec![],
            dialect,
            start: 0,
            current: 0,
            line: first_line,
            col: 1,
            start_line: first_line,
            start_col: 1,
            first_line,
        }
    }

    pub fn tokens(&self) -> &Vec<Token> {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    fn advance(&mut self) -> char {
        let c = self.source_chars[self.current];
        self.current += 1;
        self.col += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source_chars[self.current]
        }
    }

    fn peek_next_i(&self, i: usize) -> char {
        if self.current + i >= self.source_chars.len() {
            '\0'
        } else {
            self.source_chars[self.current + i]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        };

        self.advance();
        true
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.tokens.push(Token {
            kind: token_type,
            lexeme: self.current_source_str(),
            line: self.start_line,
            col: self.start_col,
        });
    }

    fn current_source_str(&self) -> String {
        self.source_chars[self.start..self.current].iter().collect()
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.start = 0;
        self.current = 0;
        self.col = 1;
        self.line = self.first_line;
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.col = 1;
    }

    /// Scans the whole source. Lexical errors do not stop the scan: the offending text
    /// becomes an `Invalid` token and scanning resumes right after it.
    pub fn scan(&mut self) {
        self.reset();
        while self.current < self.source_chars.len() {
            self.start = self.current;
            self.start_line = self.line;
            self.start_col = self.col;
            if let Err(err) = self.scan_token() {
                log::debug!("{}", err);
                self.add_token(TokenType::Invalid(err.to_string()));
            }
        }
        self.start = self.current;
        self.start_line = self.line;
        self.start_col = self.col;
        self.tokens.push(Token {
            kind: TokenType::Eof,
            lexeme: String::from("eof"),
            line: self.line,
            col: self.col,
        });
    }

    fn match_number(&mut self) -> anyhow::Result<()> {
        let mut found_dot = self.source_chars[self.start] == '.';
        let mut found_e = false;
        loop {
            let peek_char = self.peek();

            if peek_char == '.' {
                if found_dot || found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_dot = true;
                self.advance();
            } else if peek_char == 'e' || peek_char == 'E' {
                if found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_e = true;
                let peek_next_char = self.peek_next_i(1);
                if peek_next_char == '+' || peek_next_char == '-' {
                    self.advance();
                    if !(self.peek_next_i(1).is_ascii_digit()) {
                        return Err(anyhow!(self.error_str("Found invalid number")));
                    }
                    self.advance();
                } else if peek_next_char.is_ascii_digit() {
                    self.advance();
                } else {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
            } else if peek_char.is_ascii_digit() {
                self.advance();
            } else {
                self.add_token(TokenType::Number(self.current_source_str()));
                break;
            }
        }

        Ok(())
    }

    /// Single-quoted (or dialect double-quoted) string. A doubled delimiter and a
    /// backslash both escape the next delimiter.
    fn match_string(&mut self, delimiter: char) -> anyhow::Result<()> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error_str("Found unterminated string")));
            }
            let curr_char = self.advance();
            if curr_char == '\\' && !self.is_at_end() {
                let escaped = self.advance();
                if escaped == '\n' {
                    self.new_line();
                }
                value.push(curr_char);
                value.push(escaped);
                continue;
            }
            if curr_char == delimiter {
                if self.match_char(delimiter) {
                    value.push(delimiter);
                    continue;
                }
                break;
            }
            if curr_char == '\n' {
                self.new_line();
            }
            value.push(curr_char);
        }
        self.add_token(TokenType::String(value));
        Ok(())
    }

    fn match_quoted_identifier(&mut self, closing: char) -> anyhow::Result<()> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(anyhow!(
                    self.error_str("Found unterminated quoted identifier")
                ));
            }
            let curr_char = self.advance();
            if curr_char == closing {
                if self.match_char(closing) {
                    value.push(closing);
                    continue;
                }
                break;
            }
            if curr_char == '\n' {
                self.new_line();
            }
            value.push(curr_char);
        }
        if value.is_empty() {
            return Err(anyhow!(self.error_str("Found empty quoted identifier.")));
        }
        self.add_token(TokenType::QuotedIdentifier(value));
        Ok(())
    }

    /// `$$ ... $$` or `$tag$ ... $tag$`. The opening `$` has already been consumed.
    fn match_dollar_quoted(&mut self) -> anyhow::Result<()> {
        let mut tag = String::from("$");
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            tag.push(self.advance());
        }
        if !self.match_char('$') {
            return Err(anyhow!(self.error_str("Found invalid dollar-quoted string")));
        }
        tag.push('$');

        let tag_chars: Vec<char> = tag.chars().collect();
        let body_start = self.current;
        loop {
            if self.is_at_end() {
                return Err(anyhow!(
                    self.error_str("Found unterminated dollar-quoted string")
                ));
            }
            if self
                .source_chars
                .get(self.current..self.current + tag_chars.len())
                .is_some_and(|window| window == tag_chars.as_slice())
            {
                let body = self.source_chars[body_start..self.current]
                    .iter()
                    .collect::<String>();
                for _ in 0..tag_chars.len() {
                    self.advance();
                }
                self.add_token(TokenType::DollarQuoted(body));
                break;
            }
            if self.advance() == '\n' {
                self.new_line();
            }
        }
        Ok(())
    }

    fn match_word(&mut self) -> String {
        loop {
            let peek_char = self.peek();
            if !(peek_char.is_alphanumeric() || peek_char == '_' || peek_char == '$') {
                break;
            }
            self.advance();
        }
        self.current_source_str()
    }

    fn match_keyword_or_identifier(&mut self) {
        let identifier = self.match_word();

        match identifier.to_lowercase().as_str() {
            "all" => self.add_token(TokenType::All),
            "and" => self.add_token(TokenType::And),
            "as" => self.add_token(TokenType::As),
            "asc" => self.add_token(TokenType::Asc),
            "between" => self.add_token(TokenType::Between),
            "by" => self.add_token(TokenType::By),
            "case" => self.add_token(TokenType::Case),
            "cast" => self.add_token(TokenType::Cast),
            "create" => self.add_token(TokenType::Create),
            "cross" => self.add_token(TokenType::Cross),
            "desc" => self.add_token(TokenType::Desc),
            "distinct" => self.add_token(TokenType::Distinct),
            "else" => self.add_token(TokenType::Else),
            "end" => self.add_token(TokenType::End),
            "except" => self.add_token(TokenType::Except),
            "exists" => self.add_token(TokenType::Exists),
            "extract" => self.add_token(TokenType::Extract),
            "false" => self.add_token(TokenType::False),
            "from" => self.add_token(TokenType::From),
            "full" => self.add_token(TokenType::Full),
            "group" => self.add_token(TokenType::Group),
            "having" => self.add_token(TokenType::Having),
            "ilike" => self.add_token(TokenType::Ilike),
            "in" => self.add_token(TokenType::In),
            "inner" => self.add_token(TokenType::Inner),
            "intersect" => self.add_token(TokenType::Intersect),
            "into" => self.add_token(TokenType::Into),
            "is" => self.add_token(TokenType::Is),
            "join" => self.add_token(TokenType::Join),
            "lateral" => self.add_token(TokenType::Lateral),
            "left" => self.add_token(TokenType::Left),
            "like" => self.add_token(TokenType::Like),
            "limit" => self.add_token(TokenType::Limit),
            "merge" => self.add_token(TokenType::Merge),
            "natural" => self.add_token(TokenType::Natural),
            "not" => self.add_token(TokenType::Not),
            "null" => self.add_token(TokenType::Null),
            "nulls" => self.add_token(TokenType::Nulls),
            "on" => self.add_token(TokenType::On),
            "or" => self.add_token(TokenType::Or),
            "order" => self.add_token(TokenType::Order),
            "outer" => self.add_token(TokenType::Outer),
            "over" => self.add_token(TokenType::Over),
            "partition" => self.add_token(TokenType::Partition),
            "qualify" => self.add_token(TokenType::Qualify),
            "recursive" => self.add_token(TokenType::Recursive),
            "right" => self.add_token(TokenType::Right),
            "select" => self.add_token(TokenType::Select),
            "set" => self.add_token(TokenType::Set),
            "then" => self.add_token(TokenType::Then),
            "true" => self.add_token(TokenType::True),
            "union" => self.add_token(TokenType::Union),
            "using" => self.add_token(TokenType::Using),
            "when" => self.add_token(TokenType::When),
            "where" => self.add_token(TokenType::Where),
            "window" => self.add_token(TokenType::Window),
            "with" => self.add_token(TokenType::With),
            "within" => self.add_token(TokenType::Within),
            _ => self.add_token(TokenType::Identifier(identifier)),
        }
    }

    fn match_variable(&mut self) {
        while self.peek() == '@' {
            self.advance();
        }
        self.match_word();
        let name = self.current_source_str();
        self.add_token(TokenType::Variable(name));
    }

    fn scan_token(&mut self) -> anyhow::Result<()> {
        let curr_char = self.advance();
        match curr_char {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            ']' => self.add_token(TokenType::RightSquare),
            '*' => self.add_token(TokenType::Star),
            ',' => self.add_token(TokenType::Comma),
            '%' => self.add_token(TokenType::Percent),
            ';' => self.add_token(TokenType::Semicolon),
            '[' => {
                if self.dialect.bracket_identifiers() {
                    self.match_quoted_identifier(']')?;
                } else {
                    self.add_token(TokenType::LeftSquare);
                }
            }
            ':' => {
                if self.match_char(':') {
                    self.add_token(TokenType::DoubleColon);
                } else if self.match_char('=') {
                    self.add_token(TokenType::ColonEqual);
                } else if self.peek().is_alphabetic() || self.peek() == '_' {
                    self.match_word();
                    self.add_token(TokenType::Variable(self.current_source_str()));
                } else {
                    self.add_token(TokenType::Colon);
                }
            }
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.match_number()?;
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '+' => self.add_token(TokenType::Plus),
            '=' => {
                // `==` is accepted as equality
                self.match_char('=');
                self.add_token(TokenType::Equal)
            }
            '/' => {
                if self.match_char('*') {
                    loop {
                        if self.is_at_end() {
                            return Err(anyhow!(self.error_str("Found unterminated comment")));
                        }
                        if self.peek() == '*' && self.peek_next_i(1) == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.advance() == '\n' {
                            self.new_line();
                        }
                    }
                } else {
                    self.add_token(TokenType::Slash)
                }
            }
            '#' => {
                if self.dialect.hash_comments() {
                    loop {
                        let peek_char = self.peek();
                        if peek_char == '\n' || peek_char == '\0' {
                            break;
                        }
                        self.advance();
                    }
                } else if self.peek() == '#' || self.peek().is_alphanumeric() || self.peek() == '_'
                {
                    // temp table name, e.g. #tmp or ##global_tmp
                    while self.peek() == '#' {
                        self.advance();
                    }
                    let name = self.match_word();
                    self.add_token(TokenType::Identifier(name));
                } else {
                    self.add_token(TokenType::BitwiseXor);
                }
            }
            '-' => {
                if self.match_char('-') {
                    loop {
                        let peek_char = self.peek();
                        if peek_char == '\n' || peek_char == '\0' {
                            break;
                        }
                        self.advance();
                    }
                } else if self.match_char('>') {
                    if self.match_char('>') {
                        self.add_token(TokenType::LongArrow);
                    } else {
                        self.add_token(TokenType::Arrow);
                    }
                } else {
                    self.add_token(TokenType::Minus)
                }
            }
            '<' => {
                if self.match_char('>') {
                    self.add_token(TokenType::NotEqual);
                } else if self.match_char('=') {
                    self.add_token(TokenType::LessEqual);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }
            '~' => {
                self.add_token(TokenType::BitwiseNot);
            }
            '&' => {
                self.add_token(TokenType::BitwiseAnd);
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenType::ConcatOperator);
                } else {
                    self.add_token(TokenType::BitwiseOr);
                }
            }
            '^' => {
                self.add_token(TokenType::BitwiseXor);
            }
            '\n' => {
                self.new_line();
            }
            '\r' | ' ' | '\t' => {}

            // strings
            '\'' => {
                self.match_string('\'')?;
            }
            '"' => {
                if self.dialect.double_quoted_strings() {
                    self.match_string('"')?;
                } else {
                    self.match_quoted_identifier('"')?;
                }
            }
            '`' => {
                self.match_quoted_identifier('`')?;
            }

            '$' => {
                let peek_char = self.peek();
                if peek_char.is_ascii_digit() {
                    // positional parameter
                    while self.peek().is_ascii_digit() {
                        self.advance();
                    }
                    self.add_token(TokenType::Variable(self.current_source_str()));
                } else {
                    self.match_dollar_quoted()?;
                }
            }

            '@' => {
                self.match_variable();
            }

            // numeric
            c if c.is_ascii_digit() => {
                self.match_number()?;
            }

            // Keywords and identifiers
            c if c.is_alphabetic() || c == '_' => {
                self.match_keyword_or_identifier();
            }

            _ => {
                return Err(anyhow!(self.error_str(&format!(
                    "Found unexpected character while scanning: {}",
                    curr_char
                ))));
            }
        }
        Ok(())
    }

    fn error_str(&self, error: &str) -> String {
        format!(
            "[line {}, col {}] Scanner error: {}",
            self.start_line, self.start_col, error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TokenTypeVariant;

    fn kinds(sql: &str, dialect: Dialect) -> Vec<TokenType> {
        let mut scanner = Scanner::new(sql, dialect);
        scanner.scan();
        scanner.tokens().iter().map(|tok| tok.kind.clone()).collect()
    }

    #[test]
    fn scans_postgres_operators_and_variables() {
        let kinds = kinds("x::date || @batch_id -> $1", Dialect::Postgres);
        assert_eq!(
            kinds,
            vec![
                TokenType::Identifier("x".to_owned()),
                TokenType::DoubleColon,
                TokenType::Identifier("date".to_owned()),
                TokenType::ConcatOperator,
                TokenType::Variable("@batch_id".to_owned()),
                TokenType::Arrow,
                TokenType::Variable("$1".to_owned()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn scans_escaped_strings() {
        let kinds = kinds("'it''s' 'a\\'b'", Dialect::Ansi);
        assert_eq!(kinds[0], TokenType::String("it's".to_owned()));
        assert_eq!(kinds[1], TokenType::String("a\\'b".to_owned()));
    }

    #[test]
    fn scans_dollar_quoted_bodies() {
        let mut scanner = Scanner::new(
            "AS $body$\nBEGIN\n  SELECT 1;\nEND;\n$body$ LANGUAGE plpgsql",
            Dialect::Postgres,
        );
        scanner.scan();
        let tokens = scanner.tokens();
        assert_eq!(
            tokens[1].kind,
            TokenType::DollarQuoted("\nBEGIN\n  SELECT 1;\nEND;\n".to_owned())
        );
        assert_eq!(tokens[2].line, 5);
    }

    #[test]
    fn comments_and_temp_tables_depend_on_dialect() {
        assert_eq!(
            kinds("#tmp", Dialect::Tsql)[0],
            TokenType::Identifier("#tmp".to_owned())
        );
        assert_eq!(kinds("# comment", Dialect::Bigquery), vec![TokenType::Eof]);
        assert_eq!(
            kinds("[order]", Dialect::Tsql)[0],
            TokenType::QuotedIdentifier("order".to_owned())
        );
    }

    #[test]
    fn lexical_errors_become_invalid_tokens() {
        let mut scanner = Scanner::new("SELECT 'abc\n;\nSELECT 1", Dialect::Ansi);
        scanner.scan();
        let tokens = scanner.tokens();
        assert_eq!(
            TokenTypeVariant::from(&tokens[1].kind),
            TokenTypeVariant::Invalid
        );
        assert_eq!(tokens.last().map(|tok| tok.kind.clone()), Some(TokenType::Eof));

        let kinds = kinds("SELECT { 1", Dialect::Ansi);
        assert_eq!(TokenTypeVariant::from(&kinds[1]), TokenTypeVariant::Invalid);
        assert_eq!(kinds[2], TokenType::Number("1".to_owned()));
    }

    #[test]
    fn tracks_token_positions() {
        let mut scanner = Scanner::new("SELECT\n  a", Dialect::Ansi);
        scanner.scan();
        let tokens = scanner.tokens();
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].col), (2, 3));
    }
}
