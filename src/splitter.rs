use std::ops::Range;

use crate::{
    ast::{Token, TokenType},
    dialect::Dialect,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Begin,
    Case,
    If,
    Loop,
}

impl BlockKind {
    fn closing_word(&self) -> Option<&'static str> {
        match self {
            BlockKind::Begin => None,
            BlockKind::Case => Some("case"),
            BlockKind::If => Some("if"),
            BlockKind::Loop => Some("loop"),
        }
    }
}

/// Tracks parenthesis and procedural block nesting while walking a token stream.
#[derive(Debug)]
pub(crate) struct BlockTracker {
    dialect: Dialect,
    paren_depth: usize,
    blocks: Vec<BlockKind>,
}

pub(crate) fn is_word(token: &Token, word: &str) -> bool {
    token.word().is_some_and(|w| w == word)
}

/// True when the token at `idx` can begin a statement inside a procedural body.
pub(crate) fn is_statement_start(tokens: &[Token], idx: usize) -> bool {
    if idx == 0 {
        return true;
    }
    let prev = &tokens[idx - 1];
    matches!(prev.kind, TokenType::Semicolon | TokenType::Then | TokenType::Else)
        || ["begin", "loop", "exception", "as", "is"]
            .iter()
            .any(|word| is_word(prev, word))
}

impl BlockTracker {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            paren_depth: 0,
            blocks: vec![],
        }
    }

    pub(crate) fn at_top_level(&self) -> bool {
        self.paren_depth == 0 && self.blocks.is_empty()
    }

    fn opens_begin_block(tokens: &[Token], idx: usize) -> bool {
        match tokens.get(idx + 1) {
            None => false,
            Some(next) => {
                !matches!(next.kind, TokenType::Semicolon | TokenType::Eof)
                    && !["transaction", "tran", "work", "isolation"]
                        .iter()
                        .any(|word| is_word(next, word))
            }
        }
    }

    /// Feeds the token at `idx` and returns how many tokens it consumed (`END IF` and
    /// friends consume two).
    pub(crate) fn feed(&mut self, tokens: &[Token], idx: usize) -> usize {
        let token = &tokens[idx];
        match &token.kind {
            TokenType::LeftParen => self.paren_depth += 1,
            TokenType::RightParen => self.paren_depth = self.paren_depth.saturating_sub(1),
            TokenType::Case => self.blocks.push(BlockKind::Case),
            TokenType::End => {
                if let Some(block) = self.blocks.pop() {
                    let closes_with_word = block
                        .closing_word()
                        .zip(tokens.get(idx + 1))
                        .is_some_and(|(word, next)| is_word(next, word));
                    if closes_with_word {
                        return 2;
                    }
                }
            }
            TokenType::Identifier(ident) => match ident.to_lowercase().as_str() {
                "begin" if Self::opens_begin_block(tokens, idx) => {
                    self.blocks.push(BlockKind::Begin)
                }
                "if" if self.dialect != Dialect::Tsql && is_statement_start(tokens, idx) => {
                    self.blocks.push(BlockKind::If)
                }
                "loop" => self.blocks.push(BlockKind::Loop),
                _ => {}
            },
            _ => {}
        }
        1
    }
}

/// Splits a token stream into statement ranges. Statements end at a `;` outside any
/// parenthesis or procedural block; the semicolon is not part of the range and empty
/// statements are skipped.
pub fn split_statements(tokens: &[Token], dialect: Dialect) -> Vec<Range<usize>> {
    let end = tokens
        .iter()
        .position(|tok| tok.kind == TokenType::Eof)
        .unwrap_or(tokens.len());

    let mut ranges = vec![];
    let mut tracker = BlockTracker::new(dialect);
    let mut chunk_start = 0;
    let mut idx = 0;
    while idx < end {
        if tokens[idx].kind == TokenType::Semicolon && tracker.at_top_level() {
            if idx > chunk_start {
                ranges.push(chunk_start..idx);
            }
            chunk_start = idx + 1;
            idx += 1;
            tracker = BlockTracker::new(dialect);
            continue;
        }
        idx += tracker.feed(tokens, idx);
    }

    if chunk_start < end {
        if tracker.at_top_level() {
            ranges.push(chunk_start..end);
        } else {
            log::debug!(
                "Unclosed block or parenthesis at line {}, splitting on plain semicolons.",
                tokens[chunk_start].line
            );
            ranges.extend(split_on_semicolons(tokens, chunk_start..end));
        }
    }

    ranges
}

/// Fallback for a chunk left with open blocks or parentheses: every `;` ends a statement.
fn split_on_semicolons(tokens: &[Token], range: Range<usize>) -> Vec<Range<usize>> {
    let mut ranges = vec![];
    let mut chunk_start = range.start;
    for idx in range.clone() {
        if tokens[idx].kind == TokenType::Semicolon {
            if idx > chunk_start {
                ranges.push(chunk_start..idx);
            }
            chunk_start = idx + 1;
        }
    }
    if chunk_start < range.end {
        ranges.push(chunk_start..range.end);
    }
    ranges
}

/// Index (relative to `tokens`) of the first token found at the top level that satisfies
/// `pred`. Used to find the end of block bodies (`END`, `ELSE`, `EXCEPTION`, ...).
pub(crate) fn find_top_level<F>(tokens: &[Token], dialect: Dialect, pred: F) -> Option<usize>
where
    F: Fn(&[Token], usize) -> bool,
{
    let mut tracker = BlockTracker::new(dialect);
    let mut idx = 0;
    while idx < tokens.len() && tokens[idx].kind != TokenType::Eof {
        if tracker.at_top_level() && pred(tokens, idx) {
            return Some(idx);
        }
        idx += tracker.feed(tokens, idx);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn split(sql: &str, dialect: Dialect) -> Vec<String> {
        let mut scanner = Scanner::new(sql, dialect);
        scanner.scan();
        let tokens = scanner.tokens();
        split_statements(tokens, dialect)
            .into_iter()
            .map(|range| {
                tokens[range]
                    .iter()
                    .map(|tok| tok.lexeme.clone())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    #[test]
    fn splits_on_top_level_semicolons() {
        let statements = split("SELECT 1; ;SELECT (2);", Dialect::Ansi);
        assert_eq!(statements, vec!["SELECT 1", "SELECT ( 2 )"]);
    }

    #[test]
    fn keeps_procedural_blocks_together() {
        let sql = "BEGIN\n  IF x > 1 THEN\n    SELECT CASE WHEN a THEN 1 END;\n  END IF;\n\
                   \x20 INSERT INTO t SELECT 1;\nEND;\nSELECT 2";
        let statements = split(sql, Dialect::Postgres);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("BEGIN"));
        assert!(statements[0].ends_with("END"));
        assert_eq!(statements[1], "SELECT 2");
    }

    #[test]
    fn transaction_begin_is_not_a_block() {
        let statements = split("BEGIN TRANSACTION; SELECT 1; COMMIT;", Dialect::Ansi);
        assert_eq!(statements, vec!["BEGIN TRANSACTION", "SELECT 1", "COMMIT"]);
    }

    #[test]
    fn resplits_unbalanced_blocks() {
        let statements = split("BEGIN SELECT 1; SELECT 2;", Dialect::Ansi);
        assert_eq!(statements, vec!["BEGIN SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn ddl_if_does_not_open_a_block() {
        let statements = split(
            "DROP TABLE IF EXISTS a; CREATE TABLE IF NOT EXISTS b (x INT);",
            Dialect::Postgres,
        );
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn resplits_unclosed_parentheses() {
        let statements = split(
            "INSERT INTO t SELECT a FROM s WHERE broken ((;\n\
             INSERT INTO fact_t2 SELECT b FROM stg_s2;",
            Dialect::Ansi,
        );
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1], "INSERT INTO fact_t2 SELECT b FROM stg_s2");
    }
}
