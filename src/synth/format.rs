use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use tracing::debug;

const BREAK_BEFORE: &[Keyword] = &[
    Keyword::FROM,
    Keyword::WHERE,
    Keyword::GROUP,
    Keyword::ORDER,
    Keyword::HAVING,
    Keyword::LIMIT,
    Keyword::UNION,
    Keyword::JOIN,
    Keyword::LEFT,
    Keyword::RIGHT,
    Keyword::INNER,
    Keyword::FULL,
    Keyword::CROSS,
];

const JOIN_MODIFIERS: &[Keyword] = &[
    Keyword::LEFT,
    Keyword::RIGHT,
    Keyword::INNER,
    Keyword::FULL,
    Keyword::CROSS,
    Keyword::OUTER,
    Keyword::NATURAL,
];

fn keyword_of(token: &Token) -> Option<Keyword> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.keyword),
        _ => None,
    }
}

/// Put each top-level clause on its own line. Subqueries stay inline and
/// literals are emitted exactly as written. Text the tokenizer rejects is
/// returned unchanged.
pub fn format_sql(sql: &str) -> String {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).with_unescape(false).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!("leaving statement unformatted: {}", e);
            return sql.to_string();
        }
    };

    let mut out = String::with_capacity(sql.len() + 16);
    let mut depth = 0usize;
    let mut previous: Option<Keyword> = None;

    for token in &tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }

        if let Some(keyword) = keyword_of(token) {
            let joined = keyword == Keyword::JOIN
                && previous.is_some_and(|p| JOIN_MODIFIERS.contains(&p));
            if depth == 0 && !out.is_empty() && BREAK_BEFORE.contains(&keyword) && !joined {
                let kept = out.trim_end().len();
                out.truncate(kept);
                out.push('\n');
            }
        }

        if matches!(token, Token::Whitespace(Whitespace::Space | Whitespace::Newline | Whitespace::Tab))
            && out.ends_with('\n')
        {
            continue;
        }

        out.push_str(&token.to_string());
        if !matches!(token, Token::Whitespace(_)) {
            previous = keyword_of(token);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clauses_on_separate_lines() {
        let sql = "SELECT first_name, salary FROM employees WHERE salary > (SELECT AVG(salary) FROM employees) ORDER BY salary DESC;";
        assert_eq!(
            format_sql(sql),
            "SELECT first_name, salary\nFROM employees\nWHERE salary > (SELECT AVG(salary) FROM employees)\nORDER BY salary DESC;"
        );
    }

    #[test]
    fn test_join_modifiers_stay_together() {
        let sql = "SELECT e.id FROM employees e LEFT OUTER JOIN departments d ON e.department_id = d.id LIMIT 5;";
        assert_eq!(
            format_sql(sql),
            "SELECT e.id\nFROM employees e\nLEFT OUTER JOIN departments d ON e.department_id = d.id\nLIMIT 5;"
        );
    }

    #[test]
    fn test_literals_untouched() {
        let sql = "SELECT * FROM users WHERE note = 'pick from here' AND name = 'O''Brien';";
        let formatted = format_sql(sql);
        assert!(formatted.contains("'pick from here'"));
        assert!(formatted.contains("'O''Brien'"));
        assert_eq!(formatted.lines().count(), 3);
    }

    #[test]
    fn test_short_statement_unchanged() {
        assert_eq!(format_sql("SELECT 1;"), "SELECT 1;");
    }

    #[test]
    fn test_already_formatted_is_stable() {
        let sql = "SELECT name\nFROM users\nLIMIT 10;";
        assert_eq!(format_sql(sql), sql);
        assert_eq!(format_sql(&format_sql(sql)), sql);
    }

    #[test]
    fn test_unterminated_literal_returned_as_is() {
        let sql = "SELECT * FROM t WHERE a = 'open";
        assert_eq!(format_sql(sql), sql);
    }
}
