//! Pulling one executable statement out of a model response.

/// Statement keywords a synthesized query may start with.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "EXPLAIN", "PRAGMA", "SHOW", "DESCRIBE", "INSERT", "UPDATE", "DELETE",
    "REPLACE", "CREATE", "ALTER", "DROP",
];

/// Statements allowed while writes are disabled.
const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "PRAGMA", "SHOW", "DESCRIBE"];

/// Keywords that make a statement writing no matter where they appear, e.g. a
/// data-modifying CTE or `SELECT ... INTO`.
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "INTO", "CREATE", "DROP", "ALTER",
    "TRUNCATE", "RENAME", "GRANT", "REVOKE", "ATTACH", "DETACH", "VACUUM", "REINDEX", "COPY",
    "CALL", "LOCK",
];

/// Turns raw completion text into a single statement, or `None` if there is none.
pub trait QueryExtractor: Send + Sync {
    fn extract(&self, response: &str) -> Option<String>;
}

/// Strips a Markdown code fence, skips any prose before the first line that opens
/// with a statement keyword, and cuts at the first `;` outside quotes and comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct FencedSqlExtractor;

impl QueryExtractor for FencedSqlExtractor {
    fn extract(&self, response: &str) -> Option<String> {
        let body = strip_fence(response.trim());
        let lines: Vec<&str> = body.lines().collect();
        let start = lines
            .iter()
            .position(|line| starts_with_keyword(line, STATEMENT_KEYWORDS))?;
        let statement = lines[start..].join("\n");
        let statement = match scan(&statement).terminator {
            Some(end) => &statement[..end],
            None => statement.as_str(),
        }
        .trim();
        if statement.is_empty() {
            None
        } else {
            Some(statement.to_owned())
        }
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // skip the language tag line
    let body = after_open
        .find('\n')
        .map_or("", |nl| &after_open[nl + 1..]);
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn first_word(line: &str) -> String {
    line.trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

fn starts_with_keyword(line: &str, keywords: &[&str]) -> bool {
    let word = first_word(line);
    keywords.contains(&word.as_str())
}

/// Bare SQL words (uppercased) with quoted spans and comments removed.
#[derive(Debug, Default)]
struct Scan {
    words: Vec<String>,
    /// Byte offset of the first statement-terminating `;`.
    terminator: Option<usize>,
    /// Whether a bare `=` appears, which turns a `PRAGMA` into an assignment.
    assigns: bool,
}

fn push_word(word: &mut String, words: &mut Vec<String>) {
    if !word.is_empty() {
        words.push(std::mem::take(word));
    }
}

fn scan(sql: &str) -> Scan {
    let mut out = Scan::default();
    let mut word = String::new();
    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                push_word(&mut word, &mut out.words);
                // a doubled quote closes and reopens, which lands in the same state
                for (_, d) in chars.by_ref() {
                    if d == c {
                        break;
                    }
                }
            }
            '-' if chars.peek().is_some_and(|&(_, d)| d == '-') => {
                push_word(&mut word, &mut out.words);
                for (_, d) in chars.by_ref() {
                    if d == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek().is_some_and(|&(_, d)| d == '*') => {
                push_word(&mut word, &mut out.words);
                chars.next();
                let mut prev = ' ';
                for (_, d) in chars.by_ref() {
                    if prev == '*' && d == '/' {
                        break;
                    }
                    prev = d;
                }
            }
            ';' => {
                push_word(&mut word, &mut out.words);
                out.terminator.get_or_insert(i);
            }
            '=' => {
                push_word(&mut word, &mut out.words);
                out.assigns = true;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => word.push(c.to_ascii_uppercase()),
            _ => push_word(&mut word, &mut out.words),
        }
    }
    push_word(&mut word, &mut out.words);
    out
}

/// True when nothing in the statement can modify data: it opens with a read
/// keyword, contains no write keyword outside quotes and comments, is not a
/// `PRAGMA` assignment, and does not chain a second statement.
#[must_use]
pub fn is_read_only(statement: &str) -> bool {
    let scanned = scan(statement);
    let Some(first) = scanned.words.first() else {
        return false;
    };
    if !READ_ONLY_KEYWORDS.contains(&first.as_str()) {
        return false;
    }
    if first == "PRAGMA" && scanned.assigns {
        return false;
    }
    if let Some(end) = scanned.terminator
        && !scan(&statement[end + 1..]).words.is_empty()
    {
        return false;
    }
    !scanned
        .words
        .iter()
        .any(|w| WRITE_KEYWORDS.contains(&w.as_str()))
}
