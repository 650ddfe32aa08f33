//! Fixed token vocabulary of the intent language.

pub const KW_INTENT: &str = "INTENT";
pub const KW_OBJECTIVE: &str = "OBJECTIVE";
pub const KW_CONSTRAINT: &str = "CONSTRAINT";
pub const KW_CAPABILITY: &str = "CAPABILITY";
pub const KW_TIME: &str = "TIME";
pub const KW_AUTHORITY: &str = "AUTHORITY";
pub const KW_TRUST: &str = "TRUST";
pub const KW_HARDWARE: &str = "HARDWARE";
pub const KW_ONLY: &str = "ONLY";
pub const KW_NOT: &str = "NOT";
pub const KW_AND: &str = "AND";

pub const KEYWORDS: [&str; 11] = [
    KW_INTENT,
    KW_OBJECTIVE,
    KW_CONSTRAINT,
    KW_CAPABILITY,
    KW_TIME,
    KW_AUTHORITY,
    KW_TRUST,
    KW_HARDWARE,
    KW_ONLY,
    KW_NOT,
    KW_AND,
];

pub const CLUSTER_TOKENS: [&str; 7] = ["GB200", "MI300X", "QPU", "IPU", "GAUDI3", "CPU", "CEREBRAS"];

/// Two-character operators come first so the lexer matches greedily.
pub const COMPARISON_OPERATORS: [&str; 6] = [">=", "<=", "==", "!=", ">", "<"];

pub const TIME_KEYS: [&str; 3] = ["deadline", "budget", "window"];

pub const TIME_UNITS: [&str; 4] = ["s", "ms", "m", "h"];

pub const AUTHORITY_KEYS: [&str; 3] = ["user", "group", "role"];

pub const TRUST_LEVELS: [&str; 4] = ["verified", "trusted", "untrusted", "sandbox"];

/// The literal word between `TRUST` and its colon.
pub const TRUST_LEVEL_LABEL: &str = "level";

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Keywords that open a statement inside an intent body.
pub fn is_statement_keyword(word: &str) -> bool {
    matches!(
        word,
        KW_OBJECTIVE | KW_CONSTRAINT | KW_CAPABILITY | KW_TIME | KW_AUTHORITY | KW_TRUST | KW_HARDWARE
    )
}
