//! Password strength scoring.
//!
//! Advisory only: nothing in the library refuses a weak password.

use serde::Serialize;

pub const MIN_LENGTH: usize = 12;

const SPECIALS: &str = "!@#$%^&*()_+-=[]{};:\"\\|,.<>/?";
const COMMON_PATTERNS: &[&str] = &[
    "123", "abc", "qwerty", "password", "lösenord", "admin", "user", "test",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthLabel {
    Weak,
    Fair,
    Good,
    Strong,
    VeryStrong,
}

impl StrengthLabel {
    fn from_score(score: u8) -> Self {
        match score {
            0..=29 => StrengthLabel::Weak,
            30..=49 => StrengthLabel::Fair,
            50..=69 => StrengthLabel::Good,
            70..=89 => StrengthLabel::Strong,
            _ => StrengthLabel::VeryStrong,
        }
    }
}

impl std::fmt::Display for StrengthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StrengthLabel::Weak => "weak",
            StrengthLabel::Fair => "fair",
            StrengthLabel::Good => "good",
            StrengthLabel::Strong => "strong",
            StrengthLabel::VeryStrong => "very strong",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Strength {
    /// 0 to 100.
    pub score: u8,
    pub label: StrengthLabel,
    /// Human readable shortcomings; empty when the password passes every rule.
    pub issues: Vec<String>,
}

impl Strength {
    pub fn is_acceptable(&self) -> bool {
        self.issues.is_empty()
    }
}

fn has_run_of_three(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

pub fn check(password: &str) -> Strength {
    let mut issues = Vec::new();

    let length = password.chars().count();
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIALS.contains(c));

    if length < MIN_LENGTH {
        issues.push(format!("use at least {MIN_LENGTH} characters"));
    }
    if !has_upper {
        issues.push("add an uppercase letter".to_string());
    }
    if !has_lower {
        issues.push("add a lowercase letter".to_string());
    }
    if !has_digit {
        issues.push("add a digit".to_string());
    }
    if !has_special {
        issues.push("add a special character".to_string());
    }

    let lowered = password.to_lowercase();
    if let Some(pattern) = COMMON_PATTERNS.iter().find(|p| lowered.contains(*p)) {
        issues.push(format!("avoid common patterns ({pattern})"));
    }
    if has_run_of_three(password) {
        issues.push("avoid repeated characters (aaa, 111)".to_string());
    }

    let mut score = (length * 2).min(30);
    score += if has_lower { 10 } else { 0 };
    score += if has_upper { 10 } else { 0 };
    score += if has_digit { 10 } else { 0 };
    score += if has_special { 15 } else { 0 };

    let mut unique: Vec<char> = password.chars().collect();
    unique.sort_unstable();
    unique.dedup();
    score += (unique.len() * 2).min(25);

    let score = score.min(100) as u8;

    Strength {
        score,
        label: StrengthLabel::from_score(score),
        issues,
    }
}
