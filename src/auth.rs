//! Where the CLI gets vault passwords from.
//!
//! `--password-stdin` wins, then `COFFER_PASSWORD`, then an interactive
//! prompt when stdin is a terminal. Anything else reads one line from stdin.

use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "COFFER_PASSWORD";

enum Source {
    Env(Zeroizing<String>),
    Stdin,
    Terminal,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordInput {
    force_stdin: bool,
}

impl PasswordInput {
    pub fn new(force_stdin: bool) -> Self {
        Self { force_stdin }
    }

    fn source(&self) -> Source {
        if self.force_stdin {
            return Source::Stdin;
        }
        if let Ok(pw) = std::env::var(PASSWORD_ENV)
            && !pw.is_empty()
        {
            return Source::Env(Zeroizing::new(pw));
        }
        if io::stdin().is_terminal() {
            Source::Terminal
        } else {
            Source::Stdin
        }
    }

    /// Password for an existing vault.
    pub fn unlock(&self) -> Result<Zeroizing<String>> {
        let pw = match self.source() {
            Source::Env(pw) => pw,
            Source::Stdin => read_stdin_line()?,
            Source::Terminal => prompt("Vault password: ")?,
        };
        non_empty(pw)
    }

    /// Password for a vault being created.
    ///
    /// Only a typed password is asked for twice; a scripted one is taken as
    /// given.
    pub fn choose(&self) -> Result<Zeroizing<String>> {
        match self.source() {
            Source::Terminal => {
                let first = non_empty(prompt("New vault password: ")?)?;
                let second = prompt("Repeat to confirm: ")?;
                ensure_match(&first, &second)?;
                Ok(first)
            }
            Source::Env(pw) => non_empty(pw),
            Source::Stdin => non_empty(read_stdin_line()?),
        }
    }
}

fn prompt(text: &str) -> Result<Zeroizing<String>> {
    Ok(Zeroizing::new(
        rpassword::prompt_password(text).context("failed to read password from terminal")?,
    ))
}

fn read_stdin_line() -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(strip_line_ending(line))
}

fn strip_line_ending(mut line: Zeroizing<String>) -> Zeroizing<String> {
    let len = line.trim_end_matches(|c| c == '\n' || c == '\r').len();
    line.truncate(len);
    line
}

fn non_empty(pw: Zeroizing<String>) -> Result<Zeroizing<String>> {
    if pw.is_empty() {
        bail!("no password provided");
    }
    Ok(pw)
}

fn ensure_match(first: &str, second: &str) -> Result<()> {
    if first != second {
        bail!("passwords do not match");
    }
    Ok(())
}
