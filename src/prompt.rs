use anyhow::{Result, anyhow};
use std::io::{self, Write};

pub fn prompt_string(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    Ok(s)
}

pub fn prompt_password_hidden(prompt: &str) -> Result<String> {
    let pw = rpassword::prompt_password(prompt)?;
    Ok(pw)
}

/// Начальный hotp-счётчик; пустой ввод означает 0.
pub fn prompt_counter(prompt: &str) -> Result<u64> {
    let s = prompt_string(prompt)?;
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<u64>()
        .map_err(|_| anyhow!("counter must be a non-negative integer"))
}
