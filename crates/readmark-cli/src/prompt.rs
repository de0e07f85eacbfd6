//! Interactive confirmation

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;

/// Prompt for confirmation
///
/// Returns true if user confirms, false otherwise.
/// In non-interactive mode (no TTY), returns false.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(is_yes(&input))
}

fn is_yes(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    input == "y" || input == "yes"
}
