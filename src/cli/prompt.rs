//! Interactive prompt helpers

use crate::error::Result;
use std::io::{self, BufRead, Write};

/// Print `message` and read one trimmed line from stdin
pub fn ask(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", message)?;
    write!(stdout, "> ")?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Yes/no question; an empty answer takes the default
pub fn ask_yes_no(message: &str, default_yes: bool) -> Result<bool> {
    let hint = if default_yes { "(Y/n)" } else { "(y/N)" };
    loop {
        let mut stdout = io::stdout();
        write!(stdout, "{} {} ", message, hint)?;
        stdout.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        match line.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default_yes),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}
