//! ANSI colour helper for the interactive shell, grounded in the original
//! `ShellColor` class: errors in red, warnings in yellow, confirmations in
//! green (§6, §7). No colour crate is in play here — this is a handful of
//! escape codes, same as the source this is grounded on.

const ESCAPE: &str = "\x1b[";
const RESET: &str = "\x1b[0m";

fn wrap(code: &str, text: &str) -> String {
    format!("{ESCAPE}{code}m{text}{RESET}")
}

pub fn red(text: &str) -> String {
    wrap("31", text)
}

pub fn yellow(text: &str) -> String {
    wrap("33", text)
}

pub fn green(text: &str) -> String {
    wrap("32", text)
}

pub fn italic(text: &str) -> String {
    wrap("3", text)
}

pub fn error_line(msg: &str) -> String {
    format!("{} {}", red("[ERR]"), msg)
}

pub fn warning_line(msg: &str) -> String {
    format!("{} {}", yellow("[WARN]"), msg)
}

pub fn ok_line(msg: &str) -> String {
    format!("{} {}", green("[OK]"), msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_with_reset_suffix() {
        let s = red("boom");
        assert!(s.starts_with("\x1b[31m"));
        assert!(s.ends_with(RESET));
        assert!(s.contains("boom"));
    }
}
