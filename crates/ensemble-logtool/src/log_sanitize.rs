const MAX_LOG_CHARS: usize = 2048;

#[derive(Clone, Copy)]
enum Escape {
    Start,
    Csi,
    Osc,
    OscEsc,
}

/// Flatten harness output into one printable line for a log message.
///
/// Terminal escape sequences and control characters are dropped, tabs and
/// line breaks become single spaces, and anything past `MAX_LOG_CHARS` is cut.
pub fn sanitize_log_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LOG_CHARS));
    let mut escape = None::<Escape>;
    let mut count = 0usize;
    let mut last_space = false;

    for c in input.chars() {
        if let Some(state) = escape {
            escape = match (state, c) {
                (Escape::Start, '[') => Some(Escape::Csi),
                (Escape::Start, ']') => Some(Escape::Osc),
                (Escape::Start, _) => None,
                (Escape::Csi, '@'..='~') => None,
                (Escape::Csi, _) => Some(Escape::Csi),
                (Escape::Osc, '\x07') => None,
                (Escape::Osc, '\x1b') => Some(Escape::OscEsc),
                (Escape::Osc, _) => Some(Escape::Osc),
                (Escape::OscEsc, '\\') => None,
                (Escape::OscEsc, _) => Some(Escape::Osc),
            };
            continue;
        }
        if c == '\x1b' {
            escape = Some(Escape::Start);
            continue;
        }
        let c = match c {
            '\t' | '\n' | '\r' => ' ',
            c if c.is_control() => continue,
            c => c,
        };
        if c == ' ' {
            if last_space {
                continue;
            }
            last_space = true;
        } else {
            last_space = false;
        }
        if count == MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            return out;
        }
        out.push(c);
        count += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_escapes_and_folds_whitespace() {
        let got = sanitize_log_line("ok \u{1b}[31mred\u{1b}[0m\n\n\t<Test \u{1b}]0;t\u{7}/>");
        assert_eq!(got, "ok red <Test />");
    }

    #[test]
    fn long_output_is_truncated() {
        let got = sanitize_log_line(&"x".repeat(MAX_LOG_CHARS + 10));
        assert!(got.ends_with(" ...[truncated]"));
        assert_eq!(got.chars().filter(|c| *c == 'x').count(), MAX_LOG_CHARS);
    }
}
