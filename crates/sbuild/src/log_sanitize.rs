//! Cleans command output before it lands in a package log.
//!
//! Build tools love to colorize, draw progress bars and set terminal titles.
//! None of that belongs in a plain-text log, so escape sequences (CSI, OSC and
//! the string-terminated DCS/SOS/PM/APC families) are dropped along with other
//! control characters. Tabs survive.

const MAX_LINE_CHARS: usize = 16 * 1024;

#[derive(Clone, Copy)]
enum State {
    Text,
    Escape,
    Csi,
    Osc,
    OscEscape,
    Str,
    StrEscape,
}

impl State {
    // Returns the next state after consuming `c` inside an escape sequence.
    fn step(self, c: char) -> State {
        match self {
            State::Text => State::Text,
            State::Escape => match c {
                '[' => State::Csi,
                ']' => State::Osc,
                'P' | 'X' | '^' | '_' => State::Str,
                _ => State::Text,
            },
            State::Csi if ('@'..='~').contains(&c) => State::Text,
            State::Csi => State::Csi,
            State::Osc => match c {
                '\x07' => State::Text,
                '\x1b' => State::OscEscape,
                _ => State::Osc,
            },
            State::OscEscape => match c {
                '\\' => State::Text,
                '\x1b' => State::OscEscape,
                _ => State::Osc,
            },
            State::Str if c == '\x1b' => State::StrEscape,
            State::Str => State::Str,
            State::StrEscape => match c {
                '\\' => State::Text,
                '\x1b' => State::StrEscape,
                _ => State::Str,
            },
        }
    }
}

pub fn sanitize_log_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LINE_CHARS));
    let mut state = State::Text;
    let mut kept = 0usize;

    for c in input.chars() {
        if !matches!(state, State::Text) {
            state = state.step(c);
            continue;
        }
        match c {
            '\x1b' => state = State::Escape,
            '\t' => {
                out.push('\t');
                kept += 1;
            }
            c if c.is_control() || is_bidi_control(c) => {}
            c => {
                out.push(c);
                kept += 1;
            }
        }
        if kept >= MAX_LINE_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }

    out
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::sanitize_log_line;

    #[test]
    fn drops_color_codes_from_compiler_output() {
        let input = "\u{1b}[01m\u{1b}[Kmain.c:3:1:\u{1b}[m\u{1b}[K warning";
        assert_eq!(sanitize_log_line(input), "main.c:3:1: warning");
    }

    #[test]
    fn drops_title_and_string_sequences() {
        let input = "a\u{1b}]0;make\u{7}b\u{1b}Ppayload\u{1b}\\c";
        assert_eq!(sanitize_log_line(input), "abc");
    }

    #[test]
    fn keeps_tabs_but_drops_carriage_returns_and_bidi() {
        let input = "CC\tfoo.o\r\u{202e}";
        assert_eq!(sanitize_log_line(input), "CC\tfoo.o");
    }
}
