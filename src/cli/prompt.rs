use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead, IsTerminal, Write};

#[derive(Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Submit,
    Abort,
}

/// Apply one key press to the hidden input buffer.
pub fn apply_key(buffer: &mut String, key: KeyEvent) -> KeyOutcome {
    if key.kind == KeyEventKind::Release {
        return KeyOutcome::Continue;
    }

    match key.code {
        KeyCode::Enter => KeyOutcome::Submit,
        KeyCode::Esc => KeyOutcome::Abort,
        KeyCode::Char('c') | KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            KeyOutcome::Abort
        }
        KeyCode::Backspace => {
            buffer.pop();
            KeyOutcome::Continue
        }
        KeyCode::Char(c) => {
            buffer.push(c);
            KeyOutcome::Continue
        }
        _ => KeyOutcome::Continue,
    }
}

/// Read a password without echoing it. Piped input is read as a plain line.
///
/// `Ok(None)` when the user aborts with Esc, Ctrl-C or Ctrl-D.
pub fn read_hidden(prompt: &str) -> io::Result<Option<String>> {
    if !io::stdin().is_terminal() {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        return Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()));
    }

    print!("{}", prompt);
    io::stdout().flush()?;

    terminal::enable_raw_mode()?;
    let result = read_keys();
    terminal::disable_raw_mode()?;
    println!();

    result
}

fn read_keys() -> io::Result<Option<String>> {
    let mut buffer = String::new();
    loop {
        if let Event::Key(key) = event::read()? {
            match apply_key(&mut buffer, key) {
                KeyOutcome::Continue => {}
                KeyOutcome::Submit => return Ok(Some(buffer)),
                KeyOutcome::Abort => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_typing_and_backspace_build_the_password() {
        let mut buffer = String::new();
        for c in "s3cx".chars() {
            assert_eq!(apply_key(&mut buffer, press(KeyCode::Char(c))), KeyOutcome::Continue);
        }
        apply_key(&mut buffer, press(KeyCode::Backspace));
        apply_key(&mut buffer, press(KeyCode::Char('r')));

        assert_eq!(apply_key(&mut buffer, press(KeyCode::Enter)), KeyOutcome::Submit);
        assert_eq!(buffer, "s3cr");
    }

    #[test]
    fn test_ctrl_c_and_esc_abort() {
        let mut buffer = String::new();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);

        assert_eq!(apply_key(&mut buffer, ctrl_c), KeyOutcome::Abort);
        assert_eq!(apply_key(&mut buffer, press(KeyCode::Esc)), KeyOutcome::Abort);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut buffer = String::new();
        let mut release = press(KeyCode::Char('x'));
        release.kind = KeyEventKind::Release;

        assert_eq!(apply_key(&mut buffer, release), KeyOutcome::Continue);
        assert!(buffer.is_empty());
    }
}
