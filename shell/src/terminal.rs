use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::io::{self, IsTerminal};

/// Keeps the controlling terminal in raw mode while alive.
///
/// Raw here means: no echo, no line buffering, no signal keys, and reads
/// return as soon as one byte is available. The previous settings are
/// restored on drop.
pub struct RawModeGuard {
    saved: Termios,
}

impl RawModeGuard {
    /// Switches stdin to raw mode. Returns `None` when stdin is not a terminal,
    /// in which case input is read as-is.
    pub fn enable() -> io::Result<Option<Self>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(None);
        }

        let saved = termios::tcgetattr(&stdin)?;
        let mut raw = saved.clone();
        raw.local_flags
            .remove(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;
        log::trace!("terminal switched to raw mode");
        Ok(Some(Self { saved }))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &self.saved) {
            log::warn!("failed to restore terminal settings: {err}");
        }
    }
}
