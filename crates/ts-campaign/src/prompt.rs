//! Interactive password entry on the controlling terminal.

use std::io::{self, BufRead, IsTerminal, Write};

/// Restores the saved terminal mode when dropped, even if reading fails.
struct EchoGuard {
    fd: libc::c_int,
    saved: libc::termios,
}

impl EchoGuard {
    fn disable(fd: libc::c_int) -> io::Result<Self> {
        let mut term = std::mem::MaybeUninit::<libc::termios>::uninit();
        // SAFETY: `term` is a valid out pointer and tcgetattr fully
        // initializes it on success.
        if unsafe { libc::tcgetattr(fd, term.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: initialized by the successful tcgetattr above.
        let saved = unsafe { term.assume_init() };

        let mut silent = saved;
        silent.c_lflag &= !libc::ECHO;
        silent.c_lflag |= libc::ECHONL;
        // SAFETY: `silent` is a valid termios copied from the current mode.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &silent) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, saved })
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        // SAFETY: restores the mode read in `disable`.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved) } != 0 {
            tracing::warn!(error = %io::Error::last_os_error(), "cannot restore terminal echo");
        }
    }
}

/// Prints `prompt` on stderr and reads one line from stdin without echo.
///
/// When stdin is not a terminal nothing is asked and an empty password is
/// returned.
pub fn read_password(prompt: &str) -> io::Result<String> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(String::new());
    }

    let mut stderr = io::stderr();
    stderr.write_all(prompt.as_bytes())?;
    stderr.flush()?;

    let _echo = EchoGuard::disable(libc::STDIN_FILENO)?;
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
