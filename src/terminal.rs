// CORESWEEP TERMINAL ECHO GUARD
// TURNS STDIN ECHO OFF WHILE THE STATUS TABLE IS REDRAWN, SO STRAY
// KEYSTROKES DON'T SCRAMBLE IT. THE PRIOR MODE COMES BACK ON DROP: NORMAL
// RETURN, EARLY ? RETURN, PANIC UNWIND, OR CTRL-C (THE HANDLER ONLY SETS A
// FLAG; THE LOOP RETURNS NORMALLY).
// NOT A TTY -> NO-OP.

pub struct EchoGuard {
    fd: libc::c_int,
    saved: Option<libc::termios>,
}

impl EchoGuard {
    pub fn disable_echo() -> Self {
        Self::disable_echo_on(libc::STDIN_FILENO)
    }

    pub fn disable_echo_on(fd: libc::c_int) -> Self {
        let saved = unsafe {
            if libc::isatty(fd) != 1 {
                None
            } else {
                let mut attrs: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(fd, &mut attrs) != 0 {
                    None
                } else {
                    let mut quiet = attrs;
                    quiet.c_lflag &= !libc::ECHO;
                    if libc::tcsetattr(fd, libc::TCSANOW, &quiet) != 0 {
                        None
                    } else {
                        Some(attrs)
                    }
                }
            }
        };
        if saved.is_none() {
            log_debug!("FD {} IS NOT A TERMINAL, ECHO LEFT ALONE", fd);
        }
        Self { fd, saved }
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(attrs) = self.saved.take() {
            unsafe {
                libc::tcsetattr(self.fd, libc::TCSANOW, &attrs);
            }
        }
    }
}

pub fn stdout_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDOUT_FILENO) == 1 }
}
