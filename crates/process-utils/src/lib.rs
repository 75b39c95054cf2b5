//! Process spawning helpers shared by the service and the counting filter.

#[cfg(feature = "tokio")]
use std::ffi::OsStr;

#[cfg(all(windows, feature = "tokio"))]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
#[cfg(feature = "tokio")]
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` for a program with `CREATE_NO_WINDOW`
/// applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Shell used by [`tokio_shell`].
#[cfg(windows)]
pub const SHELL: &str = "cmd";
/// Shell used by [`tokio_shell`].
#[cfg(not(windows))]
pub const SHELL: &str = "bash";

/// Create a `tokio::process::Command` that runs `script` through the platform shell.
///
/// `bash -o pipefail -c` on Unix, so a pipeline fails when any of its members
/// fails, not only the last one. `cmd /C` on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_shell(script: &str) -> tokio::process::Command {
    #[cfg(windows)]
    let cmd = {
        let mut c = tokio_command(SHELL);
        c.args(["/C", script]);
        c
    };

    #[cfg(not(windows))]
    let cmd = {
        let mut c = tokio_command(SHELL);
        c.args(["-o", "pipefail", "-c", script]);
        c
    };

    cmd
}

/// Quote a single word for safe interpolation into a POSIX shell script.
///
/// Words made only of characters the shell never interprets are returned
/// unchanged; everything else is wrapped in single quotes with embedded
/// single quotes escaped as `'\''`.
pub fn shell_quote(word: impl AsRef<str>) -> String {
    let word = word.as_ref();
    if !word.is_empty() && word.chars().all(is_shell_safe) {
        return word.to_string();
    }

    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for c in word.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Join words into a shell command line, quoting each as needed.
pub fn shell_join<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ',' | '+' | '=' | '@')
}
