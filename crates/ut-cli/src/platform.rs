//! Platform observers.
//!
//! Each platform queries the foreground window through command-line helpers
//! rather than FFI. Every helper runs under [`COMMAND_TIMEOUT`] so a hung
//! window server costs one skipped observation, never a stuck poll loop.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use ut_core::{ObserveError, Observation, Observer};

/// Upper bound on a single helper invocation.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(1_500);

const WAIT_STEP: Duration = Duration::from_millis(10);

/// The observer for the platform this binary was built for.
pub fn default_observer() -> Box<dyn Observer> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::X11Observer::new(COMMAND_TIMEOUT))
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacObserver::new(COMMAND_TIMEOUT))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        tracing::warn!("no window observer for this platform, nothing will be tracked");
        Box::new(NullObserver)
    }
}

/// Observer that never sees a window.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn poll(&mut self) -> Result<Option<Observation>, ObserveError> {
        Ok(None)
    }
}

/// Runs `program` and returns its stdout without the trailing newline.
///
/// A non-zero exit is [`ObserveError::Command`]; a program that cannot be
/// started is [`ObserveError::Io`]. The child is killed once `timeout` passes.
pub fn run_command(
    program: &'static str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, ObserveError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            let mut stdout = String::new();
            if let Some(mut pipe) = child.stdout.take() {
                pipe.read_to_string(&mut stdout)?;
            }
            if status.success() {
                return Ok(stdout.trim_end_matches(['\n', '\r']).to_string());
            }
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                pipe.read_to_string(&mut stderr)?;
            }
            return Err(ObserveError::Command {
                program,
                message: format!("{status}: {}", stderr.trim()),
            });
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ObserveError::Timeout { program, timeout });
        }
        thread::sleep(WAIT_STEP);
    }
}

fn parse_number(program: &'static str, output: &str) -> Result<u64, ObserveError> {
    output.trim().parse().map_err(|_| ObserveError::Parse {
        program,
        output: output.to_string(),
    })
}

/// Extracts `HIDIdleTime` (nanoseconds) from `ioreg -c IOHIDSystem` output.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_hid_idle(output: &str) -> Option<Duration> {
    output
        .lines()
        .find(|line| line.contains("\"HIDIdleTime\""))
        .and_then(|line| line.rsplit('=').next())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_nanos)
}

/// Frontmost process as printed by the AppleScript query.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
#[derive(Debug, PartialEq, Eq)]
struct Frontmost {
    app_name: String,
    pid: u64,
    title: String,
}

/// Parses `name`, `pid` and `title` lines; the title may be empty or absent.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_frontmost(output: &str) -> Result<Frontmost, ObserveError> {
    let mut lines = output.splitn(3, '\n');
    let app_name = lines.next().unwrap_or_default().trim();
    let pid = lines.next().unwrap_or_default();
    if app_name.is_empty() {
        return Err(ObserveError::Parse {
            program: "osascript",
            output: output.to_string(),
        });
    }
    Ok(Frontmost {
        app_name: app_name.to_string(),
        pid: parse_number("osascript", pid)?,
        title: lines.next().unwrap_or_default().trim().to_string(),
    })
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use tracing::debug;
    use ut_core::{ObserveError, Observation, Observer, WindowHandle};

    use super::{parse_number, run_command};

    /// X11 observer built on `xdotool` and `xprintidle`.
    #[derive(Debug)]
    pub struct X11Observer {
        timeout: Duration,
    }

    impl X11Observer {
        pub const fn new(timeout: Duration) -> Self {
            Self { timeout }
        }

        fn idle(&self) -> Duration {
            match run_command("xprintidle", &[], self.timeout)
                .and_then(|output| parse_number("xprintidle", &output))
            {
                Ok(ms) => Duration::from_millis(ms),
                Err(err) => {
                    debug!(error = %err, "idle time unavailable, assuming active");
                    Duration::ZERO
                }
            }
        }
    }

    impl Observer for X11Observer {
        fn poll(&mut self) -> Result<Option<Observation>, ObserveError> {
            let window = match run_command("xdotool", &["getactivewindow"], self.timeout) {
                Ok(output) => parse_number("xdotool", &output)?,
                // No focused window, e.g. the bare desktop.
                Err(ObserveError::Command { .. }) => return Ok(None),
                Err(err) => return Err(err),
            };
            let id = window.to_string();

            let title =
                run_command("xdotool", &["getwindowname", &id], self.timeout).unwrap_or_default();
            let pid = run_command("xdotool", &["getwindowpid", &id], self.timeout)
                .ok()
                .and_then(|output| output.trim().parse::<u32>().ok());
            let (app_name, exe_name) = match pid {
                Some(pid) => process_names(pid)?,
                None => ("unknown".to_string(), String::new()),
            };

            Ok(Some(Observation::new(
                WindowHandle::new(window),
                app_name,
                exe_name,
                title,
                self.idle(),
            )))
        }
    }

    /// `(comm, executable file name)` of a process.
    fn process_names(pid: u32) -> Result<(String, String), ObserveError> {
        let proc_dir = Path::new("/proc").join(pid.to_string());
        let comm = fs::read_to_string(proc_dir.join("comm"))?.trim().to_string();
        let exe = fs::read_link(proc_dir.join("exe"))
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_else(|| comm.clone());
        Ok((comm, exe))
    }

}

#[cfg(target_os = "macos")]
mod macos {
    use std::time::Duration;

    use tracing::debug;
    use ut_core::{ObserveError, Observation, Observer, WindowHandle};

    use super::{parse_frontmost, parse_hid_idle, run_command};

    const FRONTMOST_SCRIPT: &str = r#"
tell application "System Events"
    set frontApp to first application process whose frontmost is true
    set appName to name of frontApp
    set appPid to unix id of frontApp
    set winTitle to ""
    try
        set winTitle to name of front window of frontApp
    end try
end tell
return appName & linefeed & appPid & linefeed & winTitle
"#;

    /// macOS observer built on `osascript`, `ps` and `ioreg`.
    ///
    /// The frontmost process id is the window handle, so switching windows
    /// inside one application is not an app switch.
    #[derive(Debug)]
    pub struct MacObserver {
        timeout: Duration,
    }

    impl MacObserver {
        pub const fn new(timeout: Duration) -> Self {
            Self { timeout }
        }

        fn idle(&self) -> Duration {
            let output = run_command("ioreg", &["-c", "IOHIDSystem", "-d", "4"], self.timeout);
            match output.map(|output| parse_hid_idle(&output)) {
                Ok(Some(idle)) => idle,
                Ok(None) => Duration::ZERO,
                Err(err) => {
                    debug!(error = %err, "idle time unavailable, assuming active");
                    Duration::ZERO
                }
            }
        }
    }

    impl Observer for MacObserver {
        fn poll(&mut self) -> Result<Option<Observation>, ObserveError> {
            let output = match run_command("osascript", &["-e", FRONTMOST_SCRIPT], self.timeout) {
                Ok(output) => output,
                // Accessibility permission missing or no frontmost process.
                Err(ObserveError::Command { .. }) => return Ok(None),
                Err(err) => return Err(err),
            };
            let front = parse_frontmost(&output)?;

            let pid = front.pid.to_string();
            let exe_name = run_command("ps", &["-p", &pid, "-o", "comm="], self.timeout)
                .ok()
                .and_then(|path| path.rsplit('/').next().map(str::to_string))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| front.app_name.clone());

            Ok(Some(Observation::new(
                WindowHandle::new(front.pid),
                front.app_name,
                exe_name,
                front.title,
                self.idle(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_observer_sees_nothing() {
        assert!(NullObserver.poll().unwrap().is_none());
    }

    #[test]
    fn parses_hid_idle_nanoseconds() {
        let output = r#"
    | |   "HIDIdleTime" = 2500000000
    | |   "HIDPointerAcceleration" = 45056
"#;
        assert_eq!(parse_hid_idle(output), Some(Duration::from_millis(2_500)));
        assert_eq!(parse_hid_idle("\"Other\" = 1"), None);
    }

    #[test]
    fn parses_frontmost_with_and_without_title() {
        let front = parse_frontmost("Safari\n512\nApple - Start Page").unwrap();
        assert_eq!(
            front,
            Frontmost {
                app_name: "Safari".to_string(),
                pid: 512,
                title: "Apple - Start Page".to_string(),
            }
        );

        let front = parse_frontmost("Finder\n77\n").unwrap();
        assert_eq!(front.title, "");

        assert!(matches!(
            parse_frontmost("\n12\n"),
            Err(ObserveError::Parse { .. })
        ));
        assert!(matches!(
            parse_frontmost("Finder\nnot-a-pid"),
            Err(ObserveError::Parse { .. })
        ));
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert_eq!(parse_number("xprintidle", "1234\n").unwrap(), 1234);
        assert!(matches!(
            parse_number("xprintidle", "oops"),
            Err(ObserveError::Parse {
                program: "xprintidle",
                ..
            })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn run_command_returns_trimmed_stdout() {
        let output = run_command("sh", &["-c", "printf 'hello\\n'"], COMMAND_TIMEOUT).unwrap();
        assert_eq!(output, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn run_command_reports_failure_exit() {
        let err = run_command("sh", &["-c", "echo boom >&2; exit 3"], COMMAND_TIMEOUT).unwrap_err();
        match err {
            ObserveError::Command { program, message } => {
                assert_eq!(program, "sh");
                assert!(message.contains("boom"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn run_command_kills_slow_programs() {
        let started = Instant::now();
        let err = run_command("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ObserveError::Timeout { program: "sleep", .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn run_command_reports_missing_program() {
        let err = run_command("ut-no-such-helper", &[], COMMAND_TIMEOUT).unwrap_err();
        assert!(matches!(err, ObserveError::Io(_)));
    }
}
