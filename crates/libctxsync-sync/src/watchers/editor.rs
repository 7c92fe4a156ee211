use std::future::Future;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::Watcher;
use crate::event::SyncEvent;

/// Reported when the foreground application cannot be determined
pub const UNKNOWN_APP: &str = "unknown";

/// Asks the OS which application is in the foreground
pub trait ProcessProbe: Send + Sync + 'static {
    /// Name of the foreground application, or [`UNKNOWN_APP`]
    fn foreground_app(&self) -> impl Future<Output = String> + Send;
}

/// Probe backed by an external command whose stdout is the app name
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// The usual foreground-window query for this platform
    pub fn platform_default(timeout: Duration) -> Self {
        if cfg!(target_os = "macos") {
            Self::new(
                "osascript",
                vec![
                    "-e".into(),
                    "tell application \"System Events\" to get name of first application process whose frontmost is true".into(),
                ],
                timeout,
            )
        } else if cfg!(target_os = "windows") {
            Self::new(
                "powershell",
                vec![
                    "-NoProfile".into(),
                    "-Command".into(),
                    "(Get-Process | Where-Object { $_.MainWindowHandle -eq (Add-Type -MemberDefinition '[DllImport(\"user32.dll\")] public static extern IntPtr GetForegroundWindow();' -Name W -PassThru)::GetForegroundWindow() }).ProcessName".into(),
                ],
                timeout,
            )
        } else {
            // Process name of the active window; titles name open files
            Self::new(
                "sh",
                vec![
                    "-c".into(),
                    "cat /proc/\"$(xdotool getactivewindow getwindowpid)\"/comm".into(),
                ],
                timeout,
            )
        }
    }
}

impl ProcessProbe for CommandProbe {
    async fn foreground_app(&self) -> String {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if name.is_empty() {
                    UNKNOWN_APP.to_string()
                } else {
                    name
                }
            }
            Ok(Ok(out)) => {
                debug!(program = %self.program, status = %out.status, "foreground probe failed");
                UNKNOWN_APP.to_string()
            }
            Ok(Err(e)) => {
                debug!(program = %self.program, error = %e, "foreground probe failed");
                UNKNOWN_APP.to_string()
            }
            Err(_) => {
                debug!(program = %self.program, "foreground probe timed out");
                UNKNOWN_APP.to_string()
            }
        }
    }
}

/// Known editors, matched as whole words of the lowercased app name in order
const EDITORS: &[(&str, &str)] = &[
    ("cursor", "cursor"),
    ("windsurf", "windsurf"),
    ("android studio", "android-studio"),
    ("xcode", "xcode"),
    ("visual studio code", "vscode"),
    ("vscodium", "vscode"),
    ("code", "vscode"),
    ("zed", "zed"),
    ("intellij", "intellij"),
    ("idea", "intellij"),
    ("pycharm", "pycharm"),
    ("webstorm", "webstorm"),
    ("goland", "goland"),
    ("rustrover", "rustrover"),
    ("clion", "clion"),
    ("sublime", "sublime"),
    ("nvim", "neovim"),
    ("neovim", "neovim"),
    ("vim", "vim"),
    ("emacs", "emacs"),
    ("helix", "helix"),
];

/// Map a foreground application name to a known editor
pub fn classify_editor(app: &str) -> Option<&'static str> {
    let app = app.to_lowercase();
    let words: Vec<&str> = app
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '|' | '—'))
        .filter(|w| !w.is_empty())
        .collect();
    EDITORS
        .iter()
        .find(|(needle, _)| {
            let needle: Vec<&str> = needle.split(' ').collect();
            words.windows(needle.len()).any(|w| w == needle.as_slice())
        })
        .map(|(_, editor)| *editor)
}

/// Emits when focus moves to, from, or between editors
pub struct EditorSwitchWatcher<P> {
    probe: P,
    period: Duration,
    /// `None` until the first successful probe
    last: Option<Option<&'static str>>,
}

impl<P: ProcessProbe> EditorSwitchWatcher<P> {
    pub fn new(probe: P, period: Duration) -> Self {
        Self {
            probe,
            period,
            last: None,
        }
    }
}

impl<P: ProcessProbe> Watcher for EditorSwitchWatcher<P> {
    fn name(&self) -> &'static str {
        "editor_switch"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn poll(&mut self) -> Option<SyncEvent> {
        let app = self.probe.foreground_app().await;
        if app == UNKNOWN_APP {
            return None;
        }
        let current = classify_editor(&app);
        let previous = self.last.replace(current)?;
        if previous == current {
            return None;
        }
        Some(SyncEvent::editor_switch(
            Some(previous.unwrap_or("other").to_string()),
            current.unwrap_or("other"),
        ))
    }
}
