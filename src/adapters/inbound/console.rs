//! Console Adapter
//!
//! Line-oriented stand-in for the tray menu: reads commands from a reader
//! (stdin in the binary) and maps them onto the orchestrator handle.

use crate::application::OrchestratorHandle;
use crate::domain::entities::ResolutionState;
use crate::infrastructure::shutdown::ShutdownController;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Re-resolve now
    Refresh,
    /// Switch to the named provider
    Provider(String),
    /// List providers, marking the active one
    Providers,
    /// Print the current state
    Status,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(None);
        };

        let cmd = match verb.to_lowercase().as_str() {
            "refresh" | "r" => Command::Refresh,
            "provider" | "p" => match parts.next() {
                Some(name) => Command::Provider(name.to_string()),
                None => Command::Providers,
            },
            "providers" => Command::Providers,
            "status" | "s" => Command::Status,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(Some(cmd))
    }
}

/// One-line rendering of a state, as the tray tooltip would show it.
pub fn render_state(state: &ResolutionState) -> String {
    let ip = state.current.ip_address.as_deref().unwrap_or("unknown");
    let country = state
        .current
        .country_code
        .as_ref()
        .map(|c| c.as_str())
        .unwrap_or("??");
    let status = if state.current.success { "ok" } else { "degraded" };
    format!(
        "[{}] {} {} via {} ({})",
        state.icon_key(),
        country,
        ip,
        state.active_provider_name,
        status
    )
}

/// Console inbound adapter.
pub struct ConsoleCommands {
    handle: OrchestratorHandle,
}

impl ConsoleCommands {
    pub fn new(handle: OrchestratorHandle) -> Self {
        Self { handle }
    }

    /// Read commands until EOF, `quit`, or shutdown.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run<R>(&self, reader: R, shutdown: ShutdownController) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                return Ok(());
            };

            match Command::parse(&line) {
                Ok(Some(cmd)) => {
                    let output = self.execute(&cmd);
                    if !output.is_empty() {
                        println!("{}", output);
                    }
                    if cmd == Command::Quit {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{} (try: refresh, provider <name>, providers, status, quit)", e),
            }
        }
    }

    /// Apply a command and return the text to show.
    pub fn execute(&self, cmd: &Command) -> String {
        match cmd {
            Command::Refresh => {
                if self.handle.trigger_manual_refresh() {
                    "refreshing".to_string()
                } else {
                    "shutting down".to_string()
                }
            }
            Command::Provider(name) => match self.handle.switch_provider(name) {
                Ok(true) => format!("switched to {}", name),
                Ok(false) => format!("{} already active", name),
                Err(e) => e.to_string(),
            },
            Command::Providers => {
                let active = self.handle.active_provider().unwrap_or_default();
                self.handle
                    .providers()
                    .into_iter()
                    .map(|name| {
                        let mark = if name == active { "*" } else { " " };
                        format!("{} {}", mark, name)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Command::Status => render_state(&self.handle.state()),
            Command::Quit => {
                self.handle.shutdown();
                String::new()
            }
        }
    }
}
