//! Interactive shell channel with prompt-terminated reads
//!
//! Network device CLIs are driven through a single PTY shell: a command is
//! written followed by a newline, and the reply is everything received until
//! the device prints its prompt again. The echoed command line and the
//! trailing prompt are stripped before the output is handed back.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tracing::{debug, trace, warn};

use super::client::ClientHandler;
use super::error::SshError;
use crate::diag::RemoteShell;

/// Wide terminal so devices do not wrap long lines
const PTY_COLS: u32 = 511;
const PTY_ROWS: u32 = 24;

/// Upper bound on a single command's output
const MAX_OUTPUT_SIZE: usize = 16 * 1024 * 1024;

/// Window used to drain stale output before a command is written
const DRAIN_WINDOW: Duration = Duration::from_millis(50);

fn prompt_regex() -> &'static Regex {
    static PROMPT: OnceLock<Regex> = OnceLock::new();
    PROMPT.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.\-@/:~()\[\]]{1,128}[>#$]\s*$").expect("valid prompt regex")
    })
}

/// Whether a (cleaned) line looks like a device CLI prompt
pub fn is_prompt_line(line: &str) -> bool {
    prompt_regex().is_match(line.trim())
}

fn normalize(raw: &str) -> String {
    strip_ansi_escapes::strip_str(raw)
        .replace("\r\n", "\n")
        .replace('\r', "")
}

/// Longest trailing line still checked for a prompt
const MAX_PROMPT_TAIL: usize = 512;

/// Raw bytes of one reply. Decoded once, after the prompt arrives, so
/// multi-byte characters split across packets survive.
#[derive(Debug, Default)]
struct OutputBuffer {
    bytes: Vec<u8>,
}

impl OutputBuffer {
    fn push(&mut self, chunk: &[u8]) -> Result<(), SshError> {
        self.bytes.extend_from_slice(chunk);
        if self.bytes.len() > MAX_OUTPUT_SIZE {
            return Err(SshError::ChannelError(format!(
                "Output exceeded {} bytes",
                MAX_OUTPUT_SIZE
            )));
        }
        Ok(())
    }

    /// Whether the text after the last newline is a prompt
    fn ends_with_prompt(&self) -> bool {
        let start = self
            .bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let tail = &self.bytes[start..];
        if tail.is_empty() || tail.len() > MAX_PROMPT_TAIL {
            return false;
        }
        let tail = normalize(&String::from_utf8_lossy(tail));
        is_prompt_line(tail.rsplit('\n').next().unwrap_or(&tail))
    }

    fn into_text(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// Strip the echoed command and the trailing prompt from raw shell output
pub fn clean_command_output(raw: &str, command: &str) -> String {
    let text = normalize(raw);
    let mut lines: Vec<&str> = text.split('\n').collect();

    // Stale blank lines before the echo
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    if lines
        .first()
        .is_some_and(|l| !command.trim().is_empty() && l.trim_end().ends_with(command.trim()))
    {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| is_prompt_line(l)) {
        lines.pop();
    }

    lines.join("\n").trim_end().to_string()
}

/// PTY shell session on a device
pub struct SshShell {
    handle: Handle<ClientHandler>,
    channel: Channel<Msg>,
    prompt_timeout: Duration,
}

impl SshShell {
    /// Request a PTY shell, wait for the login prompt and run the setup commands
    pub(crate) async fn open(
        handle: Handle<ClientHandler>,
        setup_commands: &[String],
        prompt_timeout: Duration,
    ) -> Result<Self, SshError> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to open session: {}", e)))?;

        channel
            .request_pty(false, "vt100", PTY_COLS, PTY_ROWS, 0, 0, &[])
            .await
            .map_err(|e| SshError::ChannelError(format!("PTY request failed: {}", e)))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::ChannelError(format!("Shell request failed: {}", e)))?;

        let mut shell = Self {
            handle,
            channel,
            prompt_timeout,
        };

        // Login banner / MOTD up to the first prompt
        shell.read_until_prompt(prompt_timeout).await?;

        for command in setup_commands {
            debug!("Session setup: {}", command);
            shell.send_command(command, prompt_timeout).await?;
        }

        Ok(shell)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SshError> {
        let data = format!("{}\n", line);
        self.channel
            .data(data.as_bytes())
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to write to shell: {}", e)))
    }

    /// Discard anything the device printed since the last read
    async fn drain_pending(&mut self) {
        while let Ok(Some(msg)) = tokio::time::timeout(DRAIN_WINDOW, self.channel.wait()).await {
            if let ChannelMsg::Data { data } = msg {
                trace!("Drained {} stale bytes", data.len());
            }
        }
    }

    async fn read_until_prompt(&mut self, limit: Duration) -> Result<String, SshError> {
        let channel = &mut self.channel;
        let mut buffer = OutputBuffer::default();

        let result = tokio::time::timeout(limit, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                        if let Err(e) = buffer.push(&data) {
                            return Err(e);
                        }
                        if buffer.ends_with_prompt() {
                            return Ok(());
                        }
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                        return Err(SshError::Disconnected);
                    }
                    Some(_) => {}
                }
            }
        })
        .await;

        match result {
            Err(_) => Err(SshError::Timeout(format!(
                "No prompt after {} seconds",
                limit.as_secs()
            ))),
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Ok(buffer.into_text()),
        }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn find_prompt(&mut self) -> Result<String, SshError> {
        self.drain_pending().await;
        self.write_line("").await?;
        let raw = self.read_until_prompt(self.prompt_timeout).await?;

        normalize(&raw)
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| SshError::PromptNotFound("empty reply".to_string()))
    }

    async fn send_command(&mut self, command: &str, limit: Duration) -> Result<String, SshError> {
        self.drain_pending().await;
        self.write_line(command).await?;
        let raw = self.read_until_prompt(limit).await?;
        Ok(clean_command_output(&raw, command))
    }

    async fn disconnect(&mut self) {
        let _ = self.channel.eof().await;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "Session closed", "en")
            .await
        {
            warn!("SSH disconnect failed: {}", e);
        }
    }
}
