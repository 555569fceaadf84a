//! Scripted in-memory device used by the pipeline tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::session::DeviceSession;
use super::transport::{ConnectError, Connector, RemoteShell};
use crate::ssh::{AuthMethod, SshConfig, SshError};

/// What the scripted device saw
#[derive(Debug, Default)]
pub(crate) struct DeviceLog {
    pub connects: usize,
    pub disconnects: usize,
    pub commands: Vec<String>,
}

type Reply = Result<String, String>;

#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    prompt: String,
    replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    connect_error: Option<ConnectError>,
    log: Arc<Mutex<DeviceLog>>,
}

impl ScriptedConnector {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            replies: Arc::new(Mutex::new(HashMap::new())),
            delays: Arc::new(Mutex::new(HashMap::new())),
            connect_error: None,
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }

    /// Queue a reply; the last queued reply for a command repeats
    pub fn reply(self, command: &str, output: &str) -> Self {
        self.push(command, Ok(output.to_string()))
    }

    /// Queue a transport failure for a command
    pub fn fail(self, command: &str, message: &str) -> Self {
        self.push(command, Err(message.to_string()))
    }

    /// Hold every reply to `command` back for `delay`
    pub fn delay(self, command: &str, delay: Duration) -> Self {
        self.delays.lock().insert(command.to_string(), delay);
        self
    }

    pub fn refuse(mut self, err: ConnectError) -> Self {
        self.connect_error = Some(err);
        self
    }

    fn push(self, command: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn log(&self) -> Arc<Mutex<DeviceLog>> {
        self.log.clone()
    }

    pub fn session(self) -> DeviceSession<Self> {
        self.session_with_timeout(Duration::from_secs(5))
    }

    pub fn session_with_timeout(self, command_timeout: Duration) -> DeviceSession<Self> {
        DeviceSession::new(self, target("10.0.0.1"), command_timeout)
    }
}

pub(crate) fn target(host: &str) -> SshConfig {
    SshConfig {
        host: host.to_string(),
        username: "admin".to_string(),
        auth: AuthMethod::password("secret"),
        ..Default::default()
    }
}

pub(crate) struct ScriptedShell {
    prompt: String,
    replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    log: Arc<Mutex<DeviceLog>>,
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn find_prompt(&mut self) -> Result<String, SshError> {
        Ok(self.prompt.clone())
    }

    async fn send_command(&mut self, command: &str, _timeout: Duration) -> Result<String, SshError> {
        self.log.lock().commands.push(command.to_string());

        let delay = self.delays.lock().get(command).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut replies = self.replies.lock();
        let reply = match replies.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(SshError::ChannelError(message)),
            None => Ok(String::new()),
        }
    }

    async fn disconnect(&mut self) {
        self.log.lock().disconnects += 1;
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Shell = ScriptedShell;

    async fn connect(&self, _target: &SshConfig) -> Result<ScriptedShell, ConnectError> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        self.log.lock().connects += 1;
        Ok(ScriptedShell {
            prompt: self.prompt.clone(),
            replies: self.replies.clone(),
            delays: self.delays.clone(),
            log: self.log.clone(),
        })
    }
}
