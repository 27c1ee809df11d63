//! Chat notifications
//!
//! Maintains one progress message per pipeline run: the first post creates it
//! and records the returned message reference, every later post updates the
//! same message in place. Job output goes into the message's thread. Chat
//! failures are logged and never fail the pipeline.

use crate::env::EnvSource;
use crate::progress::Progress;
use crate::util::arn::Arn;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

/// Bot token used to authenticate against the chat API
pub const SLACK_TOKEN_VAR: &str = "SLACK_TOKEN";

/// Channel receiving the progress message
pub const SLACK_CHANNEL_VAR: &str = "SLACK_CHANNEL_ID";

const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{0} environment variable must be set")]
    MissingEnv(&'static str),

    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API error: {0}")]
    Api(String),
}

/// One message to post or update
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub channel: String,
    pub text: String,
    pub blocks: Value,
    pub thread_ts: Option<String>,
    pub reply_broadcast: bool,
}

/// Chat backend seam, implemented by [`SlackClient`] in production
pub trait ChatApi {
    /// Posts a new message, returning its reference
    fn post_message(&self, message: &ChatMessage) -> Result<String, NotifyError>;

    /// Updates an existing message in place, returning its reference
    fn update_message(&self, ts: &str, message: &ChatMessage) -> Result<String, NotifyError>;
}

/// Slack Web API client
pub struct SlackClient {
    client: reqwest::blocking::Client,
    token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            token,
            base_url: SLACK_API_BASE.to_string(),
        }
    }

    fn call(&self, method: &str, body: Value) -> Result<String, NotifyError> {
        let response: Value = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .json(&body)
            .send()?
            .json()?;

        if response["ok"].as_bool() != Some(true) {
            let error = response["error"].as_str().unwrap_or("unknown");
            return Err(NotifyError::Api(error.to_string()));
        }

        Ok(response["ts"].as_str().unwrap_or_default().to_string())
    }

    fn body(message: &ChatMessage) -> Value {
        let mut body = json!({
            "channel": message.channel,
            "text": message.text,
            "blocks": message.blocks,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(thread_ts) = &message.thread_ts {
            body["thread_ts"] = json!(thread_ts);
            body["reply_broadcast"] = json!(message.reply_broadcast);
        }
        body
    }
}

impl ChatApi for SlackClient {
    fn post_message(&self, message: &ChatMessage) -> Result<String, NotifyError> {
        self.call("chat.postMessage", Self::body(message))
    }

    fn update_message(&self, ts: &str, message: &ChatMessage) -> Result<String, NotifyError> {
        let mut body = Self::body(message);
        body["ts"] = json!(ts);
        self.call("chat.update", body)
    }
}

/// Identity rendered into the progress message header
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub repository_name: String,
    pub revision_commit: String,
    pub repository_url: String,
}

/// Progress message upserter for one pipeline run
///
/// Construct with [`Notify::new`] for the real chat backend or
/// [`Notify::disabled`] when notifications are off; every posting method is a
/// no-op in the disabled state.
pub struct Notify {
    chat: Option<Box<dyn ChatApi>>,
    channel: String,
    build_arn: String,
    reference: Option<String>,
}

impl Notify {
    /// Wires up the chat backend from the environment
    pub fn new(env: &dyn EnvSource) -> Result<Self, NotifyError> {
        let token = env
            .get(SLACK_TOKEN_VAR)
            .ok_or(NotifyError::MissingEnv(SLACK_TOKEN_VAR))?;
        let channel = env
            .get(SLACK_CHANNEL_VAR)
            .ok_or(NotifyError::MissingEnv(SLACK_CHANNEL_VAR))?;
        let build_arn = env
            .get(crate::config::BUILD_ARN_VAR)
            .ok_or(NotifyError::MissingEnv(crate::config::BUILD_ARN_VAR))?;

        Ok(Self {
            chat: Some(Box::new(SlackClient::new(token))),
            channel,
            build_arn,
            reference: None,
        })
    }

    /// A notifier whose posting methods do nothing
    pub fn disabled() -> Self {
        Self {
            chat: None,
            channel: String::new(),
            build_arn: String::new(),
            reference: None,
        }
    }

    /// A notifier over an explicit chat backend
    pub fn with_api(api: Box<dyn ChatApi>, channel: String, build_arn: String) -> Self {
        Self {
            chat: Some(api),
            channel,
            build_arn,
            reference: None,
        }
    }

    /// Reference of the progress message once it has been posted
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Adopts an existing message reference, threading later posts under it
    pub fn set_reference(&mut self, reference: String) {
        self.reference = Some(reference);
    }

    /// Creates or updates the single progress message
    pub fn post_build_progress(&mut self, progress: &Progress, context: &MessageContext) {
        let Some(chat) = &self.chat else {
            return;
        };

        let message = ChatMessage {
            channel: self.channel.clone(),
            text: format!(
                "Building: {}@{}",
                context.repository_name, context.revision_commit
            ),
            blocks: self.progress_blocks(progress, context),
            thread_ts: None,
            reply_broadcast: false,
        };

        let result = match &self.reference {
            None => chat.post_message(&message),
            Some(ts) => chat.update_message(ts, &message),
        };

        match result {
            Ok(ts) => self.reference = Some(ts),
            Err(e) => warn!("failed to send progress message: {}", e),
        }
    }

    /// Posts job output as a threaded reply under the progress message
    ///
    /// Empty lines are dropped. Returns the reply's reference when sent.
    pub fn post_job_comment(
        &self,
        title: &str,
        lines: &[String],
        send_to_main_channel: bool,
    ) -> Option<String> {
        let chat = self.chat.as_ref()?;

        let blocks: Vec<Value> = lines
            .iter()
            .filter(|line| !line.is_empty())
            .map(|line| section(line))
            .collect();

        let message = ChatMessage {
            channel: self.channel.clone(),
            text: title.to_string(),
            blocks: Value::Array(blocks),
            thread_ts: self.reference.clone(),
            reply_broadcast: send_to_main_channel,
        };

        match chat.post_message(&message) {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("failed to send job comment: {}", e);
                None
            }
        }
    }

    /// Console URL of the CI build, empty when the ARN cannot be parsed
    pub fn build_url(&self) -> String {
        match Arn::parse(&self.build_arn) {
            Ok(arn) => {
                let project = arn.project().strip_prefix("build/").unwrap_or(arn.project());
                format!(
                    "https://{region}.console.aws.amazon.com/codesuite/codebuild/\
                     {account}/projects/{project}/build/{project}%3A{build_id}",
                    region = arn.region(),
                    account = arn.account_id(),
                    project = project,
                    build_id = arn.build_id(),
                )
            }
            Err(_) => String::new(),
        }
    }

    fn progress_blocks(&self, progress: &Progress, context: &MessageContext) -> Value {
        let headline = format!(
            "*Building {}@{}*",
            context.repository_name, context.revision_commit
        );
        let repository = format!(
            "*Repository*: <{}|{}>",
            context.repository_url, context.repository_name
        );
        let revision = format!(
            "*Revision*: <{}/commit/{commit}|{commit}>",
            context.repository_url,
            commit = context.revision_commit
        );
        let build_logs = format!("<{}|Build Logs>", self.build_url());

        let phases: Vec<Value> = progress
            .summary_lines()
            .into_iter()
            .map(|line| mrkdwn(&line))
            .collect();

        json!([
            section(&headline),
            {
                "type": "context",
                "elements": [mrkdwn(&repository), mrkdwn(&revision), mrkdwn(&build_logs)],
            },
            {
                "type": "context",
                "elements": phases,
            },
        ])
    }
}

fn mrkdwn(text: &str) -> Value {
    json!({"type": "mrkdwn", "text": text})
}

fn section(text: &str) -> Value {
    json!({"type": "section", "text": mrkdwn(text)})
}

/// Recording chat backend used as a test double
#[derive(Debug, Default, Clone)]
pub struct RecordingChat {
    calls: std::rc::Rc<std::cell::RefCell<Vec<RecordedCall>>>,
    fail: bool,
}

/// One recorded chat API invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub ts: Option<String>,
    pub message: ChatMessage,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    fn record(
        &self,
        method: &'static str,
        ts: Option<String>,
        message: &ChatMessage,
    ) -> Result<String, NotifyError> {
        self.calls.borrow_mut().push(RecordedCall {
            method,
            ts,
            message: message.clone(),
        });
        if self.fail {
            return Err(NotifyError::Api("scripted failure".to_string()));
        }
        Ok(format!("ts-{}", self.calls.borrow().len()))
    }
}

impl ChatApi for RecordingChat {
    fn post_message(&self, message: &ChatMessage) -> Result<String, NotifyError> {
        self.record("post", None, message)
    }

    fn update_message(&self, ts: &str, message: &ChatMessage) -> Result<String, NotifyError> {
        self.record("update", Some(ts.to_string()), message)
    }
}
