//! Session commands for lockbox.
//!
//! One command struct drives every host-facing operation of a
//! [`SessionProvider`], so operators can create, lock, update and remove
//! sessions from a shell and script against the JSON output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{LockToken, SessionActions, SessionLookup, SessionProvider, SessionRecord};
use crate::error::{exit_codes, Result, StoreError};

/// Options shared by all session commands.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// The operation to run against one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Create an uninitialized session.
    Create { timeout_minutes: i32 },
    /// Read without taking the lock.
    Get,
    /// Take the lock and read.
    Acquire,
    /// Drop the lock.
    Release { token: LockToken },
    /// Store items and drop the lock (or insert a new session).
    Set {
        token: LockToken,
        items: Vec<(String, String)>,
        timeout_minutes: i32,
        is_new: bool,
    },
    /// Slide the expiry window.
    Touch,
    /// Delete the session and its payloads.
    Remove { token: LockToken },
    /// Show the stored record.
    Inspect,
}

impl SessionAction {
    /// Name used in output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Get => "get",
            Self::Acquire => "acquire",
            Self::Release { .. } => "release",
            Self::Set { .. } => "set",
            Self::Touch => "touch",
            Self::Remove { .. } => "remove",
            Self::Inspect => "inspect",
        }
    }
}

/// Parse a `key=value` item argument.
pub fn parse_item(arg: &str) -> std::result::Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", arg)),
    }
}

/// Output format for session commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutput {
    /// Whether the command was successful.
    pub success: bool,
    /// Which operation ran.
    pub action: String,
    pub session_id: String,
    pub application_name: String,
    /// True when the session is held by someone else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_token: Option<LockToken>,
    /// Time since the last exclusive grant, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<SessionActions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<SessionRecord>,
    /// Process exit code for this outcome.
    pub exit_code: i32,
    /// Error message if command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionOutput {
    fn new(action: &SessionAction, session_id: &str, application_name: &str) -> Self {
        Self {
            success: true,
            action: action.name().to_string(),
            session_id: session_id.to_string(),
            application_name: application_name.to_string(),
            locked: None,
            lock_token: None,
            lock_age_ms: None,
            actions: None,
            items: None,
            record: None,
            exit_code: exit_codes::OK,
            error: None,
        }
    }

    fn with_lookup(mut self, lookup: SessionLookup) -> Self {
        self.locked = Some(lookup.locked);
        self.lock_token = lookup.lock_token;
        self.lock_age_ms = Some(lookup.lock_age.num_milliseconds());
        self.actions = Some(lookup.actions);
        self.items = lookup.data.map(|d| d.items);
        if lookup.locked {
            self.exit_code = exit_codes::LOCKED;
        }
        self
    }

    fn with_error(mut self, err: &StoreError) -> Self {
        self.success = false;
        self.exit_code = match err {
            StoreError::NotFound { .. } => exit_codes::NOT_FOUND,
            _ => exit_codes::FAILURE,
        };
        self.error = Some(err.to_string());
        self
    }

    /// Format as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "{} failed: {}",
                self.action,
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        let target = format!("{}/{}", self.application_name, self.session_id);

        if self.locked == Some(true) {
            return format!(
                "Session {} is locked (token {}, held for {} ms).",
                target,
                self.lock_token.map(|t| t.to_string()).unwrap_or_default(),
                self.lock_age_ms.unwrap_or(0)
            );
        }

        let mut lines = Vec::new();
        match self.action.as_str() {
            "create" => lines.push(format!("Created session {}.", target)),
            "release" => lines.push(format!("Released session {}.", target)),
            "set" => lines.push(format!("Stored session {}.", target)),
            "touch" => lines.push(format!("Refreshed expiry of session {}.", target)),
            "remove" => lines.push(format!("Removed session {}.", target)),
            "inspect" => match &self.record {
                Some(record) => {
                    lines.push(format!("Session {}:", target));
                    lines.push(format!("  initialized:  {}", record.initialized));
                    lines.push(format!("  locked:       {}", record.locked));
                    lines.push(format!("  lock token:   {}", record.lock_token));
                    lines.push(format!("  lock date:    {}", record.lock_date_utc.to_rfc3339()));
                    lines.push(format!("  created:      {}", record.created_utc.to_rfc3339()));
                    lines.push(format!("  expires:      {}", record.expires_utc.to_rfc3339()));
                    lines.push(format!("  timeout:      {} min", record.timeout_minutes));
                    let blob = if record.has_blob() {
                        record.blob_name.as_str()
                    } else {
                        "-"
                    };
                    lines.push(format!("  blob:         {}", blob));
                }
                None => lines.push(format!("No session {}.", target)),
            },
            _ => {
                let token = self.lock_token.map(|t| t.to_string()).unwrap_or_default();
                if self.action == "acquire" {
                    lines.push(format!("Acquired session {} (token {}).", target, token));
                } else {
                    lines.push(format!("Session {}:", target));
                }
                if self.actions == Some(SessionActions::InitializeItem) {
                    lines.push("  (first access, session initialized)".to_string());
                }
                match &self.items {
                    Some(items) if !items.is_empty() => {
                        for (key, value) in items {
                            lines.push(format!("  {} = {}", key, value));
                        }
                    }
                    _ => lines.push("  (no items)".to_string()),
                }
            }
        }

        lines.join("\n")
    }
}

/// The session command implementation.
pub struct SessionCommand<P: SessionProvider> {
    provider: P,
}

impl<P: SessionProvider> SessionCommand<P> {
    /// Create a new session command.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Run `action` against one session.
    pub fn run(
        &self,
        session_id: &str,
        application_name: &str,
        action: &SessionAction,
    ) -> SessionOutput {
        let output = SessionOutput::new(action, session_id, application_name);
        match self.execute(session_id, application_name, action, output.clone()) {
            Ok(output) => output,
            Err(e) => output.with_error(&e),
        }
    }

    /// Render `output` according to the options.
    pub fn format_output(&self, output: &SessionOutput, options: &SessionOptions) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            return serde_json::to_string_pretty(output)
                .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"{}"}}"#, e));
        }
        output.format_text()
    }

    fn execute(
        &self,
        id: &str,
        app: &str,
        action: &SessionAction,
        output: SessionOutput,
    ) -> Result<SessionOutput> {
        match action {
            SessionAction::Create { timeout_minutes } => {
                self.provider.create_uninitialized(id, app, *timeout_minutes)?;
                Ok(output)
            }
            SessionAction::Get => Ok(output.with_lookup(self.provider.get(id, app)?)),
            SessionAction::Acquire => Ok(output.with_lookup(self.provider.get_exclusive(id, app)?)),
            SessionAction::Release { token } => {
                self.provider.release_exclusive(id, app, *token)?;
                Ok(output)
            }
            SessionAction::Set {
                token,
                items,
                timeout_minutes,
                is_new,
            } => {
                let mut data = self.provider.new_session_data(*timeout_minutes)?;
                data.items.extend(items.iter().cloned());
                self.provider
                    .set_and_release(id, app, *token, &data, *is_new)?;
                Ok(output)
            }
            SessionAction::Touch => {
                self.provider.reset_timeout(id, app)?;
                Ok(output)
            }
            SessionAction::Remove { token } => {
                self.provider.remove(id, app, *token)?;
                Ok(output)
            }
            SessionAction::Inspect => {
                let mut output = output;
                output.record = self.provider.inspect(id, app)?.map(|row| row.value);
                if output.record.is_none() {
                    output.exit_code = exit_codes::NOT_FOUND;
                }
                Ok(output)
            }
        }
    }
}
