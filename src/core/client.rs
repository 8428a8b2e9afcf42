// src/core/client.rs

//! Client identity values: connection requests, remote clients and the
//! server's own identity record.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Request parameter key carrying an explicitly reported client host.
pub const CLIENT_HOST_PARAMETER: &str = "client_host";

/// A set of client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    username: String,
    password: String,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// True when both the username and the password match.
    pub fn credentials_match(&self, other: &User) -> bool {
        self.username == other.username && self.password == other.password
    }
}

// The password never appears in logs.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

/// An immutable connection request as delivered by the transport layer.
///
/// Equality and hashing are defined solely by the client id.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    user: User,
    client_id: Uuid,
    client_type_id: String,
    client_version: Option<String>,
    framework_version: Option<String>,
    parameters: HashMap<String, String>,
}

impl ConnectionRequest {
    pub fn new(user: User, client_id: Uuid, client_type_id: impl Into<String>) -> Self {
        Self {
            user,
            client_id,
            client_type_id: client_type_id.into(),
            client_version: None,
            framework_version: None,
            parameters: HashMap::new(),
        }
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = Some(version.into());
        self
    }

    pub fn with_framework_version(mut self, version: impl Into<String>) -> Self {
        self.framework_version = Some(version.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn client_type_id(&self) -> &str {
        &self.client_type_id
    }

    pub fn client_version(&self) -> Option<&str> {
        self.client_version.as_deref()
    }

    pub fn framework_version(&self) -> Option<&str> {
        self.framework_version.as_deref()
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

impl PartialEq for ConnectionRequest {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id
    }
}

impl Eq for ConnectionRequest {}

impl Hash for ConnectionRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.client_id.hash(state);
    }
}

impl fmt::Display for ConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} [{}]",
            self.user, self.client_type_id, self.client_id
        )
    }
}

/// A [`ConnectionRequest`] augmented with the identity the backing resource is
/// opened under and the resolved client host.
///
/// Mutable only while it travels through the login-proxy pipeline; afterwards
/// it is owned exclusively by its session.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    request: ConnectionRequest,
    backing_user: User,
    client_host: Option<String>,
}

impl RemoteClient {
    /// Builds a remote client whose backing user starts out as the request user.
    pub fn from_request(request: ConnectionRequest) -> Self {
        let backing_user = request.user().clone();
        Self {
            request,
            backing_user,
            client_host: None,
        }
    }

    pub fn request(&self) -> &ConnectionRequest {
        &self.request
    }

    pub fn user(&self) -> &User {
        self.request.user()
    }

    pub fn backing_user(&self) -> &User {
        &self.backing_user
    }

    /// Substitutes the identity the backing resource is opened under.
    pub fn set_backing_user(&mut self, user: User) {
        self.backing_user = user;
    }

    pub fn client_id(&self) -> Uuid {
        self.request.client_id()
    }

    pub fn client_type_id(&self) -> &str {
        self.request.client_type_id()
    }

    pub fn client_host(&self) -> Option<&str> {
        self.client_host.as_deref()
    }

    pub fn set_client_host(&mut self, host: Option<String>) {
        self.client_host = host;
    }
}

impl fmt::Display for RemoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request)?;
        if let Some(host) = &self.client_host {
            write!(f, " from {host}")?;
        }
        Ok(())
    }
}

/// The server's immutable identity record.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub server_id: Uuid,
    pub server_name: String,
    pub port: u16,
    pub version: String,
    pub start_time: DateTime<Utc>,
    pub locale: String,
    pub time_zone: String,
}

impl ServerInfo {
    pub fn new(server_name: impl Into<String>, port: u16) -> Self {
        Self {
            server_id: Uuid::new_v4(),
            server_name: server_name.into(),
            port,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Utc::now(),
            locale: std::env::var("LANG").unwrap_or_else(|_| "en_US".to_string()),
            time_zone: chrono::Local::now().offset().to_string(),
        }
    }
}
