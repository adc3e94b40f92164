//! Directory Store adapter.
//!
//! The Directory Store is an external key→document service holding per-room
//! member lists and per-user push tokens. It is consulted for push targeting
//! only, never on the signalling hot path; lookup failures are logged by
//! callers and treated as empty results.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use failure::Fail;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use stentor_client_api_proto::{RoomId, UserId};
use url::Url;

use crate::{conf, log::prelude::*};

/// Error of communicating with the Directory Store.
#[derive(Debug, Fail)]
pub enum DirectoryError {
    /// Request failed on the transport level or the store answered with an
    /// error status.
    #[fail(display = "Directory request failed: {}", _0)]
    Request(#[fail(cause)] reqwest::Error),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err)
    }
}

/// Read-side adapter of the Directory Store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    /// Returns the authoritative member set of the given room. May be empty.
    ///
    /// # Errors
    ///
    /// Errors if the Directory Store cannot be reached.
    async fn room_member_ids(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<UserId>, DirectoryError>;

    /// Resolves push tokens of the given users. Absent entries mean "no
    /// token".
    ///
    /// # Errors
    ///
    /// Errors if the Directory Store cannot be reached.
    async fn push_tokens(
        &self,
        user_ids: Vec<UserId>,
    ) -> Result<HashMap<UserId, String>, DirectoryError>;

    /// Requests removal of a push token which the Push Gateway reported
    /// permanently dead.
    ///
    /// # Errors
    ///
    /// Errors if the Directory Store cannot be reached.
    async fn remove_push_token(
        &self,
        user_id: UserId,
        token: String,
    ) -> Result<(), DirectoryError>;
}

/// Member list document of a room.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembersDoc {
    #[serde(default)]
    member_ids: Vec<UserId>,
}

/// Push token lookup response document.
#[derive(Debug, Default, Deserialize)]
struct TokensDoc {
    #[serde(default)]
    tokens: HashMap<UserId, String>,
}

/// Push token lookup request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokensLookup<'a> {
    user_ids: &'a [UserId],
}

/// [`DirectoryAdapter`] backed by the Directory Store REST API.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpDirectory {
    #[must_use]
    pub fn new(base_url: Url, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            request_timeout,
        }
    }

    /// Builds an endpoint URL from the configured base and the given path
    /// segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl DirectoryAdapter for HttpDirectory {
    async fn room_member_ids(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<UserId>, DirectoryError> {
        let url = self.endpoint(&["rooms", &room_id.0, "members"]);
        let resp = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let doc: MembersDoc = resp.error_for_status()?.json().await?;
        Ok(doc.member_ids)
    }

    async fn push_tokens(
        &self,
        user_ids: Vec<UserId>,
    ) -> Result<HashMap<UserId, String>, DirectoryError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = self.endpoint(&["push-tokens", "lookup"]);
        let doc: TokensDoc = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(&TokensLookup {
                user_ids: &user_ids,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(doc.tokens)
    }

    async fn remove_push_token(
        &self,
        user_id: UserId,
        token: String,
    ) -> Result<(), DirectoryError> {
        let url =
            self.endpoint(&["users", &user_id.0, "push-tokens", &token]);
        self.client
            .delete(url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// No-op [`DirectoryAdapter`] used when no Directory Store is configured.
///
/// Every lookup resolves to an empty result.
pub struct NoopDirectory;

#[async_trait]
impl DirectoryAdapter for NoopDirectory {
    async fn room_member_ids(
        &self,
        _: RoomId,
    ) -> Result<Vec<UserId>, DirectoryError> {
        Ok(Vec::new())
    }

    async fn push_tokens(
        &self,
        _: Vec<UserId>,
    ) -> Result<HashMap<UserId, String>, DirectoryError> {
        Ok(HashMap::new())
    }

    async fn remove_push_token(
        &self,
        _: UserId,
        _: String,
    ) -> Result<(), DirectoryError> {
        Ok(())
    }
}

/// Builds the [`DirectoryAdapter`] matching the given configuration.
pub fn new_directory(conf: &conf::Directory) -> Arc<dyn DirectoryAdapter> {
    match &conf.base_url {
        Some(url) => Arc::new(HttpDirectory::new(
            url.clone(),
            conf.request_timeout,
        )),
        None => {
            info!(
                "No 'directory.base_url' configured, directory lookups are \
                 disabled"
            );
            Arc::new(NoopDirectory)
        }
    }
}
